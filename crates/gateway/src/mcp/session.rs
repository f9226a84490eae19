//! Per-session state (§4.8): initialization state, the upstream a session is
//! pinned to, the upstream's own (decrypted) session id, and the negotiated
//! capability catalog used for metrics. Grounded on the teacher's
//! `mcp::session::{Session, SessionManager}`, scoped down to this crate's
//! single-upstream-per-session model: no relay fan-out, so a `Session` here
//! wraps exactly one upstream connection rather than a set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::crypto::SessionEncoder;

#[derive(Debug, Default, Clone)]
pub struct NegotiatedCapabilities {
	pub client: Vec<String>,
	pub server: Vec<String>,
}

#[derive(Debug)]
pub struct Session {
	/// The opaque, encrypted id handed to the downstream client.
	pub id: Arc<str>,
	pub upstream: String,
	state: Mutex<SessionInner>,
}

#[derive(Debug, Default)]
struct SessionInner {
	upstream_session_id: Option<String>,
	initialized: bool,
	capabilities: NegotiatedCapabilities,
}

#[derive(Serialize, Deserialize)]
struct EncodedSession {
	upstream: String,
	upstream_session_id: Option<String>,
}

impl Session {
	pub fn upstream_session_id(&self) -> Option<String> {
		self.state.lock().expect("session mutex poisoned").upstream_session_id.clone()
	}

	pub fn set_upstream_session_id(&self, id: Option<String>) {
		self.state.lock().expect("session mutex poisoned").upstream_session_id = id;
	}

	pub fn is_initialized(&self) -> bool {
		self.state.lock().expect("session mutex poisoned").initialized
	}

	pub fn mark_initialized(&self, capabilities: NegotiatedCapabilities) {
		let mut inner = self.state.lock().expect("session mutex poisoned");
		inner.initialized = true;
		inner.capabilities = capabilities;
	}

	pub fn capabilities(&self) -> NegotiatedCapabilities {
		self.state.lock().expect("session mutex poisoned").capabilities.clone()
	}

	/// Encodes this session's recovery state (upstream name + upstream's own
	/// session id) under the current encryption seed. Called right after a
	/// successful `initialize`, once the upstream session id is known.
	fn encode(&self, encoder: &SessionEncoder) -> Option<String> {
		let payload = EncodedSession {
			upstream: self.upstream.clone(),
			upstream_session_id: self.upstream_session_id(),
		};
		let json = serde_json::to_string(&payload).ok()?;
		encoder.encrypt(&json).ok()
	}
}

#[derive(Debug)]
pub struct SessionManager {
	encoder: Arc<SessionEncoder>,
	sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
	pub fn new(encoder: Arc<SessionEncoder>) -> Self {
		SessionManager {
			encoder,
			sessions: RwLock::new(HashMap::new()),
		}
	}

	/// Starts a brand-new, not-yet-identified session pinned to `upstream`.
	/// Not inserted into the lookup table until [`SessionManager::finalize`]
	/// assigns it its real, encrypted id (mirrors the teacher's
	/// create-then-insert split so a session that never completes
	/// `initialize` is never resumable).
	pub fn start(&self, upstream: String) -> Arc<Session> {
		Arc::new(Session {
			id: Arc::from(""),
			upstream,
			state: Mutex::new(SessionInner::default()),
		})
	}

	/// Finalizes a session once its upstream session id is known: encodes the
	/// recovery payload into the id handed to the downstream client, and
	/// registers the session for in-memory lookup.
	pub fn finalize(&self, session: Arc<Session>) -> Arc<Session> {
		let Some(encoded) = session.encode(&self.encoder) else {
			return session;
		};
		let finalized = Arc::new(Session {
			id: encoded.clone().into(),
			upstream: session.upstream.clone(),
			state: Mutex::new(SessionInner {
				upstream_session_id: session.upstream_session_id(),
				initialized: session.is_initialized(),
				capabilities: session.capabilities(),
			}),
		});
		self.sessions.write().expect("write lock").insert(encoded, finalized.clone());
		finalized
	}

	pub fn get(&self, id: &str) -> Option<Arc<Session>> {
		self.sessions.read().expect("read lock").get(id).cloned()
	}

	/// Falls back to decrypting `id` when the session isn't held in memory
	/// (process restart, multi-instance deployment): the id alone carries
	/// enough state to keep forwarding requests to the right upstream
	/// session, just without the negotiated-capabilities cache.
	pub fn get_or_resume(&self, id: &str) -> Option<Arc<Session>> {
		if let Some(session) = self.get(id) {
			return Some(session);
		}
		let decrypted = self.encoder.decrypt(id).ok()?;
		let payload: EncodedSession = serde_json::from_str(&decrypted).ok()?;
		let session = Arc::new(Session {
			id: id.into(),
			upstream: payload.upstream,
			state: Mutex::new(SessionInner {
				upstream_session_id: payload.upstream_session_id,
				initialized: true,
				capabilities: NegotiatedCapabilities::default(),
			}),
		});
		self.sessions.write().expect("write lock").insert(id.to_string(), session.clone());
		Some(session)
	}

	pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
		self.sessions.write().expect("write lock").remove(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn encoder() -> Arc<SessionEncoder> {
		Arc::new(SessionEncoder::new(&["mcp".to_string()]))
	}

	#[test]
	fn finalize_makes_a_session_resumable_by_id() {
		let manager = SessionManager::new(encoder());
		let session = manager.start("docs".to_string());
		session.set_upstream_session_id(Some("upstream-xyz".to_string()));
		let finalized = manager.finalize(session);

		assert!(!finalized.id.is_empty());
		let resumed = manager.get(&finalized.id).expect("session should be registered");
		assert_eq!(resumed.upstream, "docs");
		assert_eq!(resumed.upstream_session_id(), Some("upstream-xyz".to_string()));
	}

	#[test]
	fn get_or_resume_falls_back_to_decrypting_after_eviction() {
		let manager = SessionManager::new(encoder());
		let session = manager.start("docs".to_string());
		session.set_upstream_session_id(Some("upstream-xyz".to_string()));
		let finalized = manager.finalize(session);
		let id = finalized.id.to_string();

		manager.remove(&id);
		assert!(manager.get(&id).is_none());

		let resumed = manager.get_or_resume(&id).expect("should resume from the encoded id");
		assert_eq!(resumed.upstream, "docs");
		assert_eq!(resumed.upstream_session_id(), Some("upstream-xyz".to_string()));
	}

	#[test]
	fn unknown_id_does_not_resume() {
		let manager = SessionManager::new(encoder());
		assert!(manager.get_or_resume("not-a-real-session").is_none());
	}
}
