//! Conversions between the vendored `envoy.service.ext_proc.v3` protobuf
//! messages and the plain `http`-crate types the rest of the gateway
//! speaks.

use extproc_protos::envoy::config::core::v3::{
	HeaderMap as ProtoHeaderMap, HeaderValue as ProtoHeaderValue, HeaderValueOption,
};
use extproc_protos::envoy::r#type::v3::{HttpStatus, StatusCode};
use extproc_protos::envoy::service::ext_proc::v3::body_mutation::Mutation as BodyMutationKind;
use extproc_protos::envoy::service::ext_proc::v3::common_response::ResponseStatus;
use extproc_protos::envoy::service::ext_proc::v3::{BodyMutation, CommonResponse, HeaderMutation, ImmediateResponse};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::translate::HeaderOp;

const PSEUDO_METHOD: &str = ":method";
const PSEUDO_AUTHORITY: &str = ":authority";
const PSEUDO_PATH: &str = ":path";

/// The pseudo-headers the state machine tracks separately, split out of an
/// incoming `HttpHeaders` message's flat key/value list.
pub struct SplitHeaders {
	pub method: Option<String>,
	pub authority: Option<String>,
	pub path: Option<String>,
	pub headers: HeaderMap,
}

pub fn split_headers(proto: &ProtoHeaderMap) -> SplitHeaders {
	let mut out = SplitHeaders {
		method: None,
		authority: None,
		path: None,
		headers: HeaderMap::new(),
	};
	for h in &proto.headers {
		match h.key.as_str() {
			PSEUDO_METHOD => out.method = Some(h.value.clone()),
			PSEUDO_AUTHORITY => out.authority = Some(h.value.clone()),
			PSEUDO_PATH => out.path = Some(h.value.clone()),
			k if k.starts_with(':') => {},
			k => {
				if let (Ok(name), Ok(value)) = (HeaderName::try_from(k), HeaderValue::from_str(&h.value)) {
					out.headers.append(name, value);
				}
			},
		}
	}
	out
}

/// Builds a `HeaderMutation` from the ordered header operations a
/// translator (or the state machine itself, e.g. the resolved-model header)
/// returned.
pub fn header_ops_to_mutation(ops: &[HeaderOp]) -> HeaderMutation {
	let mut set_headers = Vec::new();
	let mut remove_headers = Vec::new();
	for op in ops {
		match op {
			HeaderOp::Set(name, value) => set_headers.push(HeaderValueOption {
				header: Some(ProtoHeaderValue {
					key: name.clone(),
					value: value.clone(),
				}),
				append: None,
				// OVERWRITE_IF_EXISTS_OR_ADD
				append_action: 2,
			}),
			HeaderOp::Remove(name) => remove_headers.push(name.clone()),
		}
	}
	HeaderMutation {
		set_headers,
		remove_headers,
	}
}

/// A `CommonResponse` carrying CONTINUE status plus an optional header
/// mutation and an optional full-body replacement.
pub fn common_response(header_mutation: Option<HeaderMutation>, body: Option<Vec<u8>>) -> CommonResponse {
	CommonResponse {
		status: ResponseStatus::Continue as i32,
		header_mutation,
		body_mutation: body.map(|b| BodyMutation {
			mutation: Some(BodyMutationKind::Body(b)),
		}),
		trailers: None,
		clear_route_cache: false,
	}
}

/// Computes the `HeaderMutation` that turns `before` into `after`: a `Set`
/// for every header new or changed in `after`, a `Remove` for every header
/// present in `before` and absent from `after`. Single-valued only, matching
/// the rest of the crate's header handling.
pub fn diff_header_mutation(before: &HeaderMap, after: &HeaderMap) -> HeaderMutation {
	let mut set_headers = Vec::new();
	for name in after.keys() {
		let new_value = after.get(name).and_then(|v| v.to_str().ok());
		let old_value = before.get(name).and_then(|v| v.to_str().ok());
		if new_value != old_value {
			if let Some(value) = new_value {
				set_headers.push(HeaderValueOption {
					header: Some(ProtoHeaderValue {
						key: name.as_str().to_string(),
						value: value.to_string(),
					}),
					append: None,
					append_action: 2,
				});
			}
		}
	}
	let remove_headers = before
		.keys()
		.filter(|name| !after.contains_key(*name))
		.map(|name| name.as_str().to_string())
		.collect();
	HeaderMutation {
		set_headers,
		remove_headers,
	}
}

/// Maps one of the five HTTP statuses the error taxonomy (§7) ever emits to
/// the matching `envoy.type.v3.StatusCode` variant.
pub fn immediate_response(status: u16, body: String) -> ImmediateResponse {
	let code = match status {
		400 => StatusCode::BadRequest,
		404 => StatusCode::NotFound,
		502 => StatusCode::BadGateway,
		503 => StatusCode::ServiceUnavailable,
		_ => StatusCode::InternalServerError,
	};
	ImmediateResponse {
		status: Some(HttpStatus { code: code as i32 }),
		headers: None,
		body,
		grpc_status: None,
		details: String::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_pseudo_headers_from_regular_ones() {
		let proto = ProtoHeaderMap {
			headers: vec![
				ProtoHeaderValue { key: ":method".to_string(), value: "POST".to_string() },
				ProtoHeaderValue { key: ":path".to_string(), value: "/v1/chat/completions".to_string() },
				ProtoHeaderValue { key: "content-type".to_string(), value: "application/json".to_string() },
			],
		};
		let split = split_headers(&proto);
		assert_eq!(split.method.as_deref(), Some("POST"));
		assert_eq!(split.path.as_deref(), Some("/v1/chat/completions"));
		assert_eq!(split.headers.get("content-type").unwrap(), "application/json");
	}

	#[test]
	fn immediate_response_maps_known_status_codes() {
		let resp = immediate_response(503, "unavailable".to_string());
		assert_eq!(resp.status.unwrap().code, StatusCode::ServiceUnavailable as i32);
	}

	#[test]
	fn diff_header_mutation_sets_changed_and_removes_dropped() {
		let mut before = HeaderMap::new();
		before.insert("authorization", "Bearer old".parse().unwrap());
		before.insert("x-trace", "trace-1".parse().unwrap());

		let mut after = HeaderMap::new();
		after.insert("authorization", "Bearer new".parse().unwrap());

		let mutation = diff_header_mutation(&before, &after);
		assert_eq!(mutation.set_headers.len(), 1);
		assert_eq!(mutation.set_headers[0].header.as_ref().unwrap().value, "Bearer new");
		assert_eq!(mutation.remove_headers, vec!["x-trace"]);
	}
}
