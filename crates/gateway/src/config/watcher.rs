//! Hot-reload of the configuration file.
//!
//! Filesystem events drive immediate reloads; a 5 second fallback poll
//! catches changes the watcher misses (network filesystems, editors that
//! replace the inode instead of writing in place).

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use tracing::{info, warn};

use super::store::ConfigStore;
use crate::health::ServingStatusCell;

const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// Watches `path` for changes and keeps `store` in sync. Runs until the
/// process exits; a bad reload is logged and the previous snapshot is kept
/// live. `status` flips to `SERVING` after the first successful load, so the
/// gRPC health check only reports healthy once a config snapshot is live.
pub async fn watch(path: PathBuf, store: ConfigStore, status: ServingStatusCell) {
	let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

	let debouncer_path = path.clone();
	let mut debouncer = match new_debouncer(
		DEBOUNCE_WINDOW,
		None,
		move |result: DebounceEventResult| match result {
			Ok(_events) => {
				let _ = tx.send(());
			},
			Err(errors) => {
				for error in errors {
					warn!(%error, path = %debouncer_path.display(), "config watcher error");
				}
			},
		},
	) {
		Ok(d) => Some(d),
		Err(error) => {
			warn!(%error, "failed to start config file watcher, falling back to polling only");
			None
		},
	};

	if let Some(debouncer) = debouncer.as_mut() {
		let watch_target = parent_or_self(&path);
		if let Err(error) = debouncer.watch(&watch_target, RecursiveMode::NonRecursive) {
			warn!(%error, path = %watch_target.display(), "failed to watch config path");
		}
	}

	let mut ticker = tokio::time::interval(FALLBACK_POLL_INTERVAL);
	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	let mut last_contents = read_to_string_lossy(&path).await;

	loop {
		tokio::select! {
			_ = rx.recv() => {
				reload_if_changed(&path, &store, &mut last_contents, &status).await;
			}
			_ = ticker.tick() => {
				reload_if_changed(&path, &store, &mut last_contents, &status).await;
			}
		}
	}
}

fn parent_or_self(path: &Path) -> PathBuf {
	path
		.parent()
		.filter(|p| !p.as_os_str().is_empty())
		.map(Path::to_path_buf)
		.unwrap_or_else(|| PathBuf::from("."))
}

async fn read_to_string_lossy(path: &Path) -> Option<String> {
	tokio::fs::read_to_string(path).await.ok()
}

async fn reload_if_changed(
	path: &Path,
	store: &ConfigStore,
	last_contents: &mut Option<String>,
	status: &ServingStatusCell,
) {
	let Some(contents) = read_to_string_lossy(path).await else {
		warn!(path = %path.display(), "config file unreadable, keeping previous snapshot");
		return;
	};
	if last_contents.as_deref() == Some(contents.as_str()) {
		return;
	}
	match super::parse(&contents) {
		Ok(config) => {
			info!(path = %path.display(), uuid = %config.uuid, "reloaded configuration");
			store.swap(config);
			status.set_serving(true);
			*last_contents = Some(contents);
		},
		Err(error) => {
			warn!(%error, path = %path.display(), "rejected invalid config reload, keeping previous snapshot");
			*last_contents = Some(contents);
		},
	}
}
