//! Lock-free access to the current configuration snapshot.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::Config;

/// Holds the most recently validated [`Config`], swapped atomically by the
/// watcher and read without locking by every ExtProc stream.
#[derive(Clone)]
pub struct ConfigStore {
	inner: Arc<ArcSwap<Config>>,
}

impl ConfigStore {
	pub fn new(initial: Config) -> Self {
		ConfigStore {
			inner: Arc::new(ArcSwap::from_pointee(initial)),
		}
	}

	/// A cheap snapshot of the current configuration. Holding the returned
	/// `Arc` across a request keeps a consistent view even if the store is
	/// swapped mid-request.
	pub fn current(&self) -> Arc<Config> {
		self.inner.load_full()
	}

	pub fn swap(&self, new: Config) {
		self.inner.store(Arc::new(new));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config_with_namespace(ns: &str) -> Config {
		super::super::parse(&format!("metadataNamespace: {ns}\n")).unwrap()
	}

	#[test]
	fn swap_is_visible_to_new_loads() {
		let store = ConfigStore::new(config_with_namespace("a"));
		assert_eq!(store.current().metadata_namespace, "a");
		store.swap(config_with_namespace("b"));
		assert_eq!(store.current().metadata_namespace, "b");
	}

	#[test]
	fn outstanding_snapshot_is_unaffected_by_later_swap() {
		let store = ConfigStore::new(config_with_namespace("a"));
		let held = store.current();
		store.swap(config_with_namespace("b"));
		assert_eq!(held.metadata_namespace, "a");
		assert_eq!(store.current().metadata_namespace, "b");
	}
}
