//! Processor registry (§4.2): maps a request path prefix to the kind of
//! translation pipeline that path requires. Registration happens once at
//! boot from the active `Config` snapshot and `rootPrefix`; lookup is a
//! lock-free longest-prefix match against a `Vec` sorted once at
//! construction time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
	ChatCompletions,
	Completions,
	Embeddings,
	Models,
	AnthropicMessages,
}

#[derive(Debug, Clone)]
pub struct ProcessorRegistry {
	/// Sorted longest-prefix-first so the first match in iteration order is
	/// always the most specific one.
	routes: Vec<(String, RouteKind)>,
}

impl ProcessorRegistry {
	/// Builds the registry from the built-in path set, each prefixed with
	/// `root_prefix` (default `/`).
	pub fn build(root_prefix: &str) -> Self {
		let prefix = root_prefix.trim_end_matches('/');
		let mut routes = vec![
			(format!("{prefix}/v1/chat/completions"), RouteKind::ChatCompletions),
			(format!("{prefix}/v1/completions"), RouteKind::Completions),
			(format!("{prefix}/v1/embeddings"), RouteKind::Embeddings),
			(format!("{prefix}/v1/models"), RouteKind::Models),
			(format!("{prefix}/anthropic/v1/messages"), RouteKind::AnthropicMessages),
		];
		routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
		ProcessorRegistry { routes }
	}

	pub fn lookup(&self, path: &str) -> Option<RouteKind> {
		self
			.routes
			.iter()
			.find(|(prefix, _)| path.starts_with(prefix.as_str()))
			.map(|(_, kind)| *kind)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matches_longest_prefix_first() {
		let registry = ProcessorRegistry::build("/");
		assert_eq!(
			registry.lookup("/v1/chat/completions"),
			Some(RouteKind::ChatCompletions)
		);
		assert_eq!(registry.lookup("/v1/models"), Some(RouteKind::Models));
		assert_eq!(registry.lookup("/v1/unknown"), None);
	}

	#[test]
	fn applies_root_prefix() {
		let registry = ProcessorRegistry::build("/gateway");
		assert_eq!(
			registry.lookup("/gateway/v1/chat/completions"),
			Some(RouteKind::ChatCompletions)
		);
		assert_eq!(registry.lookup("/v1/chat/completions"), None);
	}
}
