//! Router selector (§4.3): given the parsed request and the active config,
//! picks exactly one backend. `RouterSelector` is a trait object so the
//! default header-based selector can be substituted.

use http::HeaderMap;

use crate::config::Config;
use crate::error::ProcessorError;

/// The header the fronting proxy populates with its own upstream routing
/// decision; the default selector trusts it verbatim.
pub const SELECTED_BACKEND_HEADER: &str = "x-gateway-selected-backend";

pub trait RouterSelector: Send + Sync {
	fn select(&self, headers: &HeaderMap, config: &Config) -> Result<String, ProcessorError>;
}

/// Picks the single backend named by [`SELECTED_BACKEND_HEADER`]; falls
/// back to the first declared backend when the header is absent and exactly
/// one backend is configured.
#[derive(Debug, Default)]
pub struct HeaderBasedSelector;

impl RouterSelector for HeaderBasedSelector {
	fn select(&self, headers: &HeaderMap, config: &Config) -> Result<String, ProcessorError> {
		if let Some(name) = headers
			.get(SELECTED_BACKEND_HEADER)
			.and_then(|v| v.to_str().ok())
		{
			if config.backend(name).is_some() {
				return Ok(name.to_string());
			}
			return Err(ProcessorError::NoMatchingRule);
		}

		if config.backends.len() == 1 {
			return Ok(config.backends.keys().next().unwrap().clone());
		}

		Err(ProcessorError::NoMatchingRule)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config;

	fn config_with_backends(names: &[&str]) -> Config {
		let backends = names
			.iter()
			.map(|name| {
				format!(
					"  {name}:\n    schema:\n      name: OpenAI\n      version: v1\n"
				)
			})
			.collect::<String>();
		let yaml = format!("backends:\n{backends}");
		config::parse(&yaml).unwrap()
	}

	#[test]
	fn selects_by_header_when_present() {
		let config = config_with_backends(&["primary", "secondary"]);
		let mut headers = HeaderMap::new();
		headers.insert(SELECTED_BACKEND_HEADER, "secondary".parse().unwrap());
		let selector = HeaderBasedSelector;
		assert_eq!(selector.select(&headers, &config).unwrap(), "secondary");
	}

	#[test]
	fn falls_back_to_sole_backend_without_header() {
		let config = config_with_backends(&["only"]);
		let selector = HeaderBasedSelector;
		assert_eq!(selector.select(&HeaderMap::new(), &config).unwrap(), "only");
	}

	#[test]
	fn fails_with_no_matching_rule_when_ambiguous() {
		let config = config_with_backends(&["a", "b"]);
		let selector = HeaderBasedSelector;
		assert!(matches!(
			selector.select(&HeaderMap::new(), &config),
			Err(ProcessorError::NoMatchingRule)
		));
	}
}
