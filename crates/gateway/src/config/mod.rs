//! The configuration data model (§3) and the raw-to-validated conversion
//! that rejects the deprecated schema generation (§9 Open Questions).

pub mod store;
pub mod watcher;

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use secrecy::SecretString;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::telemetry::cost::CostEvaluator;

/// Top-level keys that belonged to the older, now-rejected config schema.
const DEPRECATED_KEYS: &[&str] = &["rules", "selectedRouteHeaderKey"];

/// The wire schema a backend expects. Drives translator selection in
/// [`crate::translate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ApiSchemaKind {
	OpenAI,
	AzureOpenAI,
	AWSBedrock,
	Anthropic,
	GCPVertexAI,
	GCPAnthropic,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawApiSchema {
	pub name: ApiSchemaKind,
	#[serde(default)]
	pub version: Option<String>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawHeaderKv {
	pub name: String,
	pub value: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawHeaderMutation {
	#[serde(default)]
	pub set: Vec<RawHeaderKv>,
	#[serde(default)]
	pub remove: Vec<String>,
}

/// One header-mutation directive, carried both as the config-authored policy
/// and (via [`crate::extproc::header_mutator`]) as the per-retry diff applied
/// to a live request.
#[derive(Clone, Debug, Default)]
pub struct HeaderMutationPolicy {
	pub set: Vec<(String, String)>,
	pub remove: Vec<String>,
}

impl From<RawHeaderMutation> for HeaderMutationPolicy {
	fn from(raw: RawHeaderMutation) -> Self {
		HeaderMutationPolicy {
			set: raw.set.into_iter().map(|kv| (kv.name, kv.value)).collect(),
			remove: raw.remove,
		}
	}
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, tag = "kind")]
pub enum RawBackendAuth {
	ApiKey { key: String },
	Aws {
		#[serde(rename = "accessKeyId")]
		access_key_id: String,
		#[serde(rename = "secretAccessKey")]
		secret_access_key: String,
		#[serde(rename = "sessionToken", default)]
		session_token: Option<String>,
		region: String,
	},
	Azure {
		#[serde(rename = "accessToken")]
		access_token: String,
	},
	Gcp {
		#[serde(rename = "accessToken")]
		access_token: String,
		region: String,
		project: String,
	},
	Anthropic {
		key: String,
	},
}

/// Credentials the core injects into the outbound request. Never cloned
/// into a log line or metric label (§3 invariant).
#[derive(Clone, Debug)]
pub enum BackendAuth {
	ApiKey(SecretString),
	Aws {
		access_key_id: SecretString,
		secret_access_key: SecretString,
		session_token: Option<SecretString>,
		region: String,
	},
	Azure {
		access_token: SecretString,
	},
	Gcp {
		access_token: SecretString,
		region: String,
		project: String,
	},
	Anthropic {
		key: SecretString,
	},
}

impl From<RawBackendAuth> for BackendAuth {
	fn from(raw: RawBackendAuth) -> Self {
		match raw {
			RawBackendAuth::ApiKey { key } => BackendAuth::ApiKey(key.into()),
			RawBackendAuth::Aws {
				access_key_id,
				secret_access_key,
				session_token,
				region,
			} => BackendAuth::Aws {
				access_key_id: access_key_id.into(),
				secret_access_key: secret_access_key.into(),
				session_token: session_token.map(Into::into),
				region,
			},
			RawBackendAuth::Azure { access_token } => BackendAuth::Azure {
				access_token: access_token.into(),
			},
			RawBackendAuth::Gcp {
				access_token,
				region,
				project,
			} => BackendAuth::Gcp {
				access_token: access_token.into(),
				region,
				project,
			},
			RawBackendAuth::Anthropic { key } => BackendAuth::Anthropic { key: key.into() },
		}
	}
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawBackend {
	pub schema: RawApiSchema,
	#[serde(default)]
	pub auth: Option<RawBackendAuth>,
	#[serde(default)]
	pub header_mutation: Option<RawHeaderMutation>,
	#[serde(default)]
	pub model_name_override: Option<String>,
}

/// A configured upstream, addressed by name from a route or from
/// `modelNameOverride` routing.
#[derive(Clone, Debug)]
pub struct Backend {
	pub name: String,
	pub schema: ApiSchemaKind,
	pub auth: Option<BackendAuth>,
	pub header_mutation: HeaderMutationPolicy,
	pub model_name_override: Option<String>,
}

#[derive(Clone, Copy, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CostTokenKind {
	InputToken,
	OutputToken,
	CachedInputToken,
	TotalToken,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, untagged)]
pub enum RawCostKind {
	Fixed { kind: CostTokenKind },
	Cel { cel: String },
}

/// A named cost observation published as dynamic metadata: either a direct
/// token count or the result of a CEL expression evaluated at accounting
/// time (§4.5).
#[derive(Clone, Debug)]
pub enum CostKind {
	Fixed(CostTokenKind),
	Cel(String),
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawCostDescriptor {
	pub metadata_key: String,
	#[serde(flatten)]
	pub kind: RawCostKind,
}

#[derive(Clone, Debug)]
pub struct CostDescriptor {
	pub metadata_key: String,
	pub kind: CostKind,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawModelEntry {
	pub id: String,
	#[serde(default)]
	pub owned_by: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ModelEntry {
	pub id: String,
	pub owned_by: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMcpConfig {
	#[serde(default)]
	pub upstreams: IndexMap<String, RawMcpUpstream>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMcpUpstream {
	pub target: String,
}

#[derive(Clone, Debug)]
pub struct McpUpstream {
	pub name: String,
	pub target: url::Url,
}

#[derive(Clone, Debug, Default)]
pub struct McpConfig {
	pub upstreams: IndexMap<String, McpUpstream>,
}

/// The document a user authors. Deserialized with `deny_unknown_fields` so
/// a typo or a deprecated key surfaces immediately rather than being
/// silently ignored.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
	#[serde(default)]
	pub uuid: Option<Uuid>,
	#[serde(default = "default_metadata_namespace")]
	pub metadata_namespace: String,
	#[serde(default = "default_model_name_header_key")]
	pub model_name_header_key: String,
	#[serde(default)]
	pub backends: IndexMap<String, RawBackend>,
	#[serde(default)]
	pub llm_request_costs: Vec<RawCostDescriptor>,
	#[serde(default)]
	pub models: IndexMap<String, RawModelEntry>,
	#[serde(default)]
	pub mcp: Option<RawMcpConfig>,
}

fn default_metadata_namespace() -> String {
	"ai_gateway".to_string()
}

fn default_model_name_header_key() -> String {
	"x-resolved-model".to_string()
}

/// The validated, immutable configuration snapshot. Never mutated in place;
/// see [`store::ConfigStore`] for how readers obtain and hold a reference.
#[derive(Clone, Debug)]
pub struct Config {
	pub uuid: Uuid,
	pub metadata_namespace: String,
	pub model_name_header_key: String,
	pub backends: IndexMap<String, Backend>,
	pub llm_request_costs: Vec<CostDescriptor>,
	/// Compiled once here, at validation time, and reused read-only by every
	/// request this snapshot serves (§4.5).
	pub cost_evaluator: Arc<CostEvaluator>,
	pub models: IndexMap<String, ModelEntry>,
	pub mcp: McpConfig,
}

impl Config {
	pub fn backend(&self, name: &str) -> Option<&Backend> {
		self.backends.get(name)
	}
}

/// Parse and validate a YAML document into a [`Config`]. Rejects the older
/// config generation's top-level keys (`rules`, `selectedRouteHeaderKey`)
/// with a diagnostic naming the offending key, per the Open Question
/// resolution in DESIGN.md.
pub fn parse(yaml: &str) -> Result<Config, ConfigError> {
	let document: serde_yaml::Value = serde_yaml::from_str(yaml)?;
	if let serde_yaml::Value::Mapping(map) = &document {
		for key in DEPRECATED_KEYS {
			if map.contains_key(serde_yaml::Value::String((*key).to_string())) {
				return Err(ConfigError::DeprecatedField(key));
			}
		}
	}
	let raw: RawConfig = serde_yaml::from_value(document)?;
	validate(raw)
}

fn validate(raw: RawConfig) -> Result<Config, ConfigError> {
	let mut backends = IndexMap::with_capacity(raw.backends.len());
	for (name, raw_backend) in raw.backends {
		backends.insert(
			name.clone(),
			Backend {
				name,
				schema: raw_backend.schema.name,
				auth: raw_backend.auth.map(Into::into),
				header_mutation: raw_backend.header_mutation.unwrap_or_default().into(),
				model_name_override: raw_backend.model_name_override,
			},
		);
	}

	let mut llm_request_costs = Vec::with_capacity(raw.llm_request_costs.len());
	for raw_cost in raw.llm_request_costs {
		let kind = match raw_cost.kind {
			RawCostKind::Fixed { kind } => CostKind::Fixed(kind),
			RawCostKind::Cel { cel } => CostKind::Cel(cel),
		};
		llm_request_costs.push(CostDescriptor {
			metadata_key: raw_cost.metadata_key,
			kind,
		});
	}

	let models = raw
		.models
		.into_iter()
		.map(|(key, entry)| {
			(
				key,
				ModelEntry {
					id: entry.id,
					owned_by: entry.owned_by.unwrap_or_else(|| "ai-gateway".to_string()),
				},
			)
		})
		.collect();

	let mut mcp = McpConfig::default();
	if let Some(raw_mcp) = raw.mcp {
		let mut upstreams = IndexMap::with_capacity(raw_mcp.upstreams.len());
		for (name, raw_upstream) in raw_mcp.upstreams {
			let target = url::Url::parse(&raw_upstream.target)
				.map_err(|e| ConfigError::Validation(format!("mcp upstream `{name}`: {e}")))?;
			upstreams.insert(
				name.clone(),
				McpUpstream {
					name,
					target,
				},
			);
		}
		mcp.upstreams = upstreams;
	}

	let cost_evaluator = CostEvaluator::compile(&llm_request_costs)
		.map_err(|err| ConfigError::Validation(err.to_string()))?;

	Ok(Config {
		uuid: raw.uuid.unwrap_or_else(Uuid::new_v4),
		metadata_namespace: raw.metadata_namespace,
		model_name_header_key: raw.model_name_header_key,
		backends,
		llm_request_costs,
		cost_evaluator: Arc::new(cost_evaluator),
		models,
		mcp,
	})
}

/// Unused in validated output but kept for admin diagnostics that want to
/// report which deprecated keys exist in a document without failing parse.
pub fn deprecated_keys() -> &'static [&'static str] {
	DEPRECATED_KEYS
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_minimal_document() {
		let yaml = r#"
backends:
  openai-default:
    schema:
      name: OpenAI
models:
  gpt-4o:
    id: gpt-4o
"#;
		let config = parse(yaml).unwrap();
		assert_eq!(config.backends.len(), 1);
		assert_eq!(config.backends["openai-default"].schema, ApiSchemaKind::OpenAI);
		assert_eq!(config.models["gpt-4o"].id, "gpt-4o");
		assert_eq!(config.metadata_namespace, "ai_gateway");
	}

	#[test]
	fn rejects_deprecated_rules_key() {
		let yaml = "rules:\n  - foo\n";
		let err = parse(yaml).unwrap_err();
		assert!(matches!(err, ConfigError::DeprecatedField("rules")));
	}

	#[test]
	fn rejects_deprecated_selected_route_header_key() {
		let yaml = "selectedRouteHeaderKey: x-route\n";
		let err = parse(yaml).unwrap_err();
		assert!(matches!(
			err,
			ConfigError::DeprecatedField("selectedRouteHeaderKey")
		));
	}

	#[test]
	fn rejects_unknown_top_level_field() {
		let yaml = "bogusField: true\n";
		assert!(parse(yaml).is_err());
	}

	#[test]
	fn parses_bedrock_backend_with_aws_auth() {
		let yaml = r#"
backends:
  bedrock-default:
    schema:
      name: AWSBedrock
    auth:
      kind: Aws
      accessKeyId: AKIAEXAMPLE
      secretAccessKey: secret
      region: us-east-1
    headerMutation:
      set:
        - name: x-amz-target
          value: AmazonBedrockRuntime
      remove:
        - authorization
"#;
		let config = parse(yaml).unwrap();
		let backend = &config.backends["bedrock-default"];
		assert_eq!(backend.schema, ApiSchemaKind::AWSBedrock);
		assert!(matches!(backend.auth, Some(BackendAuth::Aws { .. })));
		assert_eq!(backend.header_mutation.remove, vec!["authorization"]);
	}

	#[test]
	fn cel_cost_descriptor_round_trips() {
		let yaml = r#"
llmRequestCosts:
  - metadataKey: total_cost
    cel: "input_tokens * 0.01 + output_tokens * 0.03"
"#;
		let config = parse(yaml).unwrap();
		assert_eq!(config.llm_request_costs.len(), 1);
		assert!(matches!(config.llm_request_costs[0].kind, CostKind::Cel(_)));
	}
}
