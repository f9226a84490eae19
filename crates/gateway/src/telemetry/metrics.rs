//! The token/latency accountant (§4.5): four OTel histograms following the
//! Generative-AI semantic conventions, fed from every completed (or failed)
//! ExtProc stream via [`GenAiObserver`].
//!
//! Exporter selection mirrors the `OTEL_*` environment variables the
//! surrounding proxy already honors for tracing: `OTEL_SDK_DISABLED`,
//! `OTEL_METRICS_EXPORTER` (`otlp` or `none`), `OTEL_EXPORTER_OTLP_ENDPOINT` /
//! `OTEL_EXPORTER_OTLP_METRICS_ENDPOINT`, `OTEL_EXPORTER_OTLP_PROTOCOL`
//! (`grpc` or `http/protobuf`), `OTEL_SERVICE_NAME`, and
//! `OTEL_RESOURCE_ATTRIBUTES`.

use std::env;

use opentelemetry::metrics::Histogram;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{MetricExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use tracing::warn;

use crate::config::store::ConfigStore;
use crate::config::ApiSchemaKind;
use crate::extproc::registry::RouteKind;
use crate::extproc::state::ModelNames;
use crate::extproc::{RequestObserver, RequestOutcome};

const METER_NAME: &str = "ai_gateway";
const DEFAULT_SERVICE_NAME: &str = "ai-gateway-extproc";

/// Builds and installs the process-wide meter provider, returning it so the
/// caller can flush and shut it down on exit. Honors `OTEL_SDK_DISABLED=true`
/// and `OTEL_METRICS_EXPORTER=none` by installing a provider with no reader,
/// which still lets instruments be created but never exports anything.
pub fn init_meter_provider() -> anyhow::Result<SdkMeterProvider> {
	let resource = Resource::builder()
		.with_service_name(service_name())
		.with_attributes(resource_attributes())
		.build();

	if sdk_disabled() || metrics_exporter() == "none" {
		let provider = SdkMeterProvider::builder().with_resource(resource).build();
		global::set_meter_provider(provider.clone());
		return Ok(provider);
	}

	let exporter = match otlp_protocol() {
		Protocol::Grpc => {
			let mut builder = MetricExporter::builder().with_tonic();
			if let Some(endpoint) = otlp_endpoint() {
				builder = builder.with_endpoint(endpoint);
			}
			builder.build()?
		},
		protocol => {
			let mut builder = MetricExporter::builder().with_http().with_protocol(protocol);
			if let Some(endpoint) = otlp_endpoint() {
				builder = builder.with_endpoint(endpoint);
			}
			builder.build()?
		},
	};

	let reader = PeriodicReader::builder(exporter).build();
	let provider = SdkMeterProvider::builder().with_resource(resource).with_reader(reader).build();
	global::set_meter_provider(provider.clone());
	Ok(provider)
}

fn sdk_disabled() -> bool {
	env::var("OTEL_SDK_DISABLED").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn metrics_exporter() -> String {
	env::var("OTEL_METRICS_EXPORTER").unwrap_or_else(|_| "otlp".to_string())
}

fn otlp_endpoint() -> Option<String> {
	env::var("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT")
		.or_else(|_| env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
		.ok()
}

fn otlp_protocol() -> Protocol {
	match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
		Ok("grpc") => Protocol::Grpc,
		Ok("http/json") => Protocol::HttpJson,
		_ => Protocol::HttpBinary,
	}
}

fn service_name() -> String {
	env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string())
}

fn resource_attributes() -> Vec<KeyValue> {
	let Ok(raw) = env::var("OTEL_RESOURCE_ATTRIBUTES") else {
		return Vec::new();
	};
	raw
		.split(',')
		.filter_map(|pair| {
			let (key, value) = pair.split_once('=')?;
			Some(KeyValue::new(key.trim().to_string(), value.trim().to_string()))
		})
		.collect()
}

fn operation_name(route: RouteKind) -> &'static str {
	match route {
		RouteKind::ChatCompletions | RouteKind::AnthropicMessages => "chat",
		RouteKind::Completions => "text_completion",
		RouteKind::Embeddings => "embeddings",
		RouteKind::Models => "models",
	}
}

fn provider_name(schema: ApiSchemaKind) -> &'static str {
	match schema {
		ApiSchemaKind::OpenAI => "openai",
		ApiSchemaKind::AzureOpenAI => "azure.ai.openai",
		ApiSchemaKind::AWSBedrock => "aws.bedrock",
		ApiSchemaKind::Anthropic => "anthropic",
		ApiSchemaKind::GCPVertexAI => "gcp.vertex_ai",
		ApiSchemaKind::GCPAnthropic => "gcp.vertex_ai",
	}
}

/// The four histograms named in §4.5, plus the fixed set of attributes
/// common to all of them.
pub struct GenAiMetrics {
	token_usage: Histogram<u64>,
	request_duration: Histogram<f64>,
	time_to_first_token: Histogram<f64>,
	time_per_output_token: Histogram<f64>,
}

impl GenAiMetrics {
	pub fn new() -> Self {
		let meter = global::meter(METER_NAME);
		GenAiMetrics {
			token_usage: meter
				.u64_histogram("gen_ai.client.token.usage")
				.with_description("Number of tokens used per gen-ai request")
				.build(),
			request_duration: meter
				.f64_histogram("gen_ai.server.request.duration")
				.with_unit("s")
				.with_description("Gen-ai server request duration")
				.build(),
			time_to_first_token: meter
				.f64_histogram("gen_ai.server.time_to_first_token")
				.with_unit("s")
				.with_description("Time to first token for streaming gen-ai responses")
				.build(),
			time_per_output_token: meter
				.f64_histogram("gen_ai.server.time_per_output_token")
				.with_unit("s")
				.with_description("Inter-token latency for streaming gen-ai responses")
				.build(),
		}
	}
}

impl Default for GenAiMetrics {
	fn default() -> Self {
		GenAiMetrics::new()
	}
}

/// Bridges a completed ExtProc stream into the four histograms, evaluating
/// the configured cost descriptors is explicitly **not** this type's job:
/// those are published as dynamic metadata directly by
/// [`crate::extproc::service`], which has the per-request token counts in
/// hand before the observer ever runs.
pub struct GenAiObserver {
	metrics: GenAiMetrics,
	config: ConfigStore,
}

impl GenAiObserver {
	pub fn new(config: ConfigStore) -> Self {
		GenAiObserver {
			metrics: GenAiMetrics::new(),
			config,
		}
	}

	fn common_attributes(&self, outcome: &RequestOutcome) -> Vec<KeyValue> {
		let backend = outcome.backend.as_deref();
		let current = self.config.current();
		let schema = backend.and_then(|name| current.backend(name)).map(|b| b.schema);

		let mut attrs = Vec::with_capacity(6);
		if let Some(route) = outcome.route {
			attrs.push(KeyValue::new("gen_ai.operation.name", operation_name(route)));
		}
		if let Some(schema) = schema {
			attrs.push(KeyValue::new("gen_ai.provider.name", provider_name(schema)));
		}
		push_model_attributes(&mut attrs, &outcome.models);
		attrs
	}
}

fn push_model_attributes(attrs: &mut Vec<KeyValue>, models: &ModelNames) {
	if let Some(original) = &models.original {
		attrs.push(KeyValue::new("gen_ai.original.model", original.clone()));
	}
	if let Some(requested) = &models.request_after_override {
		attrs.push(KeyValue::new("gen_ai.request.model", requested.clone()));
	}
	if let Some(responded) = &models.response_actual {
		attrs.push(KeyValue::new("gen_ai.response.model", responded.clone()));
	}
}

impl RequestObserver for GenAiObserver {
	fn record_completion(&self, outcome: &RequestOutcome) {
		let mut attrs = self.common_attributes(outcome);
		for (key, value) in &outcome.extra_attributes {
			attrs.push(KeyValue::new(key.clone(), value.clone()));
		}

		self.metrics.token_usage.record(
			outcome.usage.input_tokens,
			&append(&attrs, KeyValue::new("gen_ai.token.type", "input")),
		);
		self.metrics.token_usage.record(
			outcome.usage.cached_input_tokens,
			&append(&attrs, KeyValue::new("gen_ai.token.type", "cached_input")),
		);
		self.metrics.token_usage.record(
			outcome.usage.output_tokens,
			&append(&attrs, KeyValue::new("gen_ai.token.type", "output")),
		);

		let mut duration_attrs = attrs.clone();
		if let Some(error_type) = outcome.error_type {
			duration_attrs.push(KeyValue::new("error.type", error_type));
		}
		self
			.metrics
			.request_duration
			.record(outcome.duration.as_secs_f64(), &duration_attrs);

		if let Some(ttft) = outcome.time_to_first_token {
			self.metrics.time_to_first_token.record(ttft.as_secs_f64(), &attrs);

			let output_tokens = outcome.usage.output_tokens;
			if output_tokens >= 2 {
				let per_token = (outcome.duration.as_secs_f64() - ttft.as_secs_f64()) / (output_tokens - 1) as f64;
				if per_token.is_finite() && per_token >= 0.0 {
					self.metrics.time_per_output_token.record(per_token, &attrs);
				}
			}
		}

		if let Some(error_type) = outcome.error_type {
			warn!(backend = ?outcome.backend, error_type, status = outcome.status_code, "request completed with an error");
		}
	}
}

fn append(attrs: &[KeyValue], extra: KeyValue) -> Vec<KeyValue> {
	let mut out = Vec::with_capacity(attrs.len() + 1);
	out.extend_from_slice(attrs);
	out.push(extra);
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn operation_name_maps_every_route() {
		assert_eq!(operation_name(RouteKind::ChatCompletions), "chat");
		assert_eq!(operation_name(RouteKind::AnthropicMessages), "chat");
		assert_eq!(operation_name(RouteKind::Completions), "text_completion");
		assert_eq!(operation_name(RouteKind::Embeddings), "embeddings");
		assert_eq!(operation_name(RouteKind::Models), "models");
	}

	#[test]
	fn provider_name_maps_every_schema() {
		assert_eq!(provider_name(ApiSchemaKind::OpenAI), "openai");
		assert_eq!(provider_name(ApiSchemaKind::AWSBedrock), "aws.bedrock");
		assert_eq!(provider_name(ApiSchemaKind::GCPAnthropic), "gcp.vertex_ai");
	}

	#[test]
	fn resource_attributes_parses_comma_separated_pairs() {
		// SAFETY: tests run single-threaded within this module; no other test
		// reads this environment variable.
		unsafe {
			env::set_var("OTEL_RESOURCE_ATTRIBUTES", "deployment.environment=prod, team = gateway");
		}
		let attrs = resource_attributes();
		assert_eq!(attrs.len(), 2);
		unsafe {
			env::remove_var("OTEL_RESOURCE_ATTRIBUTES");
		}
	}
}
