//! MCP proxy metrics (§4.8): request duration, method count, initialization
//! duration, negotiated capabilities by side and kind, and progress
//! notifications. Registered into the process-wide Prometheus registry the
//! same way the teacher's `core::tokio_metrics::TokioCollector` is, so they
//! show up alongside runtime metrics at `GET /metrics`.

use std::fmt::Write as _;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MethodLabels {
	pub upstream: String,
	pub method: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpstreamLabels {
	pub upstream: String,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum CapabilitySide {
	Client,
	Server,
}

impl EncodeLabelValue for CapabilitySide {
	fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
		encoder.write_str(match self {
			CapabilitySide::Client => "client",
			CapabilitySide::Server => "server",
		})
	}
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum CapabilityKind {
	Tools,
	Prompts,
	Resources,
	Sampling,
	Roots,
	Logging,
}

impl EncodeLabelValue for CapabilityKind {
	fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
		encoder.write_str(match self {
			CapabilityKind::Tools => "tools",
			CapabilityKind::Prompts => "prompts",
			CapabilityKind::Resources => "resources",
			CapabilityKind::Sampling => "sampling",
			CapabilityKind::Roots => "roots",
			CapabilityKind::Logging => "logging",
		})
	}
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CapabilityLabels {
	pub side: CapabilitySide,
	pub kind: CapabilityKind,
}

#[derive(Debug, Clone)]
pub struct McpMetrics {
	pub request_duration: Family<MethodLabels, Histogram>,
	pub method_count: Family<MethodLabels, Counter>,
	pub init_duration: Family<UpstreamLabels, Histogram>,
	pub capabilities: Family<CapabilityLabels, Counter>,
	pub progress_notifications: Family<UpstreamLabels, Counter>,
}

impl McpMetrics {
	pub fn new(registry: &mut Registry) -> Self {
		let sub = registry.sub_registry_with_prefix("mcp");

		let request_duration = Family::<MethodLabels, Histogram>::new_with_constructor(|| {
			Histogram::new(exponential_buckets(0.001, 2.0, 16))
		});
		sub.register(
			"request_duration_seconds",
			"Duration of a single MCP JSON-RPC request/response round trip",
			request_duration.clone(),
		);

		let method_count = Family::<MethodLabels, Counter>::default();
		sub.register("method_requests", "Count of MCP JSON-RPC requests by method", method_count.clone());

		let init_duration = Family::<UpstreamLabels, Histogram>::new_with_constructor(|| {
			Histogram::new(exponential_buckets(0.001, 2.0, 16))
		});
		sub.register(
			"initialize_duration_seconds",
			"Duration of the MCP initialize handshake against an upstream",
			init_duration.clone(),
		);

		let capabilities = Family::<CapabilityLabels, Counter>::default();
		sub.register(
			"negotiated_capabilities",
			"Count of negotiated capabilities by side (client/server) and kind",
			capabilities.clone(),
		);

		let progress_notifications = Family::<UpstreamLabels, Counter>::default();
		sub.register(
			"progress_notifications",
			"Count of progress notifications relayed from an upstream",
			progress_notifications.clone(),
		);

		McpMetrics {
			request_duration,
			method_count,
			init_duration,
			capabilities,
			progress_notifications,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn registers_without_panicking_and_records_a_sample() {
		let mut registry = Registry::default();
		let metrics = McpMetrics::new(&mut registry);
		metrics
			.method_count
			.get_or_create(&MethodLabels {
				upstream: "docs".to_string(),
				method: "tools/list".to_string(),
			})
			.inc();
		metrics
			.capabilities
			.get_or_create(&CapabilityLabels {
				side: CapabilitySide::Server,
				kind: CapabilityKind::Tools,
			})
			.inc();

		let mut buffer = String::new();
		prometheus_client::encoding::text::encode(&mut buffer, &registry).unwrap();
		assert!(buffer.contains("mcp_method_requests_total"));
		assert!(buffer.contains("mcp_negotiated_capabilities_total"));
	}
}
