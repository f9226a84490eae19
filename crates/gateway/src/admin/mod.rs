//! The admin HTTP surface (§6): Prometheus text exposition at `GET /metrics`
//! and a liveness probe at `GET /health`. Grounded on the sibling example's
//! `admin.rs`/`mtrcs.rs` axum routers (`Router::new().route(...).with_state(...)`,
//! `prometheus_client::encoding::text::encode`), since the teacher's own
//! admin surface isn't part of the retrieved pack.
//!
//! `/health` deliberately issues a real loopback gRPC Health Check rather
//! than reading the serving cell in-process (§6: "issues a loopback gRPC
//! Health Check with a 1 s deadline"), so a wedged `ExtProcService` listener
//! still fails the probe even if the serving cell itself is stale.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use extproc_protos::grpc::health::v1::health_check_response::ServingStatus;
use extproc_protos::grpc::health::v1::health_client::HealthClient;
use extproc_protos::grpc::health::v1::HealthCheckRequest;
use prometheus_client::registry::Registry;
use tonic::transport::Channel;
use tracing::error;

const HEALTH_CHECK_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AdminApp {
	registry: Arc<Registry>,
	/// `None` when the ExtProc server listens on a Unix socket: there is no
	/// loopback TCP address to dial for the health check, so `/health`
	/// reports the error rather than attempting one.
	ext_proc_addr: Option<SocketAddr>,
}

impl AdminApp {
	pub fn new(registry: Arc<Registry>, ext_proc_addr: Option<SocketAddr>) -> Self {
		AdminApp { registry, ext_proc_addr }
	}

	pub fn router(&self) -> Router {
		Router::new()
			.route("/metrics", get(metrics_handler))
			.route("/health", get(health_handler))
			.with_state(self.clone())
	}
}

async fn metrics_handler(State(app): State<AdminApp>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	prometheus_client::encoding::text::encode(&mut buffer, &app.registry).map_err(|err| {
		error!(error = %err, "failed to encode prometheus metrics");
		StatusCode::INTERNAL_SERVER_ERROR
	})?;
	Ok(buffer)
}

async fn health_handler(State(app): State<AdminApp>) -> Response {
	let Some(addr) = app.ext_proc_addr else {
		return (
			StatusCode::INTERNAL_SERVER_ERROR,
			"no loopback address available for the ext_proc health check (unix socket listener)\n",
		)
			.into_response();
	};
	match check_serving(addr).await {
		Ok(true) => (StatusCode::OK, "OK\n").into_response(),
		Ok(false) => (StatusCode::INTERNAL_SERVER_ERROR, "NOT_SERVING\n").into_response(),
		Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("health check failed: {err}\n")).into_response(),
	}
}

async fn check_serving(addr: SocketAddr) -> anyhow::Result<bool> {
	let channel = Channel::from_shared(format!("http://{addr}"))?
		.connect_timeout(HEALTH_CHECK_DEADLINE)
		.timeout(HEALTH_CHECK_DEADLINE)
		.connect()
		.await?;
	let mut client = HealthClient::new(channel);
	let response = client
		.check(HealthCheckRequest { service: String::new() })
		.await?
		.into_inner();
	Ok(response.status == ServingStatus::Serving as i32)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serving_status_comparison_matches_the_wire_enum() {
		assert_eq!(ServingStatus::Serving as i32, 1);
		assert_ne!(ServingStatus::NotServing as i32, ServingStatus::Serving as i32);
	}
}
