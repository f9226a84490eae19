//! The standard gRPC health-checking service (§5 "Shared resources"): one
//! serving-status cell, flipped to `SERVING` by the config watcher after its
//! first successful load and to `NOT_SERVING` if every reload since has
//! failed to produce a usable snapshot.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use extproc_protos::grpc::health::v1::health_check_response::ServingStatus;
use extproc_protos::grpc::health::v1::health_server::Health;
use extproc_protos::grpc::health::v1::{HealthCheckRequest, HealthCheckResponse};
use futures::Stream;
use tonic::{Request, Response, Status};

const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shared, lock-free serving flag. Cloning is cheap; every clone observes
/// the same underlying flag.
#[derive(Clone, Default)]
pub struct ServingStatusCell(Arc<AtomicBool>);

impl ServingStatusCell {
	pub fn new() -> Self {
		ServingStatusCell(Arc::new(AtomicBool::new(false)))
	}

	pub fn set_serving(&self, serving: bool) {
		self.0.store(serving, Ordering::SeqCst);
	}

	pub fn is_serving(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	fn status(&self) -> ServingStatus {
		if self.is_serving() {
			ServingStatus::Serving
		} else {
			ServingStatus::NotServing
		}
	}
}

pub struct HealthService {
	status: ServingStatusCell,
}

impl HealthService {
	pub fn new(status: ServingStatusCell) -> Self {
		HealthService { status }
	}
}

#[tonic::async_trait]
impl Health for HealthService {
	type WatchStream = Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send + 'static>>;

	async fn check(&self, _request: Request<HealthCheckRequest>) -> Result<Response<HealthCheckResponse>, Status> {
		Ok(Response::new(HealthCheckResponse {
			status: self.status.status() as i32,
		}))
	}

	async fn watch(&self, _request: Request<HealthCheckRequest>) -> Result<Response<Self::WatchStream>, Status> {
		let status = self.status.clone();
		let stream = async_stream::try_stream! {
			let mut last = None;
			loop {
				let current = status.status();
				if last != Some(current) {
					yield HealthCheckResponse { status: current as i32 };
					last = Some(current);
				}
				tokio::time::sleep(WATCH_POLL_INTERVAL).await;
			}
		};
		Ok(Response::new(Box::pin(stream)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_to_not_serving() {
		let cell = ServingStatusCell::new();
		assert_eq!(cell.status(), ServingStatus::NotServing);
		cell.set_serving(true);
		assert_eq!(cell.status(), ServingStatus::Serving);
	}

	#[tokio::test]
	async fn check_reports_current_status() {
		let cell = ServingStatusCell::new();
		cell.set_serving(true);
		let service = HealthService::new(cell);
		let response = service
			.check(Request::new(HealthCheckRequest { service: String::new() }))
			.await
			.unwrap()
			.into_inner();
		assert_eq!(response.status, ServingStatus::Serving as i32);
	}
}
