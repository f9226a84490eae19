//! Vendored protobuf IDL for the ExtProc gRPC surface: Envoy's external
//! processor service and the standard gRPC health-checking service.
//! Generated at build time by `build.rs` via `protox` + `tonic-prost-build`.

pub mod envoy {
	pub mod config {
		pub mod core {
			pub mod v3 {
				tonic::include_proto!("envoy.config.core.v3");
			}
		}
	}
	pub mod r#type {
		pub mod v3 {
			tonic::include_proto!("envoy.type.v3");
		}
	}
	pub mod service {
		pub mod ext_proc {
			pub mod v3 {
				tonic::include_proto!("envoy.service.ext_proc.v3");
			}
		}
	}
}

pub mod grpc {
	pub mod health {
		pub mod v1 {
			tonic::include_proto!("grpc.health.v1");
		}
	}
}
