//! The ExtProc gRPC server (§4): per-stream state machine, path-prefix
//! routing, backend selection, and the retry-aware header mutator.

pub mod grpc_types;
pub mod header_mutator;
pub mod registry;
pub mod router;
pub mod service;
pub mod state;

pub use service::{ExtProcService, NoopObserver, RequestObserver, RequestOutcome};
