//! The AI Gateway External Processor: a gRPC ExtProc server that sits in
//! front of heterogeneous LLM backends, translating OpenAI-shaped requests
//! and responses to and from each backend's native wire format while
//! accounting tokens and reloading configuration without downtime.

pub mod admin;
pub mod config;
pub mod error;
pub mod extproc;
pub mod health;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod telemetry;
pub mod translate;
