//! The optional MCP proxy (§4.8): an HTTP front-end that speaks JSON-RPC 2.0
//! to a single named upstream per session, framed over either HTTP-JSON or
//! HTTP-SSE. Session identifiers handed to the downstream client are opaque
//! and encrypted (see [`crypto`]) so the upstream's own session id is never
//! exposed on the wire.
//!
//! Grounded on the teacher's `mcp` module (`streamablehttp.rs`, `session.rs`)
//! but scoped down to this crate's single-upstream-per-session model: no
//! request fan-out, multiplexing, or RBAC layer, since SPEC_FULL.md's MCP
//! surface names none of those.

pub mod crypto;
pub mod metrics;
pub mod proxy;
pub mod session;

/// The MCP proxy's error taxonomy lives centrally in [`crate::error`]
/// alongside `ProcessorError`/`TranslateError`/`ConfigError`, re-exported
/// here so proxy code can keep saying `McpError` without an extra import.
pub use crate::error::McpError;
