//! Command-line flags (§6 CLI flags table). `clap`'s derive API mirrors the
//! flag names and defaults verbatim; `--mcp-addr` left unset disables the
//! whole MCP proxy rather than needing a separate enable switch.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "extproc-gateway", about = "AI Gateway External Processor")]
pub struct Cli {
	/// Path to YAML configuration; the file is watched every 5 s.
	#[arg(long)]
	pub config_path: std::path::PathBuf,

	/// Where the ExtProc gRPC server listens.
	#[arg(long, default_value = ":1063")]
	pub ext_proc_addr: String,

	/// TCP port for `/metrics` and `/health`.
	#[arg(long, default_value_t = 1064)]
	pub admin_port: u16,

	/// One of `debug|info|warn|error`.
	#[arg(long, default_value = "info")]
	pub log_level: String,

	/// Prepended to every built-in path registration.
	#[arg(long, default_value = "/")]
	pub root_prefix: String,

	/// Max gRPC receive size, in bytes.
	#[arg(long, default_value_t = 4 * 1024 * 1024)]
	pub max_recv_msg_size: usize,

	/// `h1:attr1,h2:attr2`; adds mapped headers as OTel metric attributes.
	#[arg(long, default_value = "")]
	pub metrics_request_header_attributes: String,

	/// Same shape as `metricsRequestHeaderAttributes`, but for tracing spans.
	#[arg(long, default_value = "")]
	pub span_request_header_attributes: String,

	/// If set, enable the MCP proxy on this address.
	#[arg(long)]
	pub mcp_addr: Option<String>,

	/// Comma-separated list; first is the current seed, remainder are
	/// decryption-only fallbacks.
	#[arg(long, default_value = "mcp")]
	pub mcp_session_encryption_seed: String,

	/// HTTP write timeout for MCP streaming responses, in seconds.
	#[arg(long, default_value_t = 120)]
	pub mcp_write_timeout_secs: u64,
}

/// Parses the `h1:attr1,h2:attr2` shape shared by both header-attribute
/// flags into `(header name, attribute name)` pairs.
pub fn parse_header_attributes(raw: &str) -> Vec<(String, String)> {
	raw
		.split(',')
		.filter_map(|pair| {
			let pair = pair.trim();
			if pair.is_empty() {
				return None;
			}
			let (header, attr) = pair.split_once(':')?;
			Some((header.trim().to_string(), attr.trim().to_string()))
		})
		.collect()
}

/// Parses the `mcpSessionEncryptionSeed` comma-separated seed list.
pub fn parse_seeds(raw: &str) -> Vec<String> {
	raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_header_attribute_pairs() {
		let parsed = parse_header_attributes("x-team:team,x-tenant:tenant");
		assert_eq!(
			parsed,
			vec![("x-team".to_string(), "team".to_string()), ("x-tenant".to_string(), "tenant".to_string())]
		);
	}

	#[test]
	fn empty_header_attributes_yields_no_pairs() {
		assert!(parse_header_attributes("").is_empty());
	}

	#[test]
	fn parses_seed_list_with_current_first() {
		assert_eq!(parse_seeds("mcp,old-seed"), vec!["mcp".to_string(), "old-seed".to_string()]);
	}
}
