//! Logging bootstrap (ambient stack): `tracing-subscriber` with an
//! `EnvFilter` built from the `logLevel` CLI flag, writing to stderr so
//! stdout stays free for anything the process is piped into. Compact,
//! colored output when stderr is a terminal; structured JSON lines
//! otherwise, matching how most deployments actually consume these logs.

use std::io::IsTerminal;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Call once, at process startup,
/// before anything else logs.
pub fn init(log_level: &str) {
	let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	let is_tty = std::io::stderr().is_terminal();

	let subscriber = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_span_events(FmtSpan::CLOSE);

	if is_tty {
		subscriber.with_ansi(true).compact().init();
	} else {
		subscriber.with_ansi(false).json().flatten_event(true).init();
	}
}
