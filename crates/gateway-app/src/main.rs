//! Entry point for `extproc-gateway` (§6 startup contract, §5 shutdown).
//!
//! Startup order: install logging, parse and validate the initial config,
//! bind every listener, spawn the config watcher and the gRPC/HTTP servers,
//! then emit the ready banner. Shutdown drains in-flight streams for up to
//! 5 s before the process exits.

mod cli;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use extproc_core::listen::{Address, Listener};
use extproc_core::signal::Shutdown;
use extproc_gateway::config::store::ConfigStore;
use extproc_gateway::error::ConfigError;
use extproc_gateway::extproc::registry::ProcessorRegistry;
use extproc_gateway::extproc::router::HeaderBasedSelector;
use extproc_gateway::extproc::service::ExtProcService;
use extproc_gateway::health::{HealthService, ServingStatusCell};
use extproc_gateway::telemetry::{init_meter_provider, GenAiObserver};
use extproc_protos::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessorServer;
use extproc_protos::grpc::health::v1::health_server::HealthServer;
use prometheus_client::registry::Registry;
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{error, info};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const READY_BANNER: &str = "AI Gateway External Processor is ready";

#[tokio::main]
async fn main() {
	let cli = cli::Cli::parse();
	extproc_gateway::telemetry::logging::init(&cli.log_level);

	if let Err(err) = run(cli).await {
		error!(error = %err, "startup failed");
		std::process::exit(1);
	}
}

async fn run(cli: cli::Cli) -> anyhow::Result<()> {
	let initial_yaml = fs_err::tokio::read_to_string(&cli.config_path).await?;
	let initial_config = extproc_gateway::config::parse(&initial_yaml).map_err(|err: ConfigError| anyhow::anyhow!(err))?;
	info!(uuid = %initial_config.uuid, path = %cli.config_path.display(), "loaded initial configuration");

	let config_store = ConfigStore::new(initial_config);
	let status = ServingStatusCell::new();
	status.set_serving(true);

	tokio::spawn(extproc_gateway::config::watcher::watch(
		cli.config_path.clone(),
		config_store.clone(),
		status.clone(),
	));

	let meter_provider = init_meter_provider()?;

	let mut registry = Registry::default();
	extproc_core::tokio_metrics::TokioCollector::register(&mut registry, &tokio::runtime::Handle::current());

	let metrics_header_attributes = cli::parse_header_attributes(&cli.metrics_request_header_attributes);
	let span_header_attributes = cli::parse_header_attributes(&cli.span_request_header_attributes);

	let observer = Arc::new(GenAiObserver::new(config_store.clone()));
	let ext_proc_service = ExtProcService::new(
		config_store.clone(),
		Arc::new(ProcessorRegistry::build(&cli.root_prefix)),
		Arc::new(HeaderBasedSelector),
		observer,
	)
	.with_header_attributes(metrics_header_attributes)
	.with_span_attributes(span_header_attributes);

	let health_service = HealthService::new(status.clone());

	let ext_proc_addr = Address::parse(&cli.ext_proc_addr)?;
	let ext_proc_listener = Listener::bind(&ext_proc_addr).await?;
	let ext_proc_socket_addr = tcp_socket_addr(&ext_proc_listener);

	// `Shutdown::wait` consumes its receiver, so it runs on its own task and
	// fans the signal out to every listener via a `CancellationToken`.
	let shutdown = Shutdown::new();
	let cancel = CancellationToken::new();
	let watcher_cancel = cancel.clone();
	tokio::spawn(async move {
		shutdown.wait().await;
		info!("shutdown signal received, draining in-flight streams");
		watcher_cancel.cancel();
	});

	let max_recv = cli.max_recv_msg_size;
	let grpc_cancel = cancel.clone();
	let grpc_task = tokio::spawn(async move {
		let server = Server::builder()
			.add_service(ExternalProcessorServer::new(ext_proc_service).max_decoding_message_size(max_recv))
			.add_service(HealthServer::new(health_service));

		let result = match ext_proc_listener {
			Listener::Tcp(listener) => {
				server
					.serve_with_incoming_shutdown(TcpListenerStream::new(listener), grpc_cancel.cancelled_owned())
					.await
			},
			Listener::Unix(listener) => {
				server
					.serve_with_incoming_shutdown(UnixListenerStream::new(listener), grpc_cancel.cancelled_owned())
					.await
			},
		};
		if let Err(err) = result {
			error!(error = %err, "ext_proc gRPC server exited with an error");
		}
	});

	if let Some(mcp_addr) = &cli.mcp_addr {
		let seeds = cli::parse_seeds(&cli.mcp_session_encryption_seed);
		let mcp_metrics = Arc::new(extproc_gateway::mcp::metrics::McpMetrics::new(&mut registry));

		let mcp_app = extproc_gateway::mcp::proxy::McpApp::new(
			config_store.clone(),
			seeds,
			mcp_metrics,
			Duration::from_secs(cli.mcp_write_timeout_secs),
		);
		let mcp_address = Address::parse(mcp_addr)?;
		let mcp_listener = Listener::bind(&mcp_address).await?;
		tokio::spawn(serve_axum(mcp_listener, mcp_app.router(), cancel.clone()));
	}

	let admin_registry = Arc::new(registry);
	let admin_app = extproc_gateway::admin::AdminApp::new(admin_registry, ext_proc_socket_addr);
	let admin_listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.admin_port)).await?;
	tokio::spawn(serve_axum(Listener::Tcp(admin_listener), admin_app.router(), cancel.clone()));

	eprintln!("{READY_BANNER}");

	cancel.cancelled().await;
	tokio::time::timeout(DRAIN_TIMEOUT, grpc_task).await.ok();

	meter_provider.shutdown()?;
	Ok(())
}

fn tcp_socket_addr(listener: &Listener) -> Option<SocketAddr> {
	match listener {
		Listener::Tcp(listener) => listener.local_addr().ok(),
		Listener::Unix(_) => None,
	}
}

async fn serve_axum(listener: Listener, router: axum::Router, cancel: CancellationToken) {
	let result = match listener {
		Listener::Tcp(listener) => {
			axum::serve(listener, router)
				.with_graceful_shutdown(cancel.cancelled_owned())
				.await
		},
		Listener::Unix(listener) => {
			axum::serve(listener, router)
				.with_graceful_shutdown(cancel.cancelled_owned())
				.await
		},
	};
	if let Err(err) = result {
		error!(error = %err, "http server exited with an error");
	}
}
