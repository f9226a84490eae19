use std::env;
use std::path::PathBuf;

use prost::Message;

fn main() -> Result<(), anyhow::Error> {
	let proto_files = [
		"proto/envoy/service/ext_proc/v3/external_processor.proto",
		"proto/grpc/health/v1/health.proto",
	]
	.iter()
	.map(|name| std::env::current_dir().unwrap().join(name))
	.collect::<Vec<_>>();
	let include_dirs = ["proto/"]
		.iter()
		.map(|i| std::env::current_dir().unwrap().join(i))
		.collect::<Vec<_>>();
	let fds = protox::compile(&proto_files, &include_dirs)?;

	let out_dir = PathBuf::from(env::var("OUT_DIR")?);
	let descriptor_path = out_dir.join("proto_descriptor.bin");
	std::fs::write(&descriptor_path, fds.encode_to_vec())?;

	let mut config = prost_build::Config::new();
	config.disable_comments(Some("."));
	config.extern_path(".google.protobuf.Struct", "::prost_wkt_types::Struct");

	tonic_prost_build::configure()
		.build_server(true)
		.build_client(true)
		.compile_fds_with_config(fds.clone(), config)?;

	prost_wkt_build::add_serde(out_dir, fds);

	for path in [proto_files, include_dirs].concat() {
		println!("cargo:rerun-if-changed={}", path.to_str().unwrap());
	}
	Ok(())
}
