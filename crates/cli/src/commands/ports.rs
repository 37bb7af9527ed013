//! Free-port lookup, the same search `launch` uses for its control port.

use clap::Args;
use safari_sim::{DEFAULT_CONTROL_PORT, DEFAULT_HOST, TcpProbe, find_free_port};
use tracing::debug;

use crate::error::Result;
use crate::output::{OutputFormat, PortData, ResultBuilder, print_result};

#[derive(Debug, Clone, Args)]
pub struct PortsArgs {
	/// Host to probe
	#[arg(long, default_value = DEFAULT_HOST)]
	pub host: String,

	/// First port to try
	#[arg(short, long, default_value_t = DEFAULT_CONTROL_PORT, value_parser = clap::value_parser!(u16).range(1..))]
	pub port: u16,

	/// Last port to try (default: 65535)
	#[arg(long)]
	pub max: Option<u16>,
}

pub async fn execute(args: PortsArgs, format: OutputFormat) -> Result<()> {
	let probe = TcpProbe::default();
	let port = find_free_port(&probe, &args.host, args.port, args.max).await?;
	debug!(host = %args.host, requested = args.port, port, "free port found");

	let result = ResultBuilder::new("ports")
		.data(PortData {
			host: args.host,
			requested: args.port,
			port,
		})
		.build();
	print_result(&result, format);
	Ok(())
}
