pub mod launch;
pub mod ports;
pub mod procs;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::OutputFormat;

pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	match cli.command {
		Commands::Launch(args) => launch::execute(args, format).await,
		Commands::Ports(args) => ports::execute(args, format).await,
		Commands::Procs(args) => procs::execute(args, format).await,
	}
}
