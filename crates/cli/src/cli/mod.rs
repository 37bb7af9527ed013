use clap::{Parser, Subcommand};

use crate::commands::launch::LaunchArgs;
use crate::commands::ports::PortsArgs;
use crate::commands::procs::ProcsArgs;
use crate::output::OutputFormat;

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(name = "safari-sim")]
#[command(about = "Launch mobile Safari on the iOS simulator through an automation server")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default), json, or ndjson
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Start the automation server and hold the session until Ctrl-C
	Launch(LaunchArgs),

	/// Find the first free port at or above a preferred one
	Ports(PortsArgs),

	/// List simulator processes not attached to a terminal
	Procs(ProcsArgs),
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Launch(_) => "launch",
			Commands::Ports(_) => "ports",
			Commands::Procs(_) => "procs",
		}
	}
}
