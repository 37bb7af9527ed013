//! Lists the simulator processes a teardown would consider.

use clap::Args;
use safari_sim::{DEFAULT_PROCESS_FILTER, ProcessEnumerator, PsEnumerator};

use crate::error::Result;
use crate::output::{OutputFormat, ProcessListData, ResultBuilder, print_result};

#[derive(Debug, Clone, Args)]
pub struct ProcsArgs {
	/// Substring matched against the process listing
	#[arg(long, default_value = DEFAULT_PROCESS_FILTER)]
	pub filter: String,
}

pub async fn execute(args: ProcsArgs, format: OutputFormat) -> Result<()> {
	let pids = PsEnumerator::default().list_matching(&args.filter).await?;

	let result = ResultBuilder::new("procs")
		.data(ProcessListData { filter: args.filter, pids })
		.build();
	print_result(&result, format);
	Ok(())
}
