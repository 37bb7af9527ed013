use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

/// 0 = launcher notices only, server output hidden unless it warns
/// 1 (-v) = info for everything, including forwarded server output
/// 2+ (-vv) = debug, including state transitions and port probes
fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn,safari_sim=info",
		1 => "info",
		_ => "debug",
	}
}
