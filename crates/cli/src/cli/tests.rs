use std::path::PathBuf;

use clap::Parser;

use super::*;
use crate::commands::launch::{DeviceArg, OrientationArg};

#[test]
fn parse_launch_defaults() {
	let cli = Cli::try_parse_from(["safari-sim", "launch"]).unwrap();

	assert_eq!(cli.verbose, 0);
	assert_eq!(cli.format, OutputFormat::Text);
	match cli.command {
		Commands::Launch(args) => {
			assert_eq!(args.port, None);
			assert_eq!(args.port_range, None);
			assert!(args.browsers.is_empty());
			assert!(!args.no_reset);
		}
		_ => panic!("Expected Launch command"),
	}
}

#[test]
fn parse_launch_with_ranges_and_device() {
	let args = vec![
		"safari-sim",
		"launch",
		"--port-range",
		"6100",
		"6120",
		"--webhook-port",
		"9100",
		"--device",
		"tablet",
		"--browser",
		"Safari",
		"--browser",
		"iPad Safari",
		"--orientation",
		"landscape",
		"--config",
		"launcher.json",
	];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Launch(args) => {
			assert_eq!(args.port_range, Some(vec![6100, 6120]));
			assert_eq!(args.webhook_port, Some(9100));
			assert_eq!(args.device, Some(DeviceArg::Tablet));
			assert_eq!(args.browsers, vec!["Safari", "iPad Safari"]);
			assert_eq!(args.orientation, Some(OrientationArg::Landscape));
			assert_eq!(args.config, Some(PathBuf::from("launcher.json")));
		}
		_ => panic!("Expected Launch command"),
	}
}

#[test]
fn port_range_needs_two_values() {
	assert!(Cli::try_parse_from(["safari-sim", "launch", "--port-range", "6100"]).is_err());
}

#[test]
fn server_args_accept_leading_dashes() {
	let args = vec!["safari-sim", "launch", "--server-cmd", "npx", "--server-arg", "appium", "--server-arg", "--relaxed-security"];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Launch(args) => {
			assert_eq!(args.server_cmd.as_deref(), Some("npx"));
			assert_eq!(args.server_args, vec!["appium", "--relaxed-security"]);
		}
		_ => panic!("Expected Launch command"),
	}
}

#[test]
fn parse_ports_command() {
	let cli = Cli::try_parse_from(["safari-sim", "ports", "--port", "6000", "--max", "6010"]).unwrap();

	match cli.command {
		Commands::Ports(args) => {
			assert_eq!(args.host, "127.0.0.1");
			assert_eq!(args.port, 6000);
			assert_eq!(args.max, Some(6010));
		}
		_ => panic!("Expected Ports command"),
	}
}

#[test]
fn ports_rejects_port_zero() {
	assert!(Cli::try_parse_from(["safari-sim", "ports", "--port", "0"]).is_err());
}

#[test]
fn parse_procs_default_filter() {
	let cli = Cli::try_parse_from(["safari-sim", "procs"]).unwrap();

	match cli.command {
		Commands::Procs(args) => assert_eq!(args.filter, "iOS Simulator"),
		_ => panic!("Expected Procs command"),
	}
}

#[test]
fn global_flags_after_subcommand() {
	let cli = Cli::try_parse_from(["safari-sim", "procs", "-vv", "-f", "json"]).unwrap();

	assert_eq!(cli.verbose, 2);
	assert_eq!(cli.format, OutputFormat::Json);
	assert_eq!(cli.command.name(), "procs");
}

#[test]
fn cli_definition_is_consistent() {
	use clap::CommandFactory;
	Cli::command().debug_assert();
}
