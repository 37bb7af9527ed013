//! End-to-end checks of the `ports` command against real sockets.

use std::net::TcpListener;
use std::process::Command;

fn safari_sim() -> Command {
	Command::new(env!("CARGO_BIN_EXE_safari-sim"))
}

#[test]
fn skips_a_bound_port() {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let busy = listener.local_addr().unwrap().port();

	let output = safari_sim()
		.args(["-f", "json", "ports", "--port", &busy.to_string()])
		.output()
		.unwrap();
	assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

	let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "ports");
	assert_eq!(json["data"]["requested"], busy);
	assert!(json["data"]["port"].as_u64().unwrap() > busy as u64);
}

#[test]
fn exhausted_window_exits_non_zero() {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let busy = listener.local_addr().unwrap().port();

	let output = safari_sim()
		.args(["-f", "json", "ports", "--port", &busy.to_string(), "--max", &busy.to_string()])
		.output()
		.unwrap();
	assert_eq!(output.status.code(), Some(1));

	let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "PORT_EXHAUSTED");
	assert!(String::from_utf8_lossy(&output.stderr).contains("PORT_EXHAUSTED"));
}
