// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end test driving the compiled binary over its stdio transport.
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

fn spawn_engine() -> std::process::Child {
    Command::new(env!("CARGO_BIN_EXE_quill"))
        .args(["--stdio"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("binary must spawn")
}

/// Read NDJSON events until `stop` matches one of them or the timeout hits.
fn read_until(
    reader: &mut impl BufRead,
    timeout: Duration,
    stop: impl Fn(&serde_json::Value) -> bool,
) -> Vec<serde_json::Value> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    let mut line = String::new();
    while Instant::now() < deadline {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let value: serde_json::Value =
                    serde_json::from_str(line.trim()).expect("every output line is JSON");
                let done = stop(&value);
                events.push(value);
                if done {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    events
}

#[test]
fn hello_session_round_trip_over_stdio() {
    let mut child = spawn_engine();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    // The default (mock) provider echoes the user message back.
    writeln!(
        stdin,
        r#"{{"type":"start_session","session_id":"e2e","repo_root":"/tmp","config":{{"provider":"mock"}}}}"#
    )
    .unwrap();
    writeln!(
        stdin,
        r#"{{"type":"user_message","session_id":"e2e","message":"ping"}}"#
    )
    .unwrap();

    let events = read_until(&mut stdout, Duration::from_secs(30), |v| {
        v["type"] == "done"
    });

    let types: Vec<&str> = events.iter().filter_map(|v| v["type"].as_str()).collect();
    assert!(types.contains(&"status"), "events: {types:?}");
    assert!(
        events.iter().any(|v| v["type"] == "status" && v["status"] == "session_ready"),
        "session_ready expected: {events:?}"
    );
    let done = events
        .iter()
        .find(|v| v["type"] == "done")
        .expect("done event");
    assert!(
        done["summary"].as_str().unwrap().contains("MOCK: ping"),
        "{done}"
    );
    assert_eq!(done["session_id"], "e2e");

    // Closing stdin shuts the engine down cleanly (exit code 0).
    drop(stdin);
    let status = child.wait().expect("engine exits");
    assert!(status.success(), "clean shutdown expected, got {status}");
}

#[test]
fn startup_without_transport_flag_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_quill"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .expect("binary must run");
    assert!(!output.status.success(), "missing --stdio is a startup error");
}
