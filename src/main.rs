mod calc;
mod config;
mod db;
mod export;
mod ipc;
mod repo;
mod schedule;
mod year_clone;
mod years;

use std::io::{self, BufRead, Write};

fn write_line(out: &mut impl Write, value: &serde_json::Value) -> io::Result<()> {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    writeln!(out, "{}", line)?;
    out.flush()
}

fn main() {
    let config = config::Config::from_env();
    config::init_logging(&config);

    let mut state = ipc::AppState::default();
    if let Some(ws) = &config.workspace {
        if let Err(e) = ipc::open_workspace(&mut state, ws) {
            tracing::error!(workspace = %ws.display(), error = %format!("{e:#}"), "failed to open workspace");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                if write_line(&mut stdout, &ipc::bad_json(e.to_string())).is_err() {
                    break;
                }
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        if write_line(&mut stdout, &resp).is_err() {
            break;
        }
        for event in state.drain_events() {
            if write_line(&mut stdout, &event).is_err() {
                break;
            }
        }
    }
    tracing::debug!("stdin closed, exiting");
}
