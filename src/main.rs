mod attendance;
mod backup;
mod calc;
mod classroom;
mod config;
mod db;
mod error;
mod grades;
mod grid;
mod ipc;
mod model;
mod reports;
mod schedule;
mod taker;

use std::io::{self, BufRead, Write};

fn main() {
    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("classbookd: {e}");
            std::process::exit(2);
        }
    };
    config::init_logging(&config);

    let mut state = ipc::AppState::new(config.today);
    if let Some(workspace) = config.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, workspace) {
            tracing::error!(
                workspace = %workspace.to_string_lossy(),
                error = %format!("{e:#}"),
                "could not open configured workspace"
            );
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), today = %state.today(), "classbookd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin closed with error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                tracing::warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, exiting");
}
