mod backend;
mod config;
mod db;
mod diff;
mod gate;
mod ipc;
mod model;
mod normalize;
mod reconcile;
mod working;

use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(cfg: &config::DaemonConfig) {
    let (filter, invalid) = match EnvFilter::try_new(&cfg.log_filter) {
        Ok(f) => (f, false),
        Err(_) => (EnvFilter::new(config::DEFAULT_LOG_FILTER), true),
    };
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
    if invalid {
        warn!(filter = %cfg.log_filter, "invalid log filter; using default");
    }
}

fn main() {
    let cfg = config::DaemonConfig::from_env();
    init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "prefsd starting");

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_deref() {
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            let error = format!("{e:#}");
            error!(%error, "failed to open configured workspace");
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
                // Can't reply without id.
                warn!(error = %e, "dropping malformed request");
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

    info!("stdin closed; prefsd exiting");
}
