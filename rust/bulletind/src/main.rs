mod calc;
mod config;
mod db;
mod ipc;
mod store;
mod telemetry;

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    let cfg = config::Config::parse();
    telemetry::init(&cfg.log_level)?;

    if cfg.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.workers)
            .build_global()?;
    }

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_deref() {
        // A bad startup workspace is reported but leaves the sidecar usable.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            error!(workspace = %path.display(), error = %e, "startup workspace could not be opened");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "bulletind ready");

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

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "unparseable request line");
                ipc::err("", "bad_json", e.to_string(), None)
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
