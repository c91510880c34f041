use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "bulletind",
    about = "Report-card engine sidecar speaking newline-delimited JSON on stdin/stdout",
    version
)]
pub struct Config {
    /// Workspace directory to open at startup (same as a `workspace.select` request)
    #[arg(long, env = "BULLETIND_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "BULLETIND_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Size of the batch worker pool; 0 keeps the rayon default
    #[arg(long, env = "BULLETIND_WORKERS", default_value_t = 0)]
    pub workers: usize,
}
