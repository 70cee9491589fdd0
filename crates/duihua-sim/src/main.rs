//! duihua-sim: drives a scripted two-user chat session against the
//! in-memory store and prints what each side observed.

mod script;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use duihua_config::DuihuaConfig;
use tracing_subscriber::EnvFilter;

use crate::script::Script;

#[derive(Parser)]
#[command(name = "duihua-sim", about = "Scripted session against the duihua chat core")]
struct Args {
    /// Config file. Defaults to the platform config path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `duihua_chat=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Number of messages exchanged.
    #[arg(short, long, default_value_t = 4)]
    messages: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => duihua_config::load_config_from(path),
        None => duihua_config::load_config(),
    };

    let filter = match (&args.log_level, &loaded) {
        (Some(directive), _) => EnvFilter::new(directive),
        (None, Ok(config)) => EnvFilter::new(format!(
            "duihua={}",
            config.logging.level.as_directive()
        )),
        (None, Err(_)) => EnvFilter::new("duihua=info"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Config unavailable, using defaults");
        DuihuaConfig::default()
    });

    let script = Script {
        messages: args.messages,
    };
    match script.run(settings::client_config(&config)).await {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Session failed");
            ExitCode::FAILURE
        }
    }
}
