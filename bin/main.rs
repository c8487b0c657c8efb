#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;

/// Send a mail campaign across a pool of SMTP submission endpoints
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version)]
struct Cli {
    /// Configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load configuration and verify endpoints without sending anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(cli.config)?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let courier: courier::controller::Courier = ron::from_str(&config_content)?;

    courier.run(cli.dry_run).await
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `COURIER_CONFIG` environment variable
/// 3. ./courier.config.ron (current working directory)
/// 4. /etc/courier/courier.config.ron (system-wide config)
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Ok(env_path) = std::env::var("COURIER_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "COURIER_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = vec![
        PathBuf::from("./courier.config.ron"),
        PathBuf::from("/etc/courier/courier.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - COURIER_CONFIG environment variable\n{paths_tried}"
    )
}
