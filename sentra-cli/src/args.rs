//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sentra")]
#[command(author, version, about = "Intent-driven security tool synthesis and entity graph")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Synthesize and execute a classified intent
    Run {
        /// Intent type (port_scan, host_discovery, dns_lookup, ...)
        #[arg(long)]
        intent: Option<String>,

        /// Target IP, network, domain, or URL
        #[arg(long)]
        target: Option<String>,

        /// Extra parameters as key=value (can be repeated)
        #[arg(long, value_name = "KEY=VALUE")]
        param: Vec<String>,

        /// Read the full intent structure from a JSON file instead
        #[arg(long, conflicts_with_all = ["intent", "target", "param"])]
        intent_file: Option<PathBuf>,

        /// Optional stage identifier recorded with the run
        #[arg(long)]
        stage: Option<i64>,

        /// Disable the policy gate for this invocation
        #[arg(long)]
        no_policy: bool,

        /// Print the synthesized command without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored entities
    Entities {
        /// Filter by entity type (host, port, service, ...)
        #[arg(long, value_name = "TYPE")]
        entity_type: Option<String>,
    },

    /// Show execution history
    History {
        /// Filter by tool id
        #[arg(long)]
        tool: Option<String>,
    },

    /// Store statistics
    Stats,

    /// Delete entities older than the configured TTL
    Prune {
        /// Override the TTL in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Snapshot the database to a file
    Checkpoint { path: PathBuf },

    /// Replace the database with a snapshot
    Restore { path: PathBuf },
}

/// Split repeated key=value parameters into a map
pub fn parse_params(params: &[String]) -> anyhow::Result<std::collections::HashMap<String, String>> {
    let mut map = std::collections::HashMap::new();
    for raw in params {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("parameter must be KEY=VALUE, got: {}", raw))?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}
