use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Overrides;

#[derive(Parser)]
#[command(name = "cpa-monitor")]
#[command(about = "Query CLIProxyAPI usage statistics and OAuth quota")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// CLIProxyAPI base URL, e.g. http://127.0.0.1:8317
    #[arg(long = "url", env = "CPA_URL", global = true)]
    pub base_url: Option<String>,

    /// Management API secret
    #[arg(long = "secret", env = "CPA_SECRET", global = true, hide_env_values = true)]
    pub admin_secret: Option<String>,

    /// Verify the gateway's TLS certificate. Off by default so self-signed
    /// gateways work; the admin secret is then sent without certificate checks
    #[arg(long, env = "CPA_VERIFY_TLS", global = true, value_name = "BOOL")]
    pub verify_tls: Option<bool>,

    /// Path to config.json
    #[arg(long, env = "CPA_MONITOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            admin_secret: self.admin_secret.clone(),
            verify_tls: self.verify_tls,
            config_path: self.config.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Overall counters, per-API and per-model totals, credential availability (default)
    Overview {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Skip fetching credential quota for the availability section
        #[arg(long)]
        no_credentials: bool,
    },

    /// Today's requests by model, credential and time of day
    Today {
        #[arg(long)]
        json: bool,
    },

    /// Remaining OAuth quota per credential and model group
    Quota {
        #[arg(long)]
        json: bool,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Overview {
            json: false,
            no_credentials: false,
        }
    }
}
