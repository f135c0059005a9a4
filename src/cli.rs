//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, health), and their associated argument structs.
//! Every flag has an environment variable equivalent for container
//! deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_PORT;

#[derive(Parser)]
#[command(
    name = "reddit-forward-proxy",
    version,
    about = "Role-gated HTTP forwarding proxy",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        reddit-forward-proxy run --domain acme.zitadel.cloud --key key.json\n  \
        reddit-forward-proxy health http://localhost:8089"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        reddit-forward-proxy run --domain acme.zitadel.cloud --key key.json\n  \
        reddit-forward-proxy run --domain acme.zitadel.cloud --key key.json -p 9000 --pretty\n  \
        reddit-forward-proxy run --domain http://127.0.0.1:8080 --key key.json   Local identity provider")]
pub struct RunArgs {
    /// Identity provider instance domain (<instance>.zitadel.cloud or your own domain)
    #[arg(long, env = "IDP_DOMAIN")]
    pub domain: String,

    /// Path to the service key JSON (clientId / clientSecret)
    #[arg(short, long, env = "KEY_FILE")]
    pub key: PathBuf,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Outbound fetch timeout in milliseconds (unset: wait indefinitely)
    #[arg(
        long = "upstream-timeout-ms",
        env = "UPSTREAM_TIMEOUT_MS",
        help_heading = "Tuning"
    )]
    pub upstream_timeout: Option<u64>,

    /// Authorization verifier timeout in milliseconds (unset: wait indefinitely)
    #[arg(
        long = "verifier-timeout-ms",
        env = "VERIFIER_TIMEOUT_MS",
        help_heading = "Tuning"
    )]
    pub verifier_timeout: Option<u64>,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:8089")]
    pub url: String,

    /// Print the raw response body
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}
