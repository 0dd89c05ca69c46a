use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the ssr-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "ssr-cache",
    version,
    about = "Response cache for server-rendered pages"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SSR_CACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the demo site through the response cache.
    Serve(Box<ServeArgs>),
    /// Print the resolved settings and exit.
    #[command(name = "check-config")]
    CheckConfig,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Select the store backend (memory|redis).
    #[arg(long = "store-backend", value_name = "BACKEND")]
    pub store_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", env = "REDIS_URL", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Toggle the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the crawler entry lifetime in milliseconds.
    #[arg(long = "cache-bot-ttl-ms", value_name = "MILLISECONDS")]
    pub cache_bot_ttl_ms: Option<u64>,

    /// Override the browser entry lifetime in milliseconds.
    #[arg(long = "cache-human-ttl-ms", value_name = "MILLISECONDS")]
    pub cache_human_ttl_ms: Option<u64>,

    /// Toggle entity tags and conditional responses.
    #[arg(
        long = "cache-etag",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_etag: Option<bool>,
}
