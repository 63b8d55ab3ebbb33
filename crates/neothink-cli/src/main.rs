//! Command-line entry point for the Neothink server.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neothink_core::config::env_vars;
use neothink_core::{BaasMode, Config, RateLimitBackend};

/// Neothink multi-platform API server.
#[derive(Parser, Debug)]
#[command(name = "neothink")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Address to bind to. Overrides NEOTHINK_BIND and the config file.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Load and validate the configuration, then print a summary.
    CheckConfig,
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "neothink_api={lvl},neothink_baas={lvl},neothink_core={lvl},tower_http=info,warn",
            lvl = default_level
        ))
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Serve { bind } => {
            let mut config = Config::load().context("invalid configuration")?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            neothink_api::run(config).await
        }
        Command::CheckConfig => check_config(),
    }
}

fn check_config() -> Result<()> {
    let config = Config::load().context("invalid configuration")?;
    println!("bind:               {}", config.bind);
    println!(
        "baas:               {}",
        match config.baas.mode {
            BaasMode::Memory => "memory".to_string(),
            BaasMode::Rest => config.baas.default.url.clone(),
        }
    );
    for (platform, endpoint) in &config.baas.overrides {
        let key = if endpoint.service_role_key.is_some() {
            "own service key"
        } else {
            "shared service key"
        };
        println!("  {:<17} {} ({})", format!("{}:", platform), endpoint.url, key);
    }
    println!("rate limit backend: {:?}", config.security.rate_limit_backend);
    if config.security.rate_limit_backend == RateLimitBackend::Baas {
        println!(
            "  needs the increment_rate_limit procedure from \
             crates/neothink-baas/sql/increment_rate_limit.sql"
        );
    }
    for rule in &config.security.rate_limits {
        println!(
            "  {:<17} {} / {}s",
            rule.prefix.as_deref().unwrap_or("*"),
            rule.budget.max_requests,
            rule.budget.window_secs
        );
    }
    println!("csrf ttl:           {}s", config.security.csrf_ttl_secs);
    if config.security.trusted_proxies.is_empty() {
        println!("trusted proxies:    none (forwarding headers ignored)");
    } else {
        let proxies: Vec<String> = config
            .security
            .trusted_proxies
            .iter()
            .map(|ip| ip.to_string())
            .collect();
        println!("trusted proxies:    {}", proxies.join(", "));
    }
    if let Some(domain) = &config.cookie_domain {
        println!("cookie domain:      {}", domain);
    }
    if let Some(platform) = config.security.dev_fallback_platform {
        println!("dev fallback:       {}", platform);
    }
    println!("configuration OK");
    Ok(())
}
