use std::{sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use switchyard::{
    adapters::{HttpClientAdapter, HttpHandler, ProxyServer},
    config::{ProxyConfig, load_config},
    core::RouteTable,
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Optional configuration file (TOML, YAML or JSON). Environment variables
    /// override its values.
    #[clap(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Start the proxy (default)
    Serve,
    /// Load and validate the configuration, then exit
    Validate,
    /// Print the resolved route table, then exit
    Routes,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let config =
        load_config(args.config.as_deref()).context("Failed to load proxy configuration")?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Validate => validate_config_command(&config),
        Commands::Routes => routes_command(&config),
    }
}

async fn serve(config: ProxyConfig) -> Result<()> {
    tracing_setup::init_tracing(&config.logging)?;

    // Fail before binding: nothing is served from a partially valid table.
    let route_table = match RouteTable::build(&config) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            for issue in e.issues() {
                tracing::error!(error = %issue, "Configuration error");
            }
            return Err(e).context("Invalid proxy configuration");
        }
    };

    let http_client = Arc::new(
        HttpClientAdapter::new(&config.upstream, route_table.targets())
            .context("Failed to create upstream HTTP client")?,
    );
    let handler = HttpHandler::new(route_table, http_client, config.service_name.clone());

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let graceful_shutdown = Arc::new(GracefulShutdown::with_grace_period(Duration::from_secs(
        config.shutdown_grace_secs,
    )));
    let signal_handler = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler.run_signal_handler().await {
            tracing::error!("Signal handler failed: {:?}", e);
        }
    });

    tracing::info!(
        service = %config.service_name,
        listen_addr = %addr,
        "Starting proxy"
    );

    let shutdown_token = graceful_shutdown.shutdown_token();
    ProxyServer::new(handler, graceful_shutdown.grace_period())
        .run(listener, async move {
            let reason = shutdown_token.wait_for_shutdown().await;
            tracing::info!("Shutting down: {:?}", reason);
        })
        .await?;

    tracing::info!("Proxy stopped");
    Ok(())
}

/// Validate configuration and exit
fn validate_config_command(config: &ProxyConfig) -> Result<()> {
    match RouteTable::build(config) {
        Ok(table) => {
            println!("Configuration is valid");
            println!("  listen address: {}", config.listen_addr());
            println!("  routes:         {}", table.bindings().len());
            println!(
                "  fallback:       {}",
                table
                    .fallback()
                    .map_or_else(|| "none".to_string(), |b| b.target().to_string())
            );
            println!(
                "  timeouts:       connect {}s, request {}s",
                config.upstream.connect_timeout_secs, config.upstream.request_timeout_secs
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:");
            for issue in e.issues() {
                eprintln!("  - {issue}");
            }
            Err(e).context("Invalid proxy configuration")
        }
    }
}

fn routes_command(config: &ProxyConfig) -> Result<()> {
    let table = RouteTable::build(config).context("Invalid proxy configuration")?;
    for binding in table.bindings() {
        println!(
            "{:<24} -> {} ({})",
            binding.prefix(),
            binding.target(),
            binding.target_name()
        );
    }
    if let Some(fallback) = table.fallback() {
        println!(
            "{:<24} -> {} ({})",
            "<fallback>",
            fallback.target(),
            fallback.target_name()
        );
    }
    Ok(())
}
