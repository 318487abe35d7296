//! SQLite Tools MCP Server - Main entry point.
//!
//! Serves one SQLite database file as MCP tools over stdio or streamable HTTP.

use clap::Parser;
use sqlite_tools_mcp::AggregateService;
use sqlite_tools_mcp::config::{Config, TransportMode};
use sqlite_tools_mcp::transport::{HttpTransport, StdioTransport, Transport};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Output goes to stderr so stdio stays clean.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    if let Err(msg) = config.validate() {
        eprintln!("Error: {}", msg);
        eprintln!();
        eprintln!("Usage: sqlite-tools-mcp --db-path <file> [--transport stdio|http]");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  sqlite-tools-mcp --db-path data/app.db");
        eprintln!("  SQLITE_DB=shop.db sqlite-tools-mcp --transport http --http-port 8080");
        std::process::exit(1);
    }

    info!(
        transport = %config.transport,
        db_path = %config.db_path.display(),
        "Starting SQLite Tools MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    // No connection is opened here; each tool call opens its own.
    let service = AggregateService::from_config(&config);

    let result = match config.transport {
        TransportMode::Stdio => StdioTransport::new(service).run().await,
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                service,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
