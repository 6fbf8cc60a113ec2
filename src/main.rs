//! TCP Chat Server - Entry Point
//!
//! Parses the command line, starts the server, the dashboard and the admin
//! console, and runs the shutdown sequence on Ctrl+C or `/quit`.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tcp_chat::config::DEFAULT_PORT;
use tcp_chat::{
    run_admin_console, run_dashboard, spawn_stdin_reader, AdminExit, ConsoleDashboard,
    ServerConfig, ServerHandle,
};

#[derive(Debug, Parser)]
#[command(name = "tcp_chat", about = "Single-room line-based TCP chat server")]
struct Cli {
    /// Port to listen on, `8989` or `:8989`
    #[arg(value_parser = ServerConfig::parse_port)]
    port: Option<u16>,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory for the message log file
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Don't write a message log
    #[arg(long)]
    no_log: bool,

    /// Don't print the dashboard panels
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=tcp_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tcp_chat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig {
        host: cli.host,
        port: cli.port.unwrap_or(DEFAULT_PORT),
        log_dir: cli.log_dir,
        log_enabled: !cli.no_log,
        ..ServerConfig::default()
    };

    // Bind failure is the one fatal error
    let mut handle = ServerHandle::bind(config).await?;
    let server = handle.server();

    if let Some(notifications) = handle.take_notifications() {
        if !cli.headless {
            tokio::spawn(run_dashboard(server.clone(), notifications, ConsoleDashboard));
        }
    }

    // The stdin thread is detached, so a pending read never delays exit
    let mut admin = tokio::spawn(run_admin_console(server.clone(), spawn_stdin_reader()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Ctrl+C received"),
        Ok(AdminExit::Quit) = &mut admin => {}
    }
    admin.abort();

    handle.shutdown().await?;
    println!("Server: server shut down");
    Ok(())
}
