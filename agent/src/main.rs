mod handler;
mod io;
mod protocol;

use fileward_core::EngineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Usage: fileward-agent --stdio");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --stdio     Run in stdio mode (NDJSON over stdin/stdout)");
    eprintln!("  --version   Print version and exit");
    eprintln!("  --help      Print this help message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  FILEWARD_IMPERSONATE          Run operations as the requesting user (default: true)");
    eprintln!("  FILEWARD_RUN_AS_TIMEOUT_SECS  Limit for an impersonated operation (default: 30)");
    eprintln!("  FILEWARD_MAX_DUPLICATES       Cap for the \"name (n)\" duplicate counter");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "--version" => {
            println!("fileward-agent {}", VERSION);
            Ok(())
        }
        "--help" => {
            print_usage();
            Ok(())
        }
        "--stdio" => {
            // Logs go to stderr; stdout carries the protocol.
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_writer(std::io::stderr)
                .init();

            let config = EngineConfig::from_env();
            info!(
                "fileward-agent {} starting in stdio mode (impersonate={}, run_as_timeout={}s)",
                VERSION,
                config.impersonate,
                config.run_as_timeout.as_secs()
            );
            io::stdio::run_stdio_loop(config).await
        }
        other => {
            eprintln!("Unknown option: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}
