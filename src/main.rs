//! TCP Messaging Tester - Main CLI Application
//!
//! Runs a message server or one of the client driver scenarios against it.

use clap::Parser;
use std::{error::Error, process};
use tcp_messaging_tester::{
    app::{run_env_command, App},
    cli::{Cli, Command},
    error::{AppError, ErrorReporter, Result},
    PKG_DESCRIPTION, PKG_NAME, VERSION,
};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Please report this issue together with the command line that triggered it.");
        process::exit(1);
    }));

    let cli = Cli::parse();
    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose);

    if let Err(e) = run_application(cli).await {
        eprintln!("Error: {}", e);

        if let Some(source) = e.source() {
            eprintln!("Caused by: {}", source);
        }
        if reporter.verbose {
            reporter.report_error(&e);
        }

        print_error_suggestions(&e);

        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<()> {
    cli.validate().map_err(AppError::validation)?;

    if cli.debug {
        println!("{} v{}: {}", PKG_NAME, VERSION, PKG_DESCRIPTION);
        println!(
            "Built {} for {} ({})",
            env!("BUILD_TIME"),
            env!("TARGET_TRIPLE"),
            option_env!("GIT_COMMIT").unwrap_or("unknown commit")
        );
        println!("Debug mode enabled");
        println!();
    }

    if let Command::Env(args) = &cli.command {
        return run_env_command(args);
    }

    App::new(cli)?.run().await
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Validation(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file and TMT_* environment variables");
            eprintln!("  - Endpoints are host:port, e.g. 127.0.0.1:9000");
            eprintln!("  - Stream content length must not exceed the source size");
        }
        AppError::Network(_) | AppError::Disconnected(_) => {
            eprintln!();
            eprintln!("Network troubleshooting:");
            eprintln!("  - Start a server first with 'tmt server' when using --remote");
            eprintln!("  - Check that the port is reachable and not firewalled");
            eprintln!("  - Raise the file descriptor limit for many clients (ulimit -n)");
        }
        AppError::Auth(_) => {
            eprintln!();
            eprintln!("Authentication help:");
            eprintln!("  - Pass the same --psk value to the server and the client");
        }
        AppError::Timeout(_) => {
            eprintln!();
            eprintln!("Timeout help:");
            eprintln!("  - Increase the timeout with --timeout");
            eprintln!("  - In sync mode the server must reply to every request");
        }
        AppError::Protocol(_) => {
            eprintln!();
            eprintln!("Protocol help:");
            eprintln!("  - The peer must speak the same framing; check the endpoint is a tmt server");
        }
        AppError::TestExecution(_) => {
            eprintln!();
            eprintln!("Execution troubleshooting:");
            eprintln!("  - Rerun with --verbose to see per-operation results");
            eprintln!("  - Reduce --count or --clients");
            eprintln!("  - Check system resources");
        }
        _ => {}
    }
}
