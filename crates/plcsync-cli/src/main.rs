mod cli;
mod commands;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Command};
use crate::commands::Context;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Console logging on stderr, plus a daily-rolling file when `log_dir` is
/// set. The returned guard flushes the file writer on drop.
fn init_tracing(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "plcsync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // The daemon logs at info or above to its file even without -v.
    let file_filter = if verbosity == 0 {
        EnvFilter::new("info")
    } else {
        env_filter()
    };
    let _ = tracing_subscriber::registry()
        .with(console.with_filter(env_filter()))
        .with(file.map(|layer| layer.with_filter(file_filter)))
        .try_init();
    guard
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli { global, command } = cli;

    match command {
        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "plcsync", &mut std::io::stdout());
            Ok(())
        }

        // Config commands don't need resolved targets
        Command::Config(args) => {
            let _guard = init_tracing(global.verbose, None);
            commands::config_cmd::handle(&args, &global)
        }

        cmd => {
            let config = commands::util::load_config(&global)?;
            let log_dir = match &cmd {
                Command::Run(args) => args.log_dir.clone().or_else(|| config.log_dir.clone()),
                _ => None,
            };
            let _guard = init_tracing(global.verbose, log_dir.as_deref());

            tracing::debug!(command = ?cmd, "dispatching command");
            let ctx = Context { config, global };
            commands::dispatch(cmd, &ctx).await
        }
    }
}
