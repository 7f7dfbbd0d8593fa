mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_json);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let global = &cli.global;

    match cli.command {
        // Config commands don't need a device
        Command::Config(ref args) => commands::config_cmd::handle(args, global),

        Command::Completions(ref args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "telesync", &mut std::io::stdout());
            Ok(())
        }

        ref cmd => {
            let cfg = config::load(global)?;
            let controller_config = config::build_controller_config(global, &cfg)?;
            tracing::debug!(
                command = ?cmd,
                status_url = %controller_config.status_url,
                push = controller_config.stream_url.is_some(),
                "dispatching command"
            );

            match cmd {
                Command::Watch(args) => {
                    commands::watch::handle(args, controller_config, global).await
                }
                Command::Fetch => commands::fetch::handle(&controller_config, global).await,
                Command::Alerts(args) => {
                    commands::alerts::handle(args, &controller_config, global).await
                }
                Command::Config(_) | Command::Completions(_) => Ok(()),
            }
        }
    }
}
