mod cli;
mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nextlink_config::ConfigBroker;
use nextlink_core::{CancellationToken, CredentialAggregator, QueryMode, Session};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose, cli.global.dump);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, dump: bool) {
    let filter = match (verbosity, dump) {
        (_, true) | (3.., _) => "trace",
        (0, false) => "warn",
        (1, false) => "info",
        (2, false) => "debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file named by `--config`, else the platform default.
pub(crate) fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(nextlink_config::config_path)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands only read the file
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "nextlink", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let path = config_file(&cli.global);
            let broker = ConfigBroker::load(&path)?;
            let config = broker.snapshot();

            let mut options = config.defaults.aggregator_options();
            if let Some(service) = &cli.global.service {
                options.service_name.clone_from(service);
            }
            let mut aggregator = CredentialAggregator::new(broker, options);

            let cmd = match cmd {
                Command::Accounts(args) => {
                    return commands::accounts::handle(&mut aggregator, &args, &cli.global).await;
                }
                other => other,
            };

            let event = aggregator.query_status(QueryMode::SignIn).await;
            let account = commands::select_account(
                &aggregator,
                &event,
                cli.global.account.or(config.default_account),
            )?;

            let mut session_options = config.defaults.session_options();
            session_options.dump_traffic = cli.global.dump;
            let session =
                Session::http(account, session_options, config.defaults.transport_config())?;

            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_interrupt(cancel.clone()));

            tracing::debug!(command = ?cmd, account = session.account_id(), "dispatching command");
            let dispatch = commands::dispatch(cmd, &session, &cancel, &cli.global);
            let result = until_cancelled(&cancel, dispatch).await;

            if let Err(CliError::AuthFailed { account_id }) = &result {
                aggregator.set_credentials_need_update(*account_id);
            }
            result
        }
    }
}

/// Run `command`, giving up with [`CliError::Aborted`] once `cancel` fires.
async fn until_cancelled(
    cancel: &CancellationToken,
    command: impl Future<Output = Result<(), CliError>>,
) -> Result<(), CliError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CliError::Aborted),
        result = command => result,
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("interrupt received, aborting");
        cancel.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn interrupt_aborts_a_pending_command() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let stuck = async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        };
        let result = until_cancelled(&cancel, stuck).await;
        assert!(matches!(result, Err(CliError::Aborted)));
    }

    #[tokio::test]
    async fn finished_command_keeps_its_result() {
        let cancel = CancellationToken::new();
        assert!(until_cancelled(&cancel, async { Ok(()) }).await.is_ok());

        let failed = async { Err(CliError::NoCredentials { account_id: 7 }) };
        let result = until_cancelled(&cancel, failed).await;
        assert!(matches!(result, Err(CliError::NoCredentials { account_id: 7 })));
    }
}
