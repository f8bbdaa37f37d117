//! Command dispatch: bridges CLI args -> session calls -> output formatting.

pub mod accounts;
pub mod config_cmd;
pub mod files;
pub mod ocs;

use nextlink_api::HttpTransport;
use nextlink_config::ConfigBroker;
use nextlink_core::{
    AccountDetails, AccountState, AggregateEvent, CancellationToken, CredentialAggregator,
    Session,
};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    session: &Session<HttpTransport>,
    cancel: &CancellationToken,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Ls(args) => files::list(session, &args, global).await,
        Command::Mkdir(args) => files::mkdir(session, &args, global).await,
        Command::Put(args) => files::put(session, &args, cancel, global).await,
        Command::Get(args) => files::get(session, &args, cancel, global).await,
        Command::Capabilities(args) => ocs::capabilities(session, &args, global).await,
        Command::Notifications => ocs::notifications(session, global).await,
        Command::Whoami(args) => ocs::whoami(session, &args, global).await,
        // Accounts, Config and Completions are handled before dispatch
        Command::Accounts(_) | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command does not use a session".into()))
        }
    }
}

/// Pick the account a command runs against.
///
/// An explicit id must name a signed-in account; otherwise the first
/// signed-in account is used.
pub fn select_account<'a>(
    aggregator: &'a CredentialAggregator<ConfigBroker>,
    event: &AggregateEvent,
    requested: Option<u32>,
) -> Result<&'a AccountDetails, CliError> {
    if let Some(id) = requested {
        let Some(details) = aggregator.details(id) else {
            // Configured but ineligible: disabled or flagged for new credentials.
            if aggregator.broker().snapshot().account(id).is_some() {
                return Err(CliError::NoCredentials { account_id: id });
            }
            return Err(CliError::UnknownAccount {
                id,
                available: available_ids(aggregator),
            });
        };
        if details.is_resolved() {
            return Ok(details);
        }
        if let Some(AccountState::Error(reason)) = aggregator.state(id) {
            tracing::debug!(account_id = id, %reason, "selected account did not sign in");
        }
        return Err(CliError::NoCredentials { account_id: id });
    }

    aggregator
        .accounts()
        .find(|details| details.is_resolved())
        .ok_or_else(|| CliError::NoAccount {
            reason: match event {
                AggregateEvent::Error(message) => message.clone(),
                AggregateEvent::Ready(_) => format!(
                    "No enabled account offers the \"{}\" service.",
                    aggregator.options().service_name
                ),
            },
        })
}

fn available_ids(aggregator: &CredentialAggregator<ConfigBroker>) -> String {
    let ids: Vec<String> = aggregator
        .accounts()
        .map(|details| details.account_id.to_string())
        .collect();
    if ids.is_empty() {
        "(none)".into()
    } else {
        ids.join(", ")
    }
}
