//! Account listing: runs one aggregation cycle and shows per-account state.

use serde::Serialize;
use tabled::Tabled;

use nextlink_api::AuthScheme;
use nextlink_config::ConfigBroker;
use nextlink_core::{AccountDetails, AccountState, AggregateEvent, CredentialAggregator, QueryMode};

use crate::cli::{AccountsArgs, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, Tone};

// ── View ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AccountView {
    id: u32,
    name: String,
    provider: String,
    service: String,
    state: String,
    server: Option<String>,
    auth: Option<&'static str>,
    webdav_path: String,
}

impl AccountView {
    fn new(details: &AccountDetails, state: Option<&AccountState>) -> Self {
        Self {
            id: details.account_id,
            name: details.display_name.clone(),
            provider: details.provider_name.clone(),
            service: details.service_name.clone(),
            state: state_label(state),
            server: details.server_url.as_ref().map(ToString::to_string),
            auth: details.credentials.as_ref().map(|c| match c.scheme() {
                AuthScheme::Basic => "basic",
                AuthScheme::Bearer => "bearer",
            }),
            webdav_path: details.webdav_path.clone(),
        }
    }
}

fn state_label(state: Option<&AccountState>) -> String {
    match state {
        Some(AccountState::Waiting) => "waiting".into(),
        Some(AccountState::Populated) => "ready".into(),
        Some(AccountState::Error(reason)) => format!("error: {reason}"),
        Some(AccountState::Listed) | None => "listed".into(),
    }
}

// ── Table row ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct AccountRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Server")]
    server: String,
    #[tabled(rename = "Auth")]
    auth: String,
}

fn to_row(view: &AccountView, color: bool) -> AccountRow {
    let tone = match view.state.as_str() {
        "ready" => Tone::Good,
        "waiting" => Tone::Warn,
        "listed" => Tone::Muted,
        _ => Tone::Bad,
    };
    AccountRow {
        id: view.id,
        name: view.name.clone(),
        state: output::paint(&view.state, tone, color),
        server: view.server.clone().unwrap_or_else(|| "-".into()),
        auth: view.auth.unwrap_or("-").into(),
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    aggregator: &mut CredentialAggregator<ConfigBroker>,
    args: &AccountsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mode = if args.passive {
        QueryMode::Passive
    } else {
        QueryMode::SignIn
    };
    let event = aggregator.query_status(mode).await;

    let views: Vec<AccountView> = aggregator
        .accounts()
        .map(|details| AccountView::new(details, aggregator.state(details.account_id)))
        .collect();

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &views,
        |v| to_row(v, color),
        |v| v.id.to_string(),
    );
    output::print_output(&out, global.quiet);

    if let AggregateEvent::Error(message) = event {
        return Err(CliError::NoAccount { reason: message });
    }
    Ok(())
}
