//! OCS commands: capabilities, notifications, users.

use serde_json::Value;
use tabled::Tabled;

use nextlink_api::HttpTransport;
use nextlink_core::{Notification, Session, User};

use crate::cli::{CapabilitiesArgs, GlobalOpts, WhoamiArgs};
use crate::error::CliError;
use crate::output;

// ── Capabilities ─────────────────────────────────────────────────────

pub async fn capabilities(
    session: &Session<HttpTransport>,
    args: &CapabilitiesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let caps = session
        .capability(&args.name)
        .await
        .map_err(|e| CliError::from_core(e, session.account_id(), &args.name))?;

    if caps.is_empty() {
        tracing::info!(name = %args.name, "capability not published");
    }

    let out = output::render_single(
        &global.output,
        &caps,
        |map| {
            let pairs: Vec<(&str, String)> = map
                .iter()
                .map(|(k, v)| (k.as_str(), compact(v)))
                .collect();
            output::detail_lines(&pairs)
        },
        |map| map.keys().cloned().collect::<Vec<_>>().join("\n"),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Subject")]
    subject: String,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.notification_id.clone(),
            app: n.app.clone(),
            date: n
                .date_time
                .map_or_else(|| "-".into(), |at| at.format("%Y-%m-%d %H:%M").to_string()),
            subject: n.subject.clone(),
        }
    }
}

pub async fn notifications(
    session: &Session<HttpTransport>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let list = session
        .notifications()
        .await
        .map_err(|e| CliError::from_core(e, session.account_id(), "notifications"))?;

    let out = output::render_list(
        &global.output,
        &list,
        |n| NotificationRow::from(n),
        |n| n.notification_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Users ────────────────────────────────────────────────────────────

pub async fn whoami(
    session: &Session<HttpTransport>,
    args: &WhoamiArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let user: User = match &args.user {
        Some(id) => session.user(id).await,
        None => session.current_user().await,
    }
    .map_err(|e| {
        let subject = args.user.as_deref().unwrap_or("user");
        CliError::from_core(e, session.account_id(), subject)
    })?;

    let out = output::render_single(
        &global.output,
        &user,
        |u| {
            output::detail_lines(&[
                ("User", u.user_id.clone()),
                ("Display name", u.display_name.clone()),
            ])
        },
        |u| u.user_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
