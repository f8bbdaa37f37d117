// ── Credential aggregation ──
//
// Collects credentials for every eligible account of one service and
// reduces the per-account outcomes to a single terminal event.
//
// Each `query_status` call is one cycle: the table is cleared, accounts are
// enumerated, sign-ins are issued concurrently, and a counted completion
// gate fires exactly one `AggregateEvent` when the last sign-in resolves.
// Resolutions carry the cycle's generation so a late reply from an earlier
// cycle can never touch the current table.

use std::collections::BTreeMap;

use futures_util::StreamExt as _;
use futures_util::stream::FuturesUnordered;
use nextlink_api::Credentials;
use secrecy::ExposeSecret;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use crate::broker::{AccountRecord, IdentityBroker, SignInReply};
use crate::config::AggregatorOptions;
use crate::error::CoreError;

/// Message carried by [`AggregateEvent::Error`].
pub const NO_CREDENTIALS_MESSAGE: &str = "Unable to retrieve account credentials";

const EVENT_CHANNEL_SIZE: usize = 16;

/// Whether a query signs in or only lists eligible accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[default]
    SignIn,
    Passive,
}

/// Per-account state within one query cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    /// Sign-in issued, no reply yet.
    Waiting,
    /// Sign-in succeeded; credentials are filled in.
    Populated,
    /// Sign-in failed or returned unusable credentials.
    Error(String),
    /// Recorded by a passive query; no sign-in was issued.
    Listed,
}

/// An eligible account and, once signed in, its connection details.
#[derive(Debug, Clone)]
pub struct AccountDetails {
    pub account_id: u32,
    pub provider_name: String,
    pub service_name: String,
    pub display_name: String,
    pub server_url: Option<Url>,
    pub credentials: Option<Credentials>,
    /// Absolute WebDAV root on the server, e.g. `/remote.php/dav/files/alice/`.
    pub webdav_path: String,
    pub ignore_ssl_errors: bool,
}

impl AccountDetails {
    fn from_record(record: &AccountRecord) -> Self {
        Self {
            account_id: record.id,
            provider_name: record.provider_name.clone(),
            service_name: record.service_name.clone(),
            display_name: record.display_name.clone(),
            server_url: None,
            credentials: None,
            webdav_path: String::new(),
            ignore_ssl_errors: false,
        }
    }

    /// Server URL and credentials are both known.
    pub fn is_resolved(&self) -> bool {
        self.server_url.is_some() && self.credentials.is_some()
    }
}

/// Terminal outcome of one query cycle.
#[derive(Debug, Clone)]
pub enum AggregateEvent {
    /// At least one account resolved, or there was nothing to resolve.
    Ready(Vec<AccountDetails>),
    /// Every sign-in failed.
    Error(String),
}

impl AggregateEvent {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

// ── State table ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Table {
    generation: u64,
    states: BTreeMap<u32, AccountState>,
    details: BTreeMap<u32, AccountDetails>,
    pending: usize,
    finished: bool,
}

impl Table {
    fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.states.clear();
        self.details.clear();
        self.pending = 0;
        self.finished = false;
    }

    fn record(&mut self, record: &AccountRecord, mode: QueryMode) {
        let state = match mode {
            QueryMode::SignIn => {
                self.pending += 1;
                AccountState::Waiting
            }
            QueryMode::Passive => AccountState::Listed,
        };
        self.states.insert(record.id, state);
        self.details.insert(record.id, AccountDetails::from_record(record));
    }

    fn waiting(&self) -> impl Iterator<Item = u32> + '_ {
        self.states
            .iter()
            .filter(|(_, state)| **state == AccountState::Waiting)
            .map(|(id, _)| *id)
    }

    /// Apply one sign-in outcome; returns the terminal event if this was the last.
    fn resolve(
        &mut self,
        generation: u64,
        account_id: u32,
        result: Result<SignInReply, CoreError>,
        options: &AggregatorOptions,
    ) -> Option<AggregateEvent> {
        if generation != self.generation {
            debug!(account_id, generation, "ignoring sign-in reply from a previous query");
            return None;
        }
        let Some(state) = self.states.get_mut(&account_id) else {
            debug!(account_id, "ignoring sign-in reply for unknown account");
            return None;
        };
        if *state != AccountState::Waiting {
            debug!(account_id, ?state, "ignoring duplicate sign-in reply");
            return None;
        }

        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|reply| normalize(reply, options));
        match (outcome, self.details.get_mut(&account_id)) {
            (Ok(resolved), Some(details)) => {
                details.server_url = Some(resolved.server_url);
                details.credentials = Some(resolved.credentials);
                details.webdav_path = resolved.webdav_path;
                details.ignore_ssl_errors = resolved.ignore_ssl_errors;
                *state = AccountState::Populated;
                debug!(account_id, "account credentials populated");
            }
            (Ok(_), None) => {
                *state = AccountState::Error("account details missing".into());
            }
            (Err(message), _) => {
                warn!(account_id, error = %message, "account sign-in failed");
                *state = AccountState::Error(message);
            }
        }

        self.pending = self.pending.saturating_sub(1);
        self.finish()
    }

    /// The terminal event, exactly once per cycle, once nothing is pending.
    fn finish(&mut self) -> Option<AggregateEvent> {
        if self.finished || self.pending > 0 {
            return None;
        }
        self.finished = true;
        Some(self.aggregate())
    }

    fn aggregate(&self) -> AggregateEvent {
        let ready: Vec<AccountDetails> = self
            .states
            .iter()
            .filter(|(_, state)| matches!(state, AccountState::Populated | AccountState::Listed))
            .filter_map(|(id, _)| self.details.get(id).cloned())
            .collect();

        if ready.is_empty() && !self.states.is_empty() {
            AggregateEvent::Error(NO_CREDENTIALS_MESSAGE.into())
        } else {
            AggregateEvent::Ready(ready)
        }
    }
}

struct Resolved {
    server_url: Url,
    credentials: Credentials,
    webdav_path: String,
    ignore_ssl_errors: bool,
}

/// Validate a sign-in reply. A token wins over a password.
fn normalize(reply: SignInReply, options: &AggregatorOptions) -> Result<Resolved, String> {
    let server_url = reply.server_url.trim();
    if server_url.is_empty() {
        return Err("sign-in returned no server URL".into());
    }
    let server_url = Url::parse(server_url).map_err(|e| format!("invalid server URL: {e}"))?;

    let token = reply
        .access_token
        .as_ref()
        .map(|t| t.expose_secret().to_owned())
        .filter(|t| !t.is_empty());
    let credentials = match (token, reply.password) {
        (Some(token), _) => Credentials::bearer(token),
        (None, Some(password)) if !reply.username.is_empty() => {
            Credentials::basic(reply.username.clone(), password.expose_secret())
        }
        _ => return Err("sign-in returned no usable credentials".into()),
    };

    // Broker paths are complete; the template is relative to the install root.
    let webdav_path = if reply.webdav_path.trim().is_empty() {
        let template = absolute(options.webdav_path_for(&reply.username));
        format!("{}{template}", server_url.path().trim_end_matches('/'))
    } else {
        absolute(reply.webdav_path.trim().to_owned())
    };

    Ok(Resolved {
        server_url,
        credentials,
        webdav_path,
        ignore_ssl_errors: reply.ignore_ssl_errors,
    })
}

fn absolute(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

// ── Aggregator ───────────────────────────────────────────────────────

/// Resolves credentials for every eligible account of one service.
///
/// `query_status` takes `&mut self`, so cycles on one instance cannot
/// interleave; each call fully replaces the previous cycle's table.
pub struct CredentialAggregator<B> {
    broker: B,
    options: AggregatorOptions,
    table: Table,
    events: broadcast::Sender<AggregateEvent>,
}

impl<B: IdentityBroker> CredentialAggregator<B> {
    pub fn new(broker: B, options: AggregatorOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            broker,
            options,
            table: Table::default(),
            events,
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// Receive every terminal event, one per completed cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<AggregateEvent> {
        self.events.subscribe()
    }

    pub fn state(&self, account_id: u32) -> Option<&AccountState> {
        self.table.states.get(&account_id)
    }

    pub fn details(&self, account_id: u32) -> Option<&AccountDetails> {
        self.table.details.get(&account_id)
    }

    /// Every account recorded in the current cycle, by id.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountDetails> {
        self.table.details.values()
    }

    /// Run one query cycle and return its terminal event.
    pub async fn query_status(&mut self, mode: QueryMode) -> AggregateEvent {
        self.table.reset();
        let service = self.options.service_name.as_str();

        let records = self.broker.enumerate_accounts(service);
        let total = records.len();
        for record in records.iter().filter(|r| r.is_eligible()) {
            self.table.record(record, mode);
        }
        debug!(
            service,
            ?mode,
            total,
            eligible = self.table.states.len(),
            "accounts enumerated"
        );

        if let Some(event) = self.table.finish() {
            return self.emit(event);
        }

        let generation = self.table.generation;
        let broker = &self.broker;
        let mut in_flight: FuturesUnordered<_> = self
            .table
            .waiting()
            .map(move |account_id| async move {
                (generation, account_id, broker.sign_in(account_id, service).await)
            })
            .collect();

        let mut outcome = None;
        while let Some((generation, account_id, result)) = in_flight.next().await {
            if let Some(event) = self
                .table
                .resolve(generation, account_id, result, &self.options)
            {
                outcome = Some(event);
            }
        }
        drop(in_flight);

        let event = outcome.unwrap_or_else(|| self.table.aggregate());
        self.emit(event)
    }

    /// Flag an account so later queries skip it until it is re-authorized.
    pub fn set_credentials_need_update(&self, account_id: u32) -> bool {
        let updated = self
            .broker
            .set_credentials_need_update(account_id, &self.options.service_name);
        if updated {
            let service = &self.options.service_name;
            info!(account_id, %service, "credentials flagged for update");
        } else {
            warn!(account_id, "could not flag account credentials");
        }
        updated
    }

    fn emit(&self, event: AggregateEvent) -> AggregateEvent {
        match &event {
            AggregateEvent::Ready(accounts) => info!(accounts = accounts.len(), "service ready"),
            AggregateEvent::Error(message) => warn!(%message, "service error"),
        }
        let _ = self.events.send(event.clone());
        event
    }
}
