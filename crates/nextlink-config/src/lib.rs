//! Shared configuration for nextlink.
//!
//! TOML account list, credential resolution (env + keyring + plaintext),
//! translation to `nextlink_core` options, and [`ConfigBroker`], the
//! file-backed `IdentityBroker`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use nextlink_api::{ListingProps, TransportConfig};
use nextlink_core::config::{DEFAULT_SERVICE, DEFAULT_STALL_TIMEOUT, DEFAULT_WEBDAV_PATH};
use nextlink_core::{
    AccountRecord, AggregatorOptions, CoreError, IdentityBroker, SessionOptions, SignInReply,
};

/// Keyring service name; entries are `{account id}/password` and `{account id}/token`.
pub const KEYRING_SERVICE: &str = "nextlink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no account with id {id}")]
    UnknownAccount { id: u32 },

    #[error("no credentials configured for account {id}")]
    NoCredentials { id: u32 },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Account used when `--account` is not given.
    pub default_account: Option<u32>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Configured accounts, as `[[accounts]]` tables.
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

impl Config {
    pub fn account(&self, id: u32) -> Option<&AccountEntry> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn account_mut(&mut self, id: u32) -> Option<&mut AccountEntry> {
        self.accounts.iter_mut().find(|a| a.id == id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Accept invalid TLS certificates unless an account overrides it.
    #[serde(default)]
    pub insecure: bool,

    /// Request timeout for non-transfer calls, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds without progress before a transfer fails.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout: u64,

    /// Service requested from accounts.
    #[serde(default = "default_service")]
    pub service: String,

    /// WebDAV root for accounts without one; `{user}` expands to the username.
    #[serde(default = "default_webdav_path")]
    pub webdav_path: String,

    /// Request every known property in directory listings.
    #[serde(default = "default_detailed_listing")]
    pub detailed_listing: bool,

    /// Consult the system keyring when resolving secrets.
    #[serde(default = "default_true")]
    pub keyring: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            stall_timeout: default_stall_timeout(),
            service: default_service(),
            webdav_path: default_webdav_path(),
            detailed_listing: default_detailed_listing(),
            keyring: true,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_stall_timeout() -> u64 {
    DEFAULT_STALL_TIMEOUT.as_secs()
}
fn default_service() -> String {
    DEFAULT_SERVICE.into()
}
fn default_webdav_path() -> String {
    DEFAULT_WEBDAV_PATH.into()
}
fn default_detailed_listing() -> bool {
    true
}
fn default_true() -> bool {
    true
}
fn default_provider() -> String {
    "nextcloud".into()
}

/// One configured account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountEntry {
    pub id: u32,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub display_name: String,

    /// Server base URL (e.g., "https://cloud.example.com").
    pub server_url: String,

    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// OAuth2 access token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub credentials_need_update: bool,

    /// Override `defaults.insecure`.
    pub ignore_ssl_errors: Option<bool>,

    /// Override the WebDAV root.
    pub webdav_path: Option<String>,

    /// Per-service settings. A service is offered unless disabled here.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,
}

impl AccountEntry {
    /// Label for listings: the display name, else `user@host`.
    pub fn label(&self) -> String {
        if !self.display_name.is_empty() {
            return self.display_name.clone();
        }
        let host = url::Url::parse(&self.server_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_else(|| self.server_url.clone());
        match &self.username {
            Some(user) => format!("{user}@{host}"),
            None => host,
        }
    }

    fn offers(&self, service: &str) -> bool {
        self.services.get(service).is_none_or(|s| s.enabled)
    }

    fn service_needs_update(&self, service: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(|s| s.credentials_need_update)
    }

    fn record(&self, service: &str) -> AccountRecord {
        AccountRecord {
            id: self.id,
            provider_name: self.provider.clone(),
            service_name: service.to_owned(),
            display_name: self.label(),
            enabled: self.enabled,
            service_valid: self.offers(service),
            credentials_need_update: self.credentials_need_update,
            service_credentials_need_update: self.service_needs_update(service),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub credentials_need_update: bool,
}

impl Default for ServiceEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            credentials_need_update: false,
        }
    }
}

// ── Option translation ──────────────────────────────────────────────

impl Defaults {
    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            service_name: self.service.clone(),
            default_webdav_path: self.webdav_path.clone(),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            stall_timeout: Duration::from_secs(self.stall_timeout),
            dump_traffic: false,
            listing_props: if self.detailed_listing {
                ListingProps::Detailed
            } else {
                ListingProps::PropNames
            },
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.timeout),
            ..TransportConfig::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "nextlink", "nextlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("nextlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from `path` + `NEXTLINK_` environment overrides.
///
/// Nested keys use a double underscore: `NEXTLINK_DEFAULTS__TIMEOUT=60`.
/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NEXTLINK_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), accounts = config.accounts.len(), "config loaded");
    Ok(config)
}

/// Load config from the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

// ── Credential resolution ───────────────────────────────────────────

/// Which secret of an account to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    Token,
}

impl SecretKind {
    fn keyring_user(self, id: u32) -> String {
        match self {
            Self::Password => format!("{id}/password"),
            Self::Token => format!("{id}/token"),
        }
    }
}

/// Resolve a secret: env var named by the account → keyring → plaintext.
pub fn resolve_secret(
    entry: &AccountEntry,
    kind: SecretKind,
    use_keyring: bool,
) -> Option<SecretString> {
    let (env_name, plaintext) = match kind {
        SecretKind::Password => (&entry.password_env, &entry.password),
        SecretKind::Token => (&entry.token_env, &entry.token),
    };

    // 1. Account's *_env → env var lookup
    if let Some(env_name) = env_name {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if use_keyring {
        let user = kind.keyring_user(entry.id);
        if let Ok(keyring_entry) = keyring::Entry::new(KEYRING_SERVICE, &user) {
            if let Ok(secret) = keyring_entry.get_password() {
                return Some(SecretString::from(secret));
            }
        }
    }

    // 3. Plaintext in config
    plaintext.clone().map(SecretString::from)
}

/// Store a secret for `id` in the system keyring.
pub fn store_secret(id: u32, kind: SecretKind, secret: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &kind.keyring_user(id))?.set_password(secret)?;
    Ok(())
}

/// Build the sign-in reply for an account: token if any, else username + password.
pub fn resolve_sign_in(
    entry: &AccountEntry,
    defaults: &Defaults,
    use_keyring: bool,
) -> Result<SignInReply, ConfigError> {
    let access_token = resolve_secret(entry, SecretKind::Token, use_keyring);
    let password = match (&access_token, &entry.username) {
        (None, Some(_)) => resolve_secret(entry, SecretKind::Password, use_keyring),
        _ => None,
    };
    if access_token.is_none() && password.is_none() {
        return Err(ConfigError::NoCredentials { id: entry.id });
    }

    Ok(SignInReply {
        username: entry.username.clone().unwrap_or_default(),
        password,
        access_token,
        server_url: entry.server_url.clone(),
        webdav_path: entry.webdav_path.clone().unwrap_or_default(),
        ignore_ssl_errors: entry.ignore_ssl_errors.unwrap_or(defaults.insecure),
    })
}

// ── Identity broker ─────────────────────────────────────────────────

/// `IdentityBroker` over the config file.
///
/// Flags set through [`IdentityBroker::set_credentials_need_update`] are
/// written back to the file the broker was loaded from, if any.
pub struct ConfigBroker {
    config: Mutex<Config>,
    path: Option<PathBuf>,
    use_keyring: bool,
}

impl ConfigBroker {
    /// In-memory broker; flags are not persisted.
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
            path: None,
            use_keyring: true,
        }
    }

    /// Broker persisting flags to `path`.
    pub fn with_path(config: Config, path: PathBuf) -> Self {
        Self {
            path: Some(path),
            ..Self::new(config)
        }
    }

    /// Load `path` and persist flags back to it.
    ///
    /// `defaults.keyring = false` skips the keyring step.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = load_config_from(path)?;
        let use_keyring = config.defaults.keyring;
        Ok(Self {
            use_keyring,
            ..Self::with_path(config, path.to_path_buf())
        })
    }

    /// Skip the keyring step of secret resolution.
    pub fn without_keyring(mut self) -> Self {
        self.use_keyring = false;
        self
    }

    /// A copy of the current configuration, including any flags set since load.
    pub fn snapshot(&self) -> Config {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, account_id: u32) -> Result<SignInReply, ConfigError> {
        let config = self.lock();
        let entry = config
            .account(account_id)
            .ok_or(ConfigError::UnknownAccount { id: account_id })?;
        resolve_sign_in(entry, &config.defaults, self.use_keyring)
    }
}

impl IdentityBroker for ConfigBroker {
    fn enumerate_accounts(&self, service_name: &str) -> Vec<AccountRecord> {
        self.lock()
            .accounts
            .iter()
            .map(|entry| entry.record(service_name))
            .collect()
    }

    async fn sign_in(
        &self,
        account_id: u32,
        _service_name: &str,
    ) -> Result<SignInReply, CoreError> {
        self.resolve(account_id)
            .map_err(|e| CoreError::AuthResolution {
                account_id,
                message: e.to_string(),
            })
    }

    fn set_credentials_need_update(&self, account_id: u32, service_name: &str) -> bool {
        let mut config = self.lock();
        let Some(entry) = config.account_mut(account_id) else {
            return false;
        };
        entry
            .services
            .entry(service_name.to_owned())
            .or_default()
            .credentials_need_update = true;

        drop(config);

        match &self.path {
            Some(path) => match persist_credential_flag(path, account_id, service_name) {
                Ok(found) => found,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to persist credential flag");
                    false
                }
            },
            None => true,
        }
    }
}

/// Set the flag in the file alone, leaving env overrides out of what is written.
fn persist_credential_flag(
    path: &Path,
    account_id: u32,
    service_name: &str,
) -> Result<bool, ConfigError> {
    let mut on_disk: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .extract()?;
    let Some(entry) = on_disk.account_mut(account_id) else {
        warn!(account_id, path = %path.display(), "account not in config file");
        return Ok(false);
    };
    entry
        .services
        .entry(service_name.to_owned())
        .or_default()
        .credentials_need_update = true;
    save_config_to(path, &on_disk)?;
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_account = 1

[defaults]
insecure = true
stall_timeout = 90

[[accounts]]
id = 1
display_name = "Work"
server_url = "https://cloud.example.com"
username = "alice"
password = "plain-pw"
password_env = "NEXTLINK_TEST_SURELY_UNSET_VAR"

[[accounts]]
id = 2
server_url = "https://photos.example.org"
token = "tok-2"
ignore_ssl_errors = false

[accounts.services.files]
enabled = false

[[accounts]]
id = 3
server_url = "https://old.example.net"
username = "carol"
enabled = false
"#;

    fn write_sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_accounts_and_defaults() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        assert_eq!(config.default_account, Some(1));
        assert!(config.defaults.insecure);
        assert_eq!(config.defaults.stall_timeout, 90);
        assert_eq!(config.defaults.service, "files");
        assert_eq!(config.accounts.len(), 3);
        assert_eq!(config.account(3).unwrap().label(), "carol@old.example.net");
        assert_eq!(config.account(1).unwrap().label(), "Work");

        let session = config.defaults.session_options();
        assert_eq!(session.stall_timeout, Duration::from_secs(90));
        assert_eq!(session.listing_props, ListingProps::Detailed);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert!(config.accounts.is_empty());
        assert_eq!(config.defaults.webdav_path, DEFAULT_WEBDAV_PATH);
    }

    #[test]
    fn keyring_can_be_disabled_from_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[defaults]\nkeyring = false\n").unwrap();

        assert!(!ConfigBroker::load(&path).unwrap().use_keyring);
        assert!(ConfigBroker::new(Config::default()).use_keyring);
    }

    #[test]
    fn save_then_load_keeps_accounts() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();
        save_config_to(&path, &config).unwrap();

        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.accounts.len(), 3);
        assert!(!reloaded.account(2).unwrap().services["files"].enabled);
    }

    #[test]
    fn enumeration_reports_eligibility() {
        let (_dir, path) = write_sample();
        let broker = ConfigBroker::load(&path).unwrap().without_keyring();

        let records = broker.enumerate_accounts("files");
        let eligible: Vec<u32> = records
            .iter()
            .filter(|r| r.is_eligible())
            .map(|r| r.id)
            .collect();
        assert_eq!(eligible, [1]);
        assert!(!records[1].service_valid);
        assert!(!records[2].enabled);
    }

    #[tokio::test]
    async fn sign_in_falls_through_to_plaintext() {
        let (_dir, path) = write_sample();
        let broker = ConfigBroker::load(&path).unwrap().without_keyring();

        let reply = broker.sign_in(1, "files").await.unwrap();
        assert_eq!(reply.username, "alice");
        assert_eq!(reply.password.unwrap().expose_secret(), "plain-pw");
        assert!(reply.access_token.is_none());
        assert!(reply.ignore_ssl_errors);

        let token = broker.sign_in(2, "files").await.unwrap();
        assert_eq!(token.access_token.unwrap().expose_secret(), "tok-2");
        assert!(!token.ignore_ssl_errors);
    }

    #[tokio::test]
    async fn sign_in_failures_are_auth_resolution_errors() {
        let (_dir, path) = write_sample();
        let broker = ConfigBroker::load(&path).unwrap().without_keyring();

        let missing = broker.sign_in(42, "files").await.unwrap_err();
        assert!(matches!(missing, CoreError::AuthResolution { account_id: 42, .. }));

        let no_secret = broker.sign_in(3, "files").await.unwrap_err();
        assert!(no_secret.to_string().contains("no credentials"));
    }

    #[test]
    fn credential_flag_is_persisted() {
        let (_dir, path) = write_sample();
        let broker = ConfigBroker::load(&path).unwrap().without_keyring();

        assert!(broker.set_credentials_need_update(1, "files"));
        assert!(!broker.set_credentials_need_update(99, "files"));
        assert!(!broker.enumerate_accounts("files")[0].is_eligible());

        let reloaded = load_config_from(&path).unwrap();
        assert!(reloaded.account(1).unwrap().services["files"].credentials_need_update);
        assert!(reloaded.account(1).unwrap().services["files"].enabled);
        assert!(broker.enumerate_accounts("calendar")[0].is_eligible());
    }

    #[test]
    fn flagging_writes_only_file_values() {
        let (_dir, path) = write_sample();
        // Stand-ins for values layered on from the environment.
        let mut config = load_config_from(&path).unwrap();
        config.defaults.stall_timeout = 5;
        config.defaults.keyring = false;
        config.account_mut(1).unwrap().display_name = "From env".into();
        let broker = ConfigBroker::with_path(config, path.clone()).without_keyring();

        assert!(broker.set_credentials_need_update(1, "files"));
        assert!(!broker.enumerate_accounts("files")[0].is_eligible());

        let saved = std::fs::read_to_string(&path).unwrap();
        let on_disk: Config = toml::from_str(&saved).unwrap();
        assert_eq!(on_disk.defaults.stall_timeout, 90);
        assert!(on_disk.defaults.keyring);
        assert_eq!(on_disk.account(1).unwrap().label(), "Work");
        assert!(on_disk.account(1).unwrap().services["files"].credentials_need_update);
        assert!(!saved.contains("From env"));
    }
}
