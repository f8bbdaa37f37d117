// ── Identity broker seam ──
//
// The external system that knows which accounts exist and can hand out
// their credentials. `nextlink-config` implements it over a TOML file and
// the system keyring; tests implement it in memory.

use std::future::Future;

use secrecy::SecretString;

use crate::error::CoreError;

/// One account as enumerated by the broker, before any sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: u32,
    pub provider_name: String,
    pub service_name: String,
    pub display_name: String,
    pub enabled: bool,
    /// The account actually offers `service_name`.
    pub service_valid: bool,
    /// Account-level "credentials need update" flag.
    pub credentials_need_update: bool,
    /// Same flag, scoped to `service_name`.
    pub service_credentials_need_update: bool,
}

impl AccountRecord {
    /// Enabled, offering the service, and not flagged at either level.
    pub fn is_eligible(&self) -> bool {
        self.enabled
            && self.service_valid
            && !self.credentials_need_update
            && !self.service_credentials_need_update
    }
}

/// Credentials returned by a successful sign-in.
///
/// Any field may be empty; the aggregator normalizes and validates them.
#[derive(Debug, Clone, Default)]
pub struct SignInReply {
    pub username: String,
    pub password: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub server_url: String,
    pub webdav_path: String,
    pub ignore_ssl_errors: bool,
}

/// Source of accounts and credentials.
///
/// `sign_in` futures for different accounts may be polled concurrently and
/// resolve in any order.
pub trait IdentityBroker: Send + Sync {
    /// All accounts the broker knows about, with eligibility for `service_name`.
    fn enumerate_accounts(&self, service_name: &str) -> Vec<AccountRecord>;

    fn sign_in(
        &self,
        account_id: u32,
        service_name: &str,
    ) -> impl Future<Output = Result<SignInReply, CoreError>> + Send;

    /// Flag the account's stored credentials for `service_name` as stale.
    ///
    /// Returns `false` if the account is unknown or the flag could not be stored.
    fn set_credentials_need_update(&self, account_id: u32, service_name: &str) -> bool;
}
