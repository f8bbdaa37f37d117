// nextlink-core: account aggregation and sessions between nextlink-api and consumers.

pub mod accounts;
pub mod broker;
pub mod config;
pub mod error;
pub mod session;
pub mod transfer;

// ── Primary re-exports ──────────────────────────────────────────────
pub use accounts::{
    AccountDetails, AccountState, AggregateEvent, CredentialAggregator, NO_CREDENTIALS_MESSAGE,
    QueryMode,
};
pub use broker::{AccountRecord, IdentityBroker, SignInReply};
pub use config::{AggregatorOptions, DEFAULT_STALL_TIMEOUT, SessionOptions};
pub use error::CoreError;
pub use session::Session;
pub use transfer::supervise;

// Wire-layer types consumers need alongside sessions.
pub use nextlink_api::{Credentials, ListingProps, Notification, Resource, User};
pub use tokio_util::sync::CancellationToken;
