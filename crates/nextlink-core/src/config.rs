// ── Runtime options ──
//
// How sessions and the credential aggregator behave. These never touch
// disk: the CLI (or any other front end) builds them from its own
// configuration and hands them in.

use std::time::Duration;

use nextlink_api::ListingProps;

/// Stall window for uploads and downloads.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// WebDAV root used when the identity broker supplies none.
pub const DEFAULT_WEBDAV_PATH: &str = "/remote.php/dav/files/{user}/";

/// The legacy single-user WebDAV endpoint some deployments still expose.
pub const LEGACY_WEBDAV_PATH: &str = "/remote.php/webdav/";

/// Service name requested from the identity broker by default.
pub const DEFAULT_SERVICE: &str = "files";

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Transfers with no progress for this long fail with a timeout.
    pub stall_timeout: Duration,
    /// Log every built request and raw reply at `trace` level.
    pub dump_traffic: bool,
    pub listing_props: ListingProps,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            dump_traffic: false,
            listing_props: ListingProps::default(),
        }
    }
}

/// Which service the aggregator asks for and how it fills gaps.
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub service_name: String,
    /// Template for accounts without a WebDAV path; `{user}` expands to the
    /// sign-in username.
    pub default_webdav_path: String,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE.into(),
            default_webdav_path: DEFAULT_WEBDAV_PATH.into(),
        }
    }
}

impl AggregatorOptions {
    /// Expand the default WebDAV path for `username`.
    pub fn webdav_path_for(&self, username: &str) -> String {
        self.default_webdav_path.replace("{user}", username)
    }
}
