// Decoded reply types
//
// Typed results of the WebDAV and OCS decoders. These are plain data:
// built once per decode call and owned by whoever asked for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── WebDAV ───────────────────────────────────────────────────────────

/// One entry of a PROPFIND directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resource {
    /// Server-relative path, percent-decoded.
    pub href: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub owner_id: Option<String>,
    pub file_id: Option<String>,
    pub size: u64,
    pub is_collection: bool,
}

impl Resource {
    /// Last path segment of `href`, ignoring a trailing slash.
    pub fn name(&self) -> &str {
        let trimmed = self.href.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

// ── OCS ──────────────────────────────────────────────────────────────

/// A Nextcloud user as returned by the OCS user endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
}

/// One entry of the notifications app's list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Notification {
    pub notification_id: String,
    pub app: String,
    pub user_id: String,
    pub date_time: Option<DateTime<Utc>>,
    pub icon: String,
    pub link: String,
    /// Opaque action descriptors, in server order.
    pub actions: Vec<serde_json::Value>,
    pub object_type: String,
    pub object_id: String,
    pub subject: String,
    pub subject_rich: String,
    pub subject_rich_parameters: serde_json::Value,
    pub message: String,
    pub message_rich: String,
    pub message_rich_parameters: serde_json::Value,
}

// ── Raw wire shapes ──────────────────────────────────────────────────

/// Wire shape of a notification. Fields default liberally because the
/// notifications app omits empty values on some server versions.
#[derive(Debug, Deserialize)]
pub(crate) struct RawNotification {
    #[serde(default)]
    pub notification_id: Option<serde_json::Value>,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
    #[serde(default)]
    pub object_type: String,
    #[serde(default)]
    pub object_id: Option<serde_json::Value>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, rename = "subjectRich")]
    pub subject_rich: String,
    #[serde(default, rename = "subjectRichParameters")]
    pub subject_rich_parameters: serde_json::Value,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "messageRich")]
    pub message_rich: String,
    #[serde(default, rename = "messageRichParameters")]
    pub message_rich_parameters: serde_json::Value,
}

/// Wire shape of `ocs.data` for the user endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct RawUser {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "display-name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub displayname: Option<String>,
}
