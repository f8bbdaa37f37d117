// OCS reply decoding
//
// Every OCS endpoint wraps its payload in
// `{ "ocs": { "meta": { "statuscode", "message" }, "data": ... } }`.
// The envelope is checked once here; payload decoders only see `data`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Error;
use crate::models::{Notification, RawNotification, RawUser, User};

/// The only OCS status code treated as success (v2 endpoints).
pub const OCS_OK: i64 = 200;

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    ocs: OcsBody,
}

#[derive(Debug, Deserialize)]
struct OcsBody {
    meta: Meta,
    #[serde(default)]
    data: Option<Value>,
}

/// Metadata from the OCS envelope. `statuscode == 200` means success.
#[derive(Debug, Deserialize)]
struct Meta {
    statuscode: i64,
    #[serde(default)]
    message: Option<String>,
}

/// Validate the envelope and return `ocs.data`.
pub fn unwrap_envelope(bytes: &[u8]) -> Result<Value, Error> {
    let envelope: Envelope = serde_json::from_slice(bytes).map_err(Error::malformed)?;
    let meta = envelope.ocs.meta;

    if meta.statuscode != OCS_OK {
        return Err(Error::ServerRejected {
            code: meta.statuscode,
            message: meta.message.unwrap_or_default(),
        });
    }

    envelope
        .ocs
        .data
        .ok_or_else(|| Error::malformed("missing ocs.data"))
}

// ── Payload decoders ─────────────────────────────────────────────────

/// `data.capabilities[name]` as an opaque map.
///
/// A missing `capabilities` object is a decode error; a missing entry
/// for `name` is simply empty.
pub fn try_find_capability(name: &str, bytes: &[u8]) -> Result<Map<String, Value>, Error> {
    let data = unwrap_envelope(bytes)?;
    let capabilities = data
        .get("capabilities")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::malformed("missing ocs.data.capabilities"))?;

    Ok(capabilities
        .get(name)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default())
}

/// Decode the current-user or user-by-id payload.
///
/// The two endpoints disagree on the display name key: `display-name`
/// is checked first, then `displayname`.
pub fn try_parse_user(bytes: &[u8]) -> Result<User, Error> {
    let data = unwrap_envelope(bytes)?;
    let raw: RawUser = serde_json::from_value(data).map_err(Error::malformed)?;

    let display_name = raw
        .display_name
        .filter(|name| !name.is_empty())
        .or(raw.displayname)
        .unwrap_or_default();

    Ok(User {
        user_id: raw.id,
        display_name,
    })
}

/// Decode the notification list, preserving server order.
///
/// Individual entries that fail to decode are skipped with a warning.
pub fn try_parse_notifications(bytes: &[u8]) -> Result<Vec<Notification>, Error> {
    let data = unwrap_envelope(bytes)?;
    let Value::Array(entries) = data else {
        return Err(Error::malformed("ocs.data is not an array"));
    };

    let mut notifications = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<RawNotification>(entry) {
            Ok(raw) => notifications.push(raw.into()),
            Err(e) => warn!(error = %e, "skipping undecodable notification"),
        }
    }
    Ok(notifications)
}

/// Decode the gallery app's config reply (no OCS envelope).
pub fn try_parse_gallery_config(bytes: &[u8]) -> Result<Map<String, Value>, Error> {
    match serde_json::from_slice(bytes).map_err(Error::malformed)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::malformed("gallery config is not an object")),
    }
}

/// Decode the gallery app's `files` list (no OCS envelope).
pub fn try_parse_gallery_list(bytes: &[u8]) -> Result<Vec<Value>, Error> {
    let mut reply = try_parse_gallery_config(bytes)?;
    match reply.remove("files") {
        Some(Value::Array(files)) => Ok(files),
        Some(_) => Err(Error::malformed("gallery files is not an array")),
        None => Err(Error::malformed("missing gallery files")),
    }
}

// ── Conversions ──────────────────────────────────────────────────────

/// Render a JSON id (number or string) as a string.
fn id_to_string(raw: Option<Value>) -> String {
    match raw {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn parse_iso_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<RawNotification> for Notification {
    fn from(raw: RawNotification) -> Self {
        Self {
            notification_id: id_to_string(raw.notification_id),
            app: raw.app,
            user_id: raw.user,
            date_time: parse_iso_datetime(raw.datetime.as_deref()),
            icon: raw.icon,
            link: raw.link,
            actions: raw.actions,
            object_type: raw.object_type,
            object_id: id_to_string(raw.object_id),
            subject: raw.subject,
            subject_rich: raw.subject_rich,
            subject_rich_parameters: raw.subject_rich_parameters,
            message: raw.message,
            message_rich: raw.message_rich,
            message_rich_parameters: raw.message_rich_parameters,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn envelope(statuscode: i64, data: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "ocs": {
                "meta": { "status": "ok", "statuscode": statuscode, "message": "OK" },
                "data": data
            }
        }))
        .unwrap()
    }

    #[test]
    fn capability_lookup_returns_named_map() {
        let body = envelope(
            200,
            json!({
                "version": { "major": 27 },
                "capabilities": {
                    "notifications": { "ocs-endpoints": ["list", "get"] },
                    "files": { "bigfilechunking": true }
                }
            }),
        );

        let caps = try_find_capability("notifications", &body).unwrap();
        assert_eq!(caps.get("ocs-endpoints"), Some(&json!(["list", "get"])));
        assert_eq!(caps.len(), 1);
    }

    #[test]
    fn absent_capability_is_empty() {
        let body = envelope(200, json!({ "capabilities": {} }));
        assert!(try_find_capability("gallery", &body).unwrap().is_empty());
    }

    #[test]
    fn missing_capabilities_key_is_a_decode_error() {
        let body = envelope(200, json!({ "version": {} }));
        assert!(try_find_capability("files", &body).unwrap_err().is_decode());
    }

    #[test]
    fn non_200_statuscode_is_rejected_by_every_decoder() {
        for code in [100, 400, 404, 997] {
            let body = envelope(code, json!({ "capabilities": { "files": {} } }));
            for err in [
                try_find_capability("files", &body).map(|_| ()).unwrap_err(),
                try_parse_user(&body).map(|_| ()).unwrap_err(),
                try_parse_notifications(&body).map(|_| ()).unwrap_err(),
            ] {
                assert!(
                    matches!(err, Error::ServerRejected { code: c, .. } if c == code),
                    "unexpected error for {code}: {err:?}"
                );
            }
        }
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = try_parse_user(b"<html>nope</html>").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn user_prefers_display_dash_name() {
        let body = envelope(
            200,
            json!({ "id": "alice", "display-name": "Alice A.", "displayname": "ignored" }),
        );
        let user = try_parse_user(&body).unwrap();
        assert_eq!(user.user_id, "alice");
        assert_eq!(user.display_name, "Alice A.");
    }

    #[test]
    fn user_falls_back_to_displayname() {
        let body = envelope(200, json!({ "id": "bob", "displayname": "Bob B." }));
        assert_eq!(try_parse_user(&body).unwrap().display_name, "Bob B.");

        let body = envelope(200, json!({ "id": "bob", "display-name": "", "displayname": "Bob" }));
        assert_eq!(try_parse_user(&body).unwrap().display_name, "Bob");
    }

    #[test]
    fn notifications_keep_order_and_fields() {
        let body = envelope(
            200,
            json!([
                {
                    "notification_id": 61,
                    "app": "files_sharing",
                    "user": "alice",
                    "datetime": "2023-10-11T09:30:15+00:00",
                    "object_type": "remote_share",
                    "object_id": "13",
                    "subject": "Bob shared a folder",
                    "subjectRich": "{user} shared {folder}",
                    "subjectRichParameters": { "user": { "type": "user", "id": "bob" } },
                    "message": "",
                    "messageRich": "",
                    "messageRichParameters": [],
                    "link": "https://cloud.example.com/f/13",
                    "icon": "https://cloud.example.com/icon.svg",
                    "actions": [
                        { "label": "Accept", "type": "POST", "primary": true },
                        { "label": "Decline", "type": "DELETE", "primary": false }
                    ]
                },
                { "notification_id": "62", "app": "updatenotification", "object_id": 7 }
            ]),
        );

        let list = try_parse_notifications(&body).unwrap();
        assert_eq!(list.len(), 2);

        let first = &list[0];
        assert_eq!(first.notification_id, "61");
        assert_eq!(first.user_id, "alice");
        assert_eq!(
            first.date_time,
            Some(Utc.with_ymd_and_hms(2023, 10, 11, 9, 30, 15).unwrap())
        );
        assert_eq!(first.actions.len(), 2);
        assert_eq!(first.actions[0]["label"], "Accept");
        assert_eq!(first.subject_rich_parameters["user"]["id"], "bob");

        assert_eq!(list[1].notification_id, "62");
        assert_eq!(list[1].object_id, "7");
        assert_eq!(list[1].date_time, None);
    }

    #[test]
    fn notification_data_must_be_an_array() {
        let body = envelope(200, json!({ "unexpected": true }));
        assert!(try_parse_notifications(&body).unwrap_err().is_decode());
    }

    #[test]
    fn gallery_list_extracts_files() {
        let body = serde_json::to_vec(&json!({
            "files": [{ "path": "Photos/a.jpg", "etag": "e1" }],
            "albums": {},
            "updated": true
        }))
        .unwrap();
        let files = try_parse_gallery_list(&body).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["path"], "Photos/a.jpg");
    }
}
