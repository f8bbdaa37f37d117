// Recovering reply decoder
//
// Front door for callers that want "data or nothing": every decode failure
// is logged as a diagnostic and replaced by an empty/default value, so
// malformed replies never unwind past this point.

use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::error::Error;
use crate::models::{Notification, Resource, User};
use crate::{ocs, webdav};

/// Decodes WebDAV and OCS replies into typed results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyDecoder {
    dump_replies: bool,
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every raw reply body at `trace` level before decoding.
    pub fn with_dump(mut self, dump_replies: bool) -> Self {
        self.dump_replies = dump_replies;
        self
    }

    pub fn propfind(&self, bytes: &[u8], queried_path: &str) -> Vec<Resource> {
        self.dump("propfind", bytes);
        recover("propfind", webdav::try_parse_propfind(bytes, queried_path))
    }

    pub fn capability(&self, name: &str, bytes: &[u8]) -> Map<String, Value> {
        self.dump("capabilities", bytes);
        recover("capabilities", ocs::try_find_capability(name, bytes))
    }

    pub fn user(&self, bytes: &[u8]) -> User {
        self.dump("user", bytes);
        recover("user", ocs::try_parse_user(bytes))
    }

    pub fn notifications(&self, bytes: &[u8]) -> Vec<Notification> {
        self.dump("notifications", bytes);
        recover("notifications", ocs::try_parse_notifications(bytes))
    }

    pub fn gallery_config(&self, bytes: &[u8]) -> Map<String, Value> {
        self.dump("gallery config", bytes);
        recover("gallery config", ocs::try_parse_gallery_config(bytes))
    }

    pub fn gallery_list(&self, bytes: &[u8]) -> Vec<Value> {
        self.dump("gallery list", bytes);
        recover("gallery list", ocs::try_parse_gallery_list(bytes))
    }

    fn dump(&self, what: &str, bytes: &[u8]) {
        if self.dump_replies {
            trace!(reply = what, body = %String::from_utf8_lossy(bytes), "raw reply");
        }
    }
}

fn recover<T: Default>(what: &str, result: Result<T, Error>) -> T {
    result.unwrap_or_else(|e| {
        warn!(reply = what, error = %e, "reply decode failed, using empty result");
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_recover_to_empty_values() {
        let decoder = ReplyDecoder::new().with_dump(true);
        let rejected = br#"{"ocs":{"meta":{"statuscode":403,"message":"no"},"data":[]}}"#;

        assert!(decoder.propfind(b"<broken", "/").is_empty());
        assert!(decoder.capability("files", rejected).is_empty());
        assert_eq!(decoder.user(rejected), User::default());
        assert!(decoder.notifications(rejected).is_empty());
        assert!(decoder.notifications(b"not json").is_empty());
        assert!(decoder.gallery_list(b"[]").is_empty());
    }
}
