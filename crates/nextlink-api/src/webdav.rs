// WebDAV multistatus decoding
//
// Turns a PROPFIND reply into `Resource` records via the generic XML tree.
// Both `response` and `propstat` may appear once or many times; the tree's
// `items()` view normalizes the two shapes.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::Error;
use crate::models::Resource;
use crate::xml::{self, XmlMap, XmlValue};

/// Decode a PROPFIND multistatus body, dropping the entry for `queried_path`.
///
/// Later `propstat` blocks of the same response overwrite earlier ones
/// on key collision.
pub fn try_parse_propfind(bytes: &[u8], queried_path: &str) -> Result<Vec<Resource>, Error> {
    let tree = xml::decode(bytes)?;
    let multistatus = tree
        .get("multistatus")
        .ok_or_else(|| Error::xml("missing <multistatus> root element"))?;

    let Some(responses) = multistatus.get("response") else {
        return Ok(Vec::new());
    };

    let queried_decoded = decode_href(queried_path);
    let mut resources = Vec::with_capacity(responses.items().len());

    for response in responses.items() {
        let Some(href) = response.get("href").and_then(XmlValue::text) else {
            debug!("skipping multistatus response without href");
            continue;
        };
        let href = decode_href(href);
        if href == queried_path || href == queried_decoded {
            continue;
        }

        let mut resource = Resource {
            href,
            ..Resource::default()
        };
        if let Some(propstats) = response.get("propstat") {
            for propstat in propstats.items() {
                let Some(props) = propstat.get("prop") else {
                    continue;
                };
                for prop in props.items().iter().filter_map(XmlValue::as_node) {
                    apply_props(&mut resource, prop);
                }
            }
        }
        resources.push(resource);
    }

    Ok(resources)
}

fn apply_props(resource: &mut Resource, prop: &XmlMap) {
    if let Some(value) = prop.get("getlastmodified") {
        resource.last_modified = value.text().and_then(parse_http_date);
    }
    if let Some(value) = prop.get("getcontenttype") {
        resource.content_type = value.text().map(str::to_owned);
    }
    if let Some(value) = prop.get("owner-id") {
        resource.owner_id = value.text().map(str::to_owned);
    }
    if let Some(value) = prop.get("fileid") {
        resource.file_id = value.text().map(str::to_owned);
    }
    if let Some(value) = prop.get("size").or_else(|| prop.get("getcontentlength")) {
        resource.size = value
            .text()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
    }
    if let Some(value) = prop.get("resourcetype") {
        resource.is_collection = has_collection_marker(value);
    }
}

/// `true` if any `resourcetype` node carries a `collection` child, any case.
fn has_collection_marker(resource_type: &XmlValue) -> bool {
    resource_type
        .items()
        .iter()
        .filter_map(XmlValue::as_node)
        .any(|node| node.keys().any(|k| k.eq_ignore_ascii_case("collection")))
}

/// Parse the RFC 2822 / HTTP-date form used by `getlastmodified`.
pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn decode_href(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
