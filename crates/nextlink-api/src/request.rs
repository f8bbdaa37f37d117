// WebDAV / OCS request construction
//
// Produces fully specified, transport-agnostic `Request` values: method,
// URL, headers and an owned body buffer. Nothing here touches the network,
// so every rule (path normalization, auth header choice, per-operation
// headers) is testable in isolation.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, AsciiSet, percent_decode_str, utf8_percent_encode};
use reqwest::Method;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credentials;
use crate::error::Error;

// ── Endpoints ────────────────────────────────────────────────────────

pub const CAPABILITIES_PATH: &str = "/ocs/v2.php/cloud/capabilities";
pub const NOTIFICATIONS_PATH: &str = "/ocs/v2.php/apps/notifications/api/v2/notifications";
pub const CURRENT_USER_PATH: &str = "/ocs/v2.php/cloud/user";
pub const USERS_PATH: &str = "/ocs/v2.php/cloud/users";
pub const GALLERY_CONFIG_PATH: &str = "/index.php/apps/gallery/api/config";
pub const GALLERY_LIST_PATH: &str = "/index.php/apps/gallery/api/files/list";

/// Header the server requires on OCS calls to skip its CSRF check.
pub const OCS_APIREQUEST: HeaderName = HeaderName::from_static("ocs-apirequest");
pub const DEPTH: HeaderName = HeaderName::from_static("depth");

const JSON: &str = "application/json";
const XML: &str = "application/xml; charset=utf-8";

/// Characters escaped when a user id becomes a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const PROPNAME_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:propname/></d:propfind>"#;

const DETAILED_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:oc="http://owncloud.org/ns">
  <d:prop>
    <d:getlastmodified/>
    <d:getcontenttype/>
    <d:getcontentlength/>
    <d:resourcetype/>
    <oc:fileid/>
    <oc:owner-id/>
    <oc:size/>
  </d:prop>
</d:propfind>"#;

// ── Request ──────────────────────────────────────────────────────────

/// A fully built HTTP request.
///
/// Owns its body buffer; the buffer is released when the request (or the
/// transfer that consumed it) is dropped.
#[derive(Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Accept invalid TLS certificates for this request.
    pub ignore_ssl_errors: bool,
}

impl Request {
    /// The URL with any embedded password removed, for logging.
    pub fn redacted_url(&self) -> Url {
        let mut url = self.url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some("***"));
        }
        url
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.redacted_url().as_str())
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("ignore_ssl_errors", &self.ignore_ssl_errors)
            .finish()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Which properties a directory listing asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListingProps {
    /// `<d:propname/>`: property names only.
    #[default]
    PropNames,
    /// Explicit list of the properties the WebDAV decoder understands.
    Detailed,
}

impl ListingProps {
    fn body(self) -> &'static str {
        match self {
            Self::PropNames => PROPNAME_BODY,
            Self::Detailed => DETAILED_BODY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthMode {
    /// Header auth on `/ocs/` paths, URL user-info elsewhere.
    ByPath,
    /// Always send an `Authorization: Basic` header.
    ForceBasic,
}

/// Builds authenticated WebDAV and OCS requests for one server + account.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    server_url: Url,
    credentials: Credentials,
    ignore_ssl_errors: bool,
    dump_requests: bool,
    listing_props: ListingProps,
}

impl RequestBuilder {
    /// Builder for username + password credentials.
    pub fn basic(server_url: &str, username: &str, password: &str) -> Result<Self, Error> {
        if username.is_empty() {
            return Err(Error::InvalidArgument { field: "username" });
        }
        let url = parse_server_url(server_url)?;
        Ok(Self::from_credentials(url, Credentials::basic(username, password)))
    }

    /// Builder for an OAuth2 access token.
    pub fn bearer(server_url: &str, access_token: &str) -> Result<Self, Error> {
        if access_token.is_empty() {
            return Err(Error::InvalidArgument {
                field: "access_token",
            });
        }
        let url = parse_server_url(server_url)?;
        Ok(Self::from_credentials(url, Credentials::bearer(access_token)))
    }

    pub fn from_credentials(server_url: Url, credentials: Credentials) -> Self {
        Self {
            server_url,
            credentials,
            ignore_ssl_errors: false,
            dump_requests: false,
            listing_props: ListingProps::default(),
        }
    }

    pub fn ignore_ssl_errors(mut self, ignore: bool) -> Self {
        self.ignore_ssl_errors = ignore;
        self
    }

    /// Log every built request (URL redacted, body included) at `trace` level.
    pub fn dump_requests(mut self, dump: bool) -> Self {
        self.dump_requests = dump;
        self
    }

    pub fn listing_props(mut self, props: ListingProps) -> Self {
        self.listing_props = props;
        self
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    // ── OCS operations ───────────────────────────────────────────────

    pub fn capabilities(&self) -> Result<Request, Error> {
        self.json_get(&self.server_path(CAPABILITIES_PATH), AuthMode::ByPath, &[])
    }

    pub fn notification_list(&self) -> Result<Request, Error> {
        self.json_get(&self.server_path(NOTIFICATIONS_PATH), AuthMode::ByPath, &[])
    }

    /// The user the credentials belong to.
    pub fn current_user(&self) -> Result<Request, Error> {
        self.json_get(&self.server_path(CURRENT_USER_PATH), AuthMode::ByPath, &[])
    }

    /// A user looked up by id.
    pub fn user_info(&self, user_id: &str) -> Result<Request, Error> {
        if user_id.is_empty() {
            return Err(Error::InvalidArgument { field: "user_id" });
        }
        let path = format!("{USERS_PATH}/{}", utf8_percent_encode(user_id, SEGMENT));
        self.json_get(&self.server_path(&path), AuthMode::ByPath, &[])
    }

    // ── Gallery (legacy app API) ─────────────────────────────────────

    pub fn gallery_config(&self) -> Result<Request, Error> {
        self.json_get(&self.server_path(GALLERY_CONFIG_PATH), AuthMode::ForceBasic, &[])
    }

    /// List gallery files below `location`.
    ///
    /// Media types and features are sent `;`-separated, as the gallery app expects.
    pub fn gallery_list(
        &self,
        location: &str,
        media_types: &[&str],
        features: &[&str],
        etag: Option<&str>,
    ) -> Result<Request, Error> {
        let media_types = media_types.join(";");
        let features = features.join(";");
        let mut query = vec![
            ("location", location),
            ("mediatypes", media_types.as_str()),
            ("features", features.as_str()),
        ];
        if let Some(etag) = etag {
            query.push(("etag", etag));
        }
        self.json_get(&self.server_path(GALLERY_LIST_PATH), AuthMode::ForceBasic, &query)
    }

    // ── WebDAV operations ────────────────────────────────────────────
    //
    // Callers pass the full WebDAV path, including any installation prefix.

    /// PROPFIND with `Depth: 1` on a collection.
    pub fn dir_listing(&self, remote_path: &str) -> Result<Request, Error> {
        require_path(remote_path)?;
        let mut request = self.prepare(dav_method("PROPFIND")?, remote_path, AuthMode::ByPath)?;
        request.headers.insert(DEPTH, HeaderValue::from_static("1"));
        self.finish(request, Some(XML), Bytes::from_static(self.listing_props.body().as_bytes()))
    }

    /// MKCOL with no body.
    pub fn dir_creation(&self, remote_path: &str) -> Result<Request, Error> {
        require_path(remote_path)?;
        let request = self.prepare(dav_method("MKCOL")?, remote_path, AuthMode::ByPath)?;
        self.finish(request, None, Bytes::new())
    }

    /// PUT `data` to `remote_path`.
    pub fn upload(
        &self,
        remote_path: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Result<Request, Error> {
        require_path(remote_path)?;
        let data = data.into();
        if data.is_empty() {
            return Err(Error::InvalidArgument { field: "data" });
        }
        let request = self.prepare(Method::PUT, remote_path, AuthMode::ByPath)?;
        self.finish(request, content_type, data)
    }

    /// GET a file with `Depth: 1`.
    pub fn download(&self, remote_path: &str) -> Result<Request, Error> {
        require_path(remote_path)?;
        let mut request = self.prepare(Method::GET, remote_path, AuthMode::ByPath)?;
        request.headers.insert(DEPTH, HeaderValue::from_static("1"));
        self.finish(request, None, Bytes::new())
    }

    // ── Assembly ─────────────────────────────────────────────────────

    /// An endpoint below the server's own path, for installs in a subdirectory.
    fn server_path(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.server_url.path().trim_end_matches('/'))
    }

    fn json_get(
        &self,
        path: &str,
        auth: AuthMode,
        query: &[(&str, &str)],
    ) -> Result<Request, Error> {
        let mut request = self.prepare(Method::GET, path, auth)?;
        {
            let mut pairs = request.url.query_pairs_mut();
            pairs.append_pair("format", "json");
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        request.headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        self.finish(request, None, Bytes::new())
    }

    fn is_ocs_path(&self, path: &str) -> bool {
        let base = self.server_url.path().trim_end_matches('/');
        path.strip_prefix(base)
            .unwrap_or(path)
            .starts_with("/ocs/")
    }

    /// Resolve the URL and attach authentication.
    ///
    /// `path` replaces the server URL's path outright.
    fn prepare(&self, method: Method, path: &str, auth: AuthMode) -> Result<Request, Error> {
        let path = normalize_path(path);
        let mut url = self.server_url.clone();
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);

        let is_ocs = auth == AuthMode::ForceBasic || self.is_ocs_path(&path);
        let mut headers = HeaderMap::new();

        match &self.credentials {
            Credentials::Basic { username, password } => {
                if is_ocs {
                    headers.insert(AUTHORIZATION, basic_header(username, password)?);
                } else {
                    url.set_username(username)
                        .map_err(|()| Error::InvalidArgument { field: "server_url" })?;
                    url.set_password(Some(password.expose_secret()))
                        .map_err(|()| Error::InvalidArgument { field: "server_url" })?;
                }
            }
            Credentials::Bearer { token } => {
                headers.insert(AUTHORIZATION, bearer_header(token)?);
            }
        }
        if is_ocs {
            headers.insert(OCS_APIREQUEST, HeaderValue::from_static("true"));
        }

        Ok(Request {
            method,
            url,
            headers,
            body: Bytes::new(),
            ignore_ssl_errors: self.ignore_ssl_errors,
        })
    }

    /// Attach content headers and the body.
    fn finish(
        &self,
        mut request: Request,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<Request, Error> {
        if let Some(content_type) = content_type {
            let value = HeaderValue::from_str(content_type).map_err(|_| Error::InvalidArgument {
                field: "content_type",
            })?;
            request.headers.insert(CONTENT_TYPE, value);
        }
        request
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        request.body = body;

        debug!(method = %request.method, url = %request.redacted_url(), "built request");
        if self.dump_requests {
            trace!(
                headers = ?request.headers,
                body = %String::from_utf8_lossy(&request.body),
                "request dump"
            );
        }
        Ok(request)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn parse_server_url(raw: &str) -> Result<Url, Error> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidArgument { field: "server_url" });
    }
    Ok(Url::parse(raw.trim())?)
}

fn require_path(remote_path: &str) -> Result<(), Error> {
    if remote_path.is_empty() {
        return Err(Error::InvalidArgument {
            field: "remote_path",
        });
    }
    Ok(())
}

fn dav_method(name: &'static str) -> Result<Method, Error> {
    Method::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidArgument { field: "method" })
}

/// Force an absolute path; decode it first if it carries an encoded `@`.
///
/// `Url::set_path` leaves existing `%XX` escapes alone, so a pre-encoded
/// `%40` would otherwise reach the server verbatim.
pub fn normalize_path(path: &str) -> String {
    let path = if path.contains("%40") {
        percent_decode_str(path).decode_utf8_lossy().into_owned()
    } else {
        path.to_owned()
    };
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

fn basic_header(username: &str, password: &SecretString) -> Result<HeaderValue, Error> {
    if username.contains(':') || username.chars().any(char::is_control) {
        return Err(Error::InvalidArgument { field: "username" });
    }
    if password.expose_secret().chars().any(char::is_control) {
        return Err(Error::InvalidArgument { field: "password" });
    }
    let encoded = STANDARD.encode(format!("{username}:{}", password.expose_secret()));
    let mut value = HeaderValue::try_from(format!("Basic {encoded}"))
        .map_err(|_| Error::InvalidArgument { field: "username" })?;
    value.set_sensitive(true);
    Ok(value)
}

fn bearer_header(token: &SecretString) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::try_from(format!("Bearer {}", token.expose_secret())).map_err(
        |_| Error::InvalidArgument {
            field: "access_token",
        },
    )?;
    value.set_sensitive(true);
    Ok(value)
}
