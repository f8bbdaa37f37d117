// nextlink-api: WebDAV and OCS wire layer for Nextcloud-compatible servers
//
// Builds authenticated requests, executes them over reqwest, and decodes
// multistatus XML and OCS JSON replies into typed records.

pub mod auth;
pub mod error;
pub mod models;
pub mod ocs;
pub mod reply;
pub mod request;
pub mod transport;
pub mod webdav;
pub mod xml;

pub use auth::{AuthScheme, Credentials};
pub use error::Error;
pub use models::{Notification, Resource, User};
pub use reply::ReplyDecoder;
pub use request::{ListingProps, Request, RequestBuilder};
pub use transport::{HttpTransport, Response, Transport, TransportConfig};
pub use xml::{XmlMap, XmlValue};
