// ── Session facade ──
//
// One signed-in account bound to a transport. Paths given to the file
// operations are relative to the account's WebDAV root; OCS calls go to
// the server root. Replies are decoded with the recovering decoders, so
// the only failures surfaced here are builder guards, HTTP rejections,
// transport errors and transfer outcomes.

use bytes::Bytes;
use nextlink_api::{
    HttpTransport, Notification, ReplyDecoder, Request, RequestBuilder, Resource, Response,
    Transport, TransportConfig, User,
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::accounts::AccountDetails;
use crate::config::SessionOptions;
use crate::error::CoreError;
use crate::transfer;

/// Authenticated access to one account's files and OCS endpoints.
pub struct Session<T> {
    account_id: u32,
    transport: T,
    builder: RequestBuilder,
    decoder: ReplyDecoder,
    webdav_root: String,
    options: SessionOptions,
}

impl Session<HttpTransport> {
    /// Session over a fresh reqwest transport.
    pub fn http(
        account: &AccountDetails,
        options: SessionOptions,
        transport: TransportConfig,
    ) -> Result<Self, CoreError> {
        Self::new(HttpTransport::new(transport)?, account, options)
    }
}

impl<T: Transport> Session<T> {
    /// Bind a resolved account to `transport`.
    ///
    /// Fails with `NoCredentials` if the account was never signed in.
    pub fn new(
        transport: T,
        account: &AccountDetails,
        options: SessionOptions,
    ) -> Result<Self, CoreError> {
        let (Some(server_url), Some(credentials)) = (&account.server_url, &account.credentials)
        else {
            return Err(CoreError::NoCredentials {
                account_id: account.account_id,
            });
        };

        let builder = RequestBuilder::from_credentials(server_url.clone(), credentials.clone())
            .ignore_ssl_errors(account.ignore_ssl_errors)
            .dump_requests(options.dump_traffic)
            .listing_props(options.listing_props);

        Ok(Self {
            account_id: account.account_id,
            transport,
            builder,
            decoder: ReplyDecoder::new().with_dump(options.dump_traffic),
            webdav_root: account.webdav_path.clone(),
            options,
        })
    }

    pub fn account_id(&self) -> u32 {
        self.account_id
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Server path of `remote_path` under the WebDAV root.
    pub fn dav_path(&self, remote_path: &str) -> String {
        let root = self.webdav_root.trim_end_matches('/');
        let relative = remote_path.trim_start_matches('/');
        if relative.is_empty() {
            format!("{root}/")
        } else {
            format!("{root}/{relative}")
        }
    }

    // ── Files ────────────────────────────────────────────────────────

    /// Entries directly below `remote_path`, excluding the directory itself.
    pub async fn list_directory(&self, remote_path: &str) -> Result<Vec<Resource>, CoreError> {
        let mut path = self.dav_path(remote_path);
        if !path.ends_with('/') {
            path.push('/');
        }
        let request = self.builder.dir_listing(&path)?;
        let queried = request.url.path().to_owned();
        let response = self.send(request).await?;
        Ok(self.decoder.propfind(&response.body, &queried))
    }

    pub async fn create_directory(&self, remote_path: &str) -> Result<(), CoreError> {
        let request = self.builder.dir_creation(&self.dav_path(remote_path))?;
        self.send(request).await.map(|_| ())
    }

    /// PUT `data`, supervised by the stall timer and `cancel`.
    pub async fn upload(
        &self,
        remote_path: &str,
        data: Bytes,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        let request = self
            .builder
            .upload(&self.dav_path(remote_path), data, content_type)?;
        self.transfer(request, cancel).await.map(|_| ())
    }

    /// GET a file's contents, supervised by the stall timer and `cancel`.
    pub async fn download(
        &self,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, CoreError> {
        let request = self.builder.download(&self.dav_path(remote_path))?;
        self.transfer(request, cancel)
            .await
            .map(|response| response.body)
    }

    // ── OCS ──────────────────────────────────────────────────────────

    /// The capability map published under `name`; empty if absent.
    pub async fn capability(&self, name: &str) -> Result<Map<String, Value>, CoreError> {
        let response = self.send(self.builder.capabilities()?).await?;
        Ok(self.decoder.capability(name, &response.body))
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, CoreError> {
        let response = self.send(self.builder.notification_list()?).await?;
        Ok(self.decoder.notifications(&response.body))
    }

    pub async fn current_user(&self) -> Result<User, CoreError> {
        let response = self.send(self.builder.current_user()?).await?;
        Ok(self.decoder.user(&response.body))
    }

    pub async fn user(&self, user_id: &str) -> Result<User, CoreError> {
        let response = self.send(self.builder.user_info(user_id)?).await?;
        Ok(self.decoder.user(&response.body))
    }

    // ── Gallery ──────────────────────────────────────────────────────

    pub async fn gallery_config(&self) -> Result<Map<String, Value>, CoreError> {
        let response = self.send(self.builder.gallery_config()?).await?;
        Ok(self.decoder.gallery_config(&response.body))
    }

    pub async fn gallery_list(
        &self,
        location: &str,
        media_types: &[&str],
        features: &[&str],
        etag: Option<&str>,
    ) -> Result<Vec<Value>, CoreError> {
        let request = self
            .builder
            .gallery_list(location, media_types, features, etag)?;
        let response = self.send(request).await?;
        Ok(self.decoder.gallery_list(&response.body))
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    async fn send(&self, request: Request) -> Result<Response, CoreError> {
        let response = self.transport.execute(request).await?;
        check_status(response)
    }

    async fn transfer(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, CoreError> {
        let response =
            transfer::supervise(&self.transport, request, cancel, self.options.stall_timeout)
                .await?;
        check_status(response)
    }
}

/// Map non-2xx statuses to `Rejected`. 207 Multi-Status is a success.
fn check_status(response: Response) -> Result<Response, CoreError> {
    if response.is_success() {
        Ok(response)
    } else {
        debug!(status = %response.status, "request rejected");
        Err(CoreError::rejected(response.status))
    }
}
