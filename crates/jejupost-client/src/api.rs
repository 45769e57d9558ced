use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use jejupost_types::api::{LoginRequest, TokenResponse, UpdatePostcard};
use jejupost_types::models::{LifecycleStatus, Postcard};

use crate::auth::TokenStore;
use crate::error::ClientError;

/// The postcard CRUD surface the collection store depends on. `ApiClient` is
/// the real implementation; tests substitute an in-memory fake.
#[async_trait]
pub trait PostcardApi: Send + Sync {
    async fn list(&self, filter: Option<LifecycleStatus>) -> Result<Vec<Postcard>, ClientError>;
    async fn create(&self) -> Result<Postcard, ClientError>;
    async fn delete(&self, id: &str) -> Result<(), ClientError>;
}

/// HTTP client for the postcard backend. Cheap to clone; all clones share
/// one connection pool and one token store.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            inner: Arc::new(ClientInner {
                http: reqwest::Client::new(),
                base_url,
                tokens,
            }),
        }
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.inner.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Credential for authenticated calls. Fails without touching the network
    /// when the store is empty.
    fn bearer(&self) -> Result<String, ClientError> {
        self.inner.tokens.load().ok_or(ClientError::MissingToken)
    }

    // -- Auth --

    /// Sign in and persist the returned bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let resp = self
            .inner
            .http
            .post(self.url("/v1/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }

        let body: TokenResponse = serde_json::from_str(&resp.text().await?)?;
        self.inner.tokens.save(&body.access_token)?;
        debug!("signed in, token persisted");
        Ok(())
    }

    // -- Postcards --

    /// Fetch one postcard by id.
    pub async fn get(&self, id: &str) -> Result<Postcard, ClientError> {
        let token = self.bearer()?;
        let resp = self
            .inner
            .http
            .get(self.url(&format!("/v1/postcards/{id}")))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(serde_json::from_str(&resp.text().await?)?)
    }

    /// Update a `writing`/`pending` postcard. Text, recipient and schedule
    /// fields go out as multipart form fields, the photo as a file part —
    /// the shape the backend's PATCH endpoint expects.
    pub async fn update(&self, id: &str, update: UpdatePostcard) -> Result<Postcard, ClientError> {
        let token = self.bearer()?;

        let mut form = Form::new();
        if let Some(text) = update.text {
            form = form.text("text", text);
        }
        if let Some(email) = update.recipient_email {
            form = form.text("recipient_email", email);
        }
        if let Some(name) = update.recipient_name {
            form = form.text("recipient_name", name);
        }
        if let Some(name) = update.sender_name {
            form = form.text("sender_name", name);
        }
        if let Some(at) = update.scheduled_at {
            form = form.text("scheduled_at", at.to_rfc3339());
        }
        if let Some(photo) = update.photo {
            let part = Part::bytes(photo.bytes)
                .file_name(photo.file_name)
                .mime_str(&photo.content_type)?;
            form = form.part("image", part);
        }

        let resp = self
            .inner
            .http
            .patch(self.url(&format!("/v1/postcards/{id}")))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(serde_json::from_str(&resp.text().await?)?)
    }

    /// Kick off the send pipeline. Immediate sends come back `sent` or
    /// `processing`; scheduled ones come back `pending`.
    pub async fn send(&self, id: &str) -> Result<Postcard, ClientError> {
        let token = self.bearer()?;
        let resp = self
            .inner
            .http
            .post(self.url(&format!("/v1/postcards/{id}/send")))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(serde_json::from_str(&resp.text().await?)?)
    }

    /// Open the live status stream for one postcard. Returns the raw byte
    /// stream; framing is the consumer's job. The connection stays open until
    /// the stream is dropped or the server closes it.
    pub async fn open_status_stream(
        &self,
        id: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, reqwest::Error>>, ClientError> {
        let token = self.bearer()?;
        let resp = self
            .inner
            .http
            .get(self.url(&format!("/v1/postcards/{id}/status/stream")))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        debug!(postcard_id = %id, "status stream open");
        Ok(resp.bytes_stream().boxed())
    }
}

#[async_trait]
impl PostcardApi for ApiClient {
    /// List the user's postcards, optionally filtered by lifecycle status.
    /// Server order is preserved as-is.
    async fn list(&self, filter: Option<LifecycleStatus>) -> Result<Vec<Postcard>, ClientError> {
        let token = self.bearer()?;
        let mut req = self
            .inner
            .http
            .get(self.url("/v1/postcards"))
            .header("Authorization", format!("Bearer {token}"));
        if let Some(status) = filter {
            req = req.query(&[("status", status.as_str())]);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(serde_json::from_str(&resp.text().await?)?)
    }

    /// Create a blank postcard in `writing` state.
    async fn create(&self) -> Result<Postcard, ClientError> {
        let token = self.bearer()?;
        let resp = self
            .inner
            .http
            .post(self.url("/v1/postcards/create"))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(serde_json::from_str(&resp.text().await?)?)
    }

    /// Delete (or cancel) a postcard. 204 on success, no body.
    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let token = self.bearer()?;
        let resp = self
            .inner
            .http
            .delete(self.url(&format!("/v1/postcards/{id}")))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(())
    }
}
