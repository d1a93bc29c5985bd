//! Transport seam for the remote table API.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};

use verdant_core::{Page, PageToken, Record, RecordId};

use super::error::{StoreBuildError, TransportError};
use super::types::{ApiBaseUrl, TableRef, ViewId, WebhookUrl};
use super::wire::{CreateRecordsBody, JsonFields, ListRecordsResponse, SingleRecordResponse};

/// Default base URL of the remote table API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.airtable.com/v0";

/// Per-request timeout; a hung remote call must not hang the pipeline.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One wire endpoint per method, isolating the protocol so the engine can be
/// exercised against in-memory stubs.
#[async_trait(?Send)]
pub trait TableStore {
    /// Fetch one page of a listing, optionally filtered by a saved view and
    /// positioned by an opaque continuation token.
    async fn list_page(
        &self,
        table: &TableRef,
        view: Option<&ViewId>,
        offset: Option<&PageToken>,
    ) -> Result<Page, TransportError>;

    /// Fetch a single record by id.
    async fn get_record(
        &self,
        table: &TableRef,
        id: &RecordId,
    ) -> Result<Record, TransportError>;

    /// Create up to [`MAX_BATCH_LEN`](super::MAX_BATCH_LEN) records in one
    /// write.
    async fn create_records(
        &self,
        table: &TableRef,
        rows: &[JsonFields],
    ) -> Result<(), TransportError>;

    /// Delete a single record by id.
    async fn delete_record(
        &self,
        table: &TableRef,
        id: &RecordId,
    ) -> Result<(), TransportError>;

    /// Fire a deletion trigger; a success only confirms acceptance, not
    /// completion of the asynchronous clear.
    async fn trigger_webhook(&self, url: &WebhookUrl) -> Result<(), TransportError>;

    /// Stream an attachment body into `sink`, returning the byte count.
    async fn download_attachment(
        &self,
        url: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError>;
}

/// HTTP implementation of [`TableStore`] carrying one bearer credential.
///
/// Every request sends `Authorization: Bearer {token}` and a JSON content
/// type; attachment and webhook requests go to caller-supplied absolute URLs
/// and omit the credential.
#[derive(Debug)]
pub struct HttpTableStore {
    client: Client,
    base_url: ApiBaseUrl,
    token: String,
}

impl HttpTableStore {
    /// Construct a store against the default API endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(token: impl Into<String>) -> Result<Self, StoreBuildError> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: sanitise_base_url(DEFAULT_API_BASE_URL),
            token: token.into(),
        })
    }

    /// Override the API endpoint (for self-hosted gateways and tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = sanitise_base_url(base_url);
        self
    }

    /// The endpoint the store talks to.
    #[must_use]
    pub fn base_url(&self) -> &ApiBaseUrl {
        &self.base_url
    }

    fn table_endpoint(&self, table: &TableRef) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.as_ref(),
            table.base.as_ref(),
            table.table.as_ref()
        )
    }

    fn record_endpoint(&self, table: &TableRef, id: &RecordId) -> String {
        format!("{}/{}", self.table_endpoint(table), id.as_ref())
    }

    async fn send_checked(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Response, TransportError> {
        request
            .send()
            .await
            .map_err(|err| convert_reqwest_error(&err, url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(&err, url))
    }
}

#[async_trait(?Send)]
impl TableStore for HttpTableStore {
    async fn list_page(
        &self,
        table: &TableRef,
        view: Option<&ViewId>,
        offset: Option<&PageToken>,
    ) -> Result<Page, TransportError> {
        let url = self.table_endpoint(table);
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(view) = view {
            query.push(("view", view.as_ref()));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset.as_ref()));
        }
        let request = self
            .client
            .get(&url)
            .query(&query)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json");
        let response = self.send_checked(request, &url).await?;
        let body: ListRecordsResponse = response
            .json()
            .await
            .map_err(|err| convert_reqwest_error(&err, &url))?;
        Ok(body.into_page())
    }

    async fn get_record(
        &self,
        table: &TableRef,
        id: &RecordId,
    ) -> Result<Record, TransportError> {
        let url = self.record_endpoint(table, id);
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json");
        let response = self.send_checked(request, &url).await?;
        let body: SingleRecordResponse = response
            .json()
            .await
            .map_err(|err| convert_reqwest_error(&err, &url))?;
        Ok(body.into_record(id))
    }

    async fn create_records(
        &self,
        table: &TableRef,
        rows: &[JsonFields],
    ) -> Result<(), TransportError> {
        let url = self.table_endpoint(table);
        let body = CreateRecordsBody::new(rows);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body);
        self.send_checked(request, &url).await?;
        Ok(())
    }

    async fn delete_record(
        &self,
        table: &TableRef,
        id: &RecordId,
    ) -> Result<(), TransportError> {
        let url = self.record_endpoint(table, id);
        let request = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json");
        self.send_checked(request, &url).await?;
        Ok(())
    }

    async fn trigger_webhook(&self, url: &WebhookUrl) -> Result<(), TransportError> {
        let request = self
            .client
            .post(url.as_ref())
            .json(&serde_json::json!({}));
        self.send_checked(request, url.as_ref()).await?;
        Ok(())
    }

    async fn download_attachment(
        &self,
        url: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        let request = self.client.get(url);
        let response = self.send_checked(request, url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| convert_reqwest_error(&err, url))?;
        sink.write_all(&bytes)
            .map_err(|source| TransportError::Network {
                url: url.to_owned(),
                source,
            })?;
        Ok(bytes.len() as u64)
    }
}

/// Trim trailing slashes and fall back to the default endpoint.
pub(crate) fn sanitise_base_url(url: impl Into<String>) -> ApiBaseUrl {
    let raw = url.into();
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        ApiBaseUrl::from(DEFAULT_API_BASE_URL)
    } else {
        ApiBaseUrl::new(trimmed.to_owned())
    }
}

fn convert_reqwest_error(error: &reqwest::Error, url: &str) -> TransportError {
    if let Some(status) = error.status() {
        return TransportError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }
    if error.is_decode() {
        return TransportError::Decode {
            url: url.to_owned(),
            message: error.to_string(),
        };
    }

    let kind = if error.is_timeout() {
        std::io::ErrorKind::TimedOut
    } else {
        std::io::ErrorKind::Other
    };
    TransportError::Network {
        url: url.to_owned(),
        source: std::io::Error::new(kind, error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::BaseId;
    use super::*;
    use rstest::rstest;
    use verdant_core::TableName;

    fn store() -> HttpTableStore {
        HttpTableStore::new("pat-secret").expect("store should build")
    }

    #[rstest]
    fn table_endpoint_joins_base_and_table() {
        let table = TableRef::new(BaseId::from("appBase"), TableName::from("plots"));
        assert_eq!(
            store().table_endpoint(&table),
            "https://api.airtable.com/v0/appBase/plots"
        );
    }

    #[rstest]
    fn base_url_override_strips_trailing_slash() {
        let table = TableRef::new(BaseId::from("appBase"), TableName::from("plots"));
        let endpoint = store()
            .with_base_url("https://gateway.example/v0/")
            .table_endpoint(&table);
        assert_eq!(endpoint, "https://gateway.example/v0/appBase/plots");
    }

    #[rstest]
    fn empty_base_url_falls_back_to_default() {
        assert_eq!(sanitise_base_url("/").as_ref(), DEFAULT_API_BASE_URL);
    }
}
