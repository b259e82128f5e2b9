//! HTTP client for the Wompi REST API.
//!
//! Every response body arrives wrapped in a `{"data": ...}` envelope. The
//! client keeps the raw `data` document alongside the typed view because the
//! store persists the gateway payload verbatim for audit.

use compact_str::CompactString;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::objects::{PaymentLink, PaymentLinkRequest, Transaction};

/// Errors produced by the Wompi HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum WompiError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Wompi returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The response was missing the `data` envelope.
    #[error("response is missing the data envelope")]
    MissingData,
}

impl WompiError {
    /// HTTP status of the upstream response, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            WompiError::Http(e) => e.status(),
            WompiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A transaction together with the raw gateway document it was parsed from.
#[derive(Debug, Clone)]
pub struct FetchedTransaction {
    pub data: Transaction,
    /// The `data` object exactly as Wompi sent it.
    pub raw: serde_json::Value,
}

/// Typed HTTP client for the Wompi API.
///
/// Authentication is a bearer private key (`prv_test_…` / `prv_prod_…`) on
/// every request. The base URL is the versioned API root, e.g.
/// `https://production.wompi.co/v1/`.
#[derive(Debug, Clone)]
pub struct WompiClient {
    http: Client,
    base_url: Url,
    private_key: CompactString,
}

impl WompiClient {
    /// Create a new `WompiClient`.
    ///
    /// * `base_url` – versioned API root. A missing trailing slash is added
    ///   so `Url::join` keeps the `/v1` segment.
    /// * `private_key` – the merchant's private API key.
    pub fn new(mut base_url: Url, private_key: impl Into<CompactString>) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http: Client::new(),
            base_url,
            private_key: private_key.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /transactions/{id}` – fetch the current state of a transaction.
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<FetchedTransaction, WompiError> {
        let url = self.base_url.join(&format!("transactions/{transaction_id}"))?;

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.private_key)
            .send()
            .await?;

        let raw = unwrap_data(parse_response(resp).await?)?;
        let data: Transaction = serde_json::from_value(raw.clone())?;
        Ok(FetchedTransaction { data, raw })
    }

    /// `POST /payment_links` – create a hosted payment link.
    pub async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLink, WompiError> {
        let url = self.base_url.join("payment_links")?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.private_key)
            .json(request)
            .send()
            .await?;

        let raw = unwrap_data(parse_response(resp).await?)?;
        serde_json::from_value(raw).map_err(WompiError::Json)
    }
}

async fn parse_response(resp: reqwest::Response) -> Result<serde_json::Value, WompiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(WompiError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(WompiError::Json)
}

fn unwrap_data(body: serde_json::Value) -> Result<serde_json::Value, WompiError> {
    match body {
        serde_json::Value::Object(mut map) => map.remove("data").ok_or(WompiError::MissingData),
        _ => Err(WompiError::MissingData),
    }
}
