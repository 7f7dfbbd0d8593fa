// HTTP client for the device status endpoint.
//
// A single GET returning the device's current telemetry object. No retry
// and no polling here: scheduling belongs to the sync controller.

use reqwest::header::ACCEPT;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::payload::{self, Inbound};
use crate::transport::TransportConfig;

/// Raw HTTP client for the status endpoint (e.g. `https://gw.local/api/status`).
#[derive(Debug, Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    status_url: Url,
}

impl StatusClient {
    /// Create a status client from a `TransportConfig`.
    pub fn new(status_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, status_url })
    }

    /// Create a status client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(status_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let status_url = Url::parse(status_url)?;
        Ok(Self { http, status_url })
    }

    /// The endpoint this client polls.
    pub fn status_url(&self) -> &Url {
        &self.status_url
    }

    /// Perform one request and return the response body untouched.
    ///
    /// Non-2xx responses become [`Error::Http`]; the body is not inspected.
    pub async fn fetch_raw(&self) -> Result<String, Error> {
        debug!(url = %self.status_url, "GET status");

        let resp = self
            .http
            .get(self.status_url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: payload::clip(&body),
            });
        }

        Ok(body)
    }

    /// Perform one request and decode the body.
    pub async fn fetch(&self) -> Result<Inbound, Error> {
        let body = self.fetch_raw().await?;
        payload::parse(&body)
    }
}
