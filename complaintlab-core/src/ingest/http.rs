//! reqwest-backed transport for the complaints search API.

use super::error::IngestError;
use super::transport::{RawResponse, Transport};
use reqwest::header::USER_AGENT;
use std::time::Duration;

/// Public endpoint; `<fromdate>` and `<todate>` are substituted per interval.
pub const COMPLAINTS_API_URL: &str =
    "https://www.consumerfinance.gov/data-research/consumer-complaints/search/api/v1/\
     ?date_received_max=<todate>&date_received_min=<fromdate>\
     &field=all&format=json";

/// Blocking HTTP transport. Each request carries its own random id in the
/// User-Agent so the API does not fold consecutive calls together.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn user_agent() -> String {
        format!("complaintlab-bot/{:032x}", rand::random::<u128>())
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "consumer_complaints_api"
    }

    fn get(&self, url: &str) -> Result<RawResponse, IngestError> {
        let network = |e: reqwest::Error| IngestError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, Self::user_agent())
            .send()
            .map_err(network)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().map_err(network)?.to_vec();

        Ok(RawResponse { status, body })
    }
}
