//! Transport and sleep seams for the downloader.
//!
//! The downloader only talks to these traits, so tests can script responses
//! and record backoff without touching the network or the clock.

use super::error::IngestError;
use std::time::Duration;

/// Raw HTTP answer: status code plus the undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one GET per call. Implementations report transport failures as
/// `IngestError::Network`; any status code is returned as a response.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, url: &str) -> Result<RawResponse, IngestError>;
}

/// Blocks the calling thread between retries.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Production sleeper.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
