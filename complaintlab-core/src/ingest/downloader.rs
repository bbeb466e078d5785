//! Per-interval download with bounded retry and dead-lettering.
//!
//! A failed attempt (transport error, non-2xx status, or a body that is not a
//! hit array) never aborts the run on its own:
//! - with budget left, the caller sleeps for the wait hint found in the body
//!   (plus padding), the raw body is kept under the dead-letter directory
//!   keyed by the destination file name, and the request is retried with one
//!   less retry;
//! - with the budget exhausted, the request is recorded as failed and the
//!   interval is simply missing from this run.
//!
//! Filesystem errors while writing the records are fatal.

use super::error::IngestError;
use super::payload::{extract_records, parse_wait_hint};
use super::transport::{Sleeper, Transport};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retries per interval when nothing else is configured.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// Added to every parsed wait hint.
pub const BACKOFF_PADDING_SECS: u64 = 2;

/// One interval to fetch. Retrying produces a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub destination_path: PathBuf,
    pub remaining_retries: u32,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination_path: impl Into<PathBuf>, retries: u32) -> Self {
        Self {
            url: url.into(),
            destination_path: destination_path.into(),
            remaining_retries: retries,
        }
    }

    /// The same request with one less retry.
    pub fn retry(&self) -> Self {
        Self {
            remaining_retries: self.remaining_retries.saturating_sub(1),
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> String {
        self.destination_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string())
    }
}

/// Result of [`Downloader::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Records were written to `path`.
    Written {
        path: PathBuf,
        records: usize,
        attempts: u32,
    },
    /// Retry budget exhausted; the request is in the failed list.
    GaveUp { attempts: u32 },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// Why one attempt did not produce records.
struct FailedAttempt {
    reason: String,
    body: Option<Vec<u8>>,
}

enum Attempt {
    Written(usize),
    Failed(FailedAttempt),
}

/// Sequential downloader. Holds the failed-request list for one run.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    dead_letter_dir: PathBuf,
    max_backoff: Option<Duration>,
    failed: Vec<DownloadRequest>,
}

impl Downloader {
    pub fn new(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        dead_letter_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            dead_letter_dir: dead_letter_dir.into(),
            max_backoff: None,
            failed: Vec::new(),
        }
    }

    /// Cap each backoff. Uncapped by default: the wait is always the hint
    /// plus padding.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    /// Requests that exhausted their retries.
    pub fn failed_downloads(&self) -> &[DownloadRequest] {
        &self.failed
    }

    pub fn dead_letter_dir(&self) -> &Path {
        &self.dead_letter_dir
    }

    /// Fetch one interval, retrying until success or an exhausted budget.
    pub fn fetch(&mut self, request: DownloadRequest) -> Result<WriteOutcome, IngestError> {
        let mut request = request;
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(url = %request.url, remaining = request.remaining_retries, "download attempt");

            let failure = match self.attempt(&request)? {
                Attempt::Written(records) => {
                    info!(
                        path = %request.destination_path.display(),
                        records,
                        attempts,
                        "downloaded interval"
                    );
                    return Ok(WriteOutcome::Written {
                        path: request.destination_path,
                        records,
                        attempts,
                    });
                }
                Attempt::Failed(failure) => failure,
            };

            remove_partial(&request.destination_path)?;

            if request.remaining_retries == 0 {
                warn!(
                    url = %request.url,
                    reason = %failure.reason,
                    attempts,
                    "giving up on interval"
                );
                self.failed.push(request);
                return Ok(WriteOutcome::GaveUp { attempts });
            }

            warn!(
                reason = %failure.reason,
                remaining = request.remaining_retries,
                "download failed, retrying"
            );

            if let Some(hint) = failure.body.as_deref().and_then(parse_wait_hint) {
                let mut wait = Duration::from_secs(hint.saturating_add(BACKOFF_PADDING_SECS));
                if let Some(cap) = self.max_backoff {
                    wait = wait.min(cap);
                }
                debug!(seconds = wait.as_secs(), "backing off");
                self.sleeper.sleep(wait);
            }

            self.dead_letter(&request, &failure)?;
            request = request.retry();
        }
    }

    fn attempt(&self, request: &DownloadRequest) -> Result<Attempt, IngestError> {
        let response = match self.transport.get(&request.url) {
            Ok(response) => response,
            Err(IngestError::Network { reason, .. }) => {
                return Ok(Attempt::Failed(FailedAttempt { reason, body: None }))
            }
            Err(other) => return Err(other),
        };

        if !response.is_success() {
            return Ok(Attempt::Failed(FailedAttempt {
                reason: format!("HTTP {}", response.status),
                body: Some(response.body),
            }));
        }

        match extract_records(&response.body) {
            Ok(records) => {
                write_records(&request.destination_path, &records)?;
                Ok(Attempt::Written(records.len()))
            }
            Err(e) => Ok(Attempt::Failed(FailedAttempt {
                reason: e.to_string(),
                body: Some(response.body),
            })),
        }
    }

    /// Keep the raw failed body for inspection under the destination file
    /// name. A later failure of the same request overwrites it.
    fn dead_letter(
        &self,
        request: &DownloadRequest,
        failure: &FailedAttempt,
    ) -> Result<(), IngestError> {
        fs::create_dir_all(&self.dead_letter_dir).map_err(IngestError::fs(format!(
            "creating dead-letter dir {}",
            self.dead_letter_dir.display()
        )))?;

        let path = self.dead_letter_dir.join(request.file_name());
        let content = match &failure.body {
            Some(body) => body.clone(),
            None => failure.reason.clone().into_bytes(),
        };
        fs::write(&path, content)
            .map_err(IngestError::fs(format!("writing dead letter {}", path.display())))
    }
}

fn write_records(path: &Path, records: &[serde_json::Value]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(IngestError::fs(format!("creating {}", parent.display())))?;
    }

    let result = fs::File::create(path)
        .map_err(IngestError::fs(format!("creating {}", path.display())))
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, records).map_err(|e| IngestError::Filesystem {
                context: format!("writing {}", path.display()),
                source: e.into(),
            })?;
            writer
                .flush()
                .map_err(IngestError::fs(format!("flushing {}", path.display())))
        });

    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

fn remove_partial(path: &Path) -> Result<(), IngestError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IngestError::Filesystem {
            context: format!("removing partial download {}", path.display()),
            source: e,
        }),
    }
}
