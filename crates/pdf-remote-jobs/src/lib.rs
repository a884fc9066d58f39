//! # pdf-remote-jobs
//!
//! Client side of an outsourced PDF conversion service: upload a document,
//! start a job, poll until it finishes, download the result.
//!
//! ## How it works
//!
//! 1. [`JobClient::submit`] uploads the bytes as an asset and creates a job
//!    for the requested [`Operation`], returning its [`JobId`].
//! 2. [`JobClient::poll`] reports [`JobStatus::Pending`], [`JobStatus::Done`]
//!    (with the result bytes) or [`JobStatus::Failed`].
//! 3. [`convert_via_remote`] drives both with a fixed [`PollPolicy`]. Once
//!    the attempt ceiling is exceeded it returns [`RemoteError::Timeout`].
//!    A timeout is terminal: nothing here retries it.
//!
//! The trait exists so the pipeline can be exercised without a network; the
//! shipped implementation is [`HttpJobClient`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdf_remote_jobs::{convert_via_remote, HttpJobClient, Operation, PollPolicy};
//! use std::time::Duration;
//!
//! # async fn run(pdf: Vec<u8>) -> Result<(), pdf_remote_jobs::RemoteError> {
//! let client = HttpJobClient::new("https://pdf-services.example.com", Duration::from_secs(60))?
//!     .with_token("access-token");
//! let policy = PollPolicy::from_max_wait(Duration::from_secs(300), Duration::from_secs(10));
//! let docx = convert_via_remote(&client, &pdf, &Operation::PdfToWord, policy).await?;
//! # let _ = docx;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Public constants ─────────────────────────────────────────────────────────

/// Default delay between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default attempt ceiling: 30 polls at 10 s is five minutes.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by remote conversion calls.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Building the HTTP client or sending a request failed.
    #[error("Remote request failed: {0}")]
    Http(String),

    /// The service answered with an unexpected status code.
    #[error("Remote service rejected {step}: HTTP {status}")]
    Rejected { step: &'static str, status: u16 },

    /// The service answered with a body we could not interpret.
    #[error("Malformed response during {step}: {detail}")]
    Malformed { step: &'static str, detail: String },

    /// The job itself reported failure.
    #[error("Remote job {job} failed: {reason}")]
    JobFailed { job: String, reason: String },

    /// The job was still pending after the last permitted poll.
    #[error("Remote job {job} still pending after {attempts} polls ({waited_secs}s)")]
    Timeout {
        job: String,
        attempts: u32,
        waited_secs: u64,
    },
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Http(e.to_string())
    }
}

// ── Domain types ─────────────────────────────────────────────────────────────

/// Opaque identifier handed back by [`JobClient::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done(Vec<u8>),
    Failed(String),
}

/// Conversion requested from the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Server-side compression at `low`, `medium` or `high`.
    CompressPdf { level: String },
    PdfToWord,
    PdfToExcel,
    /// Any other operation path the service understands.
    Custom(String),
}

impl Operation {
    /// Path segment under `/operation/`.
    pub fn path(&self) -> &str {
        match self {
            Operation::CompressPdf { .. } => "compress-pdf",
            Operation::PdfToWord => "pdf-to-word",
            Operation::PdfToExcel => "pdf-to-excel",
            Operation::Custom(p) => p,
        }
    }

    fn target_format(&self) -> &str {
        match self {
            Operation::CompressPdf { .. } | Operation::Custom(_) => "pdf",
            Operation::PdfToWord => "docx",
            Operation::PdfToExcel => "xlsx",
        }
    }
}

/// Fixed-interval polling with a hard attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    /// Derive the attempt ceiling from a total wait budget.
    ///
    /// Always allows at least one poll.
    pub fn from_max_wait(max_wait: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = max_wait.as_millis().div_ceil(interval_ms).max(1);
        Self {
            interval,
            max_attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        }
    }
}

// ── Client trait ─────────────────────────────────────────────────────────────

/// A remote conversion backend.
///
/// Implementations must be usable from any Tokio worker, hence the `Send`
/// bounds on the returned futures.
pub trait JobClient: Send + Sync {
    /// Upload `bytes` and start `operation` on them.
    fn submit(
        &self,
        bytes: &[u8],
        operation: &Operation,
    ) -> impl Future<Output = Result<JobId, RemoteError>> + Send;

    /// Query the job once.
    fn poll(&self, job: &JobId) -> impl Future<Output = Result<JobStatus, RemoteError>> + Send;
}

/// Submit a job and block (asynchronously) until it completes.
///
/// Polls at `policy.interval`; the first poll happens immediately after
/// submission. Returns [`RemoteError::Timeout`] once `policy.max_attempts`
/// polls have all reported [`JobStatus::Pending`].
pub async fn convert_via_remote<C: JobClient>(
    client: &C,
    bytes: &[u8],
    operation: &Operation,
    policy: PollPolicy,
) -> Result<Vec<u8>, RemoteError> {
    let job = client.submit(bytes, operation).await?;
    info!("Remote job {} submitted ({})", job, operation.path());

    for attempt in 1..=policy.max_attempts {
        match client.poll(&job).await? {
            JobStatus::Done(result) => {
                info!(
                    "Remote job {} done after {} polls ({} bytes)",
                    job,
                    attempt,
                    result.len()
                );
                return Ok(result);
            }
            JobStatus::Failed(reason) => {
                warn!("Remote job {} failed: {}", job, reason);
                return Err(RemoteError::JobFailed {
                    job: job.0.clone(),
                    reason,
                });
            }
            JobStatus::Pending => {
                debug!("Remote job {}: pending ({}/{})", job, attempt, policy.max_attempts);
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }

    let waited = policy.interval * policy.max_attempts.saturating_sub(1);
    Err(RemoteError::Timeout {
        job: job.0,
        attempts: policy.max_attempts,
        waited_secs: waited.as_secs(),
    })
}

// ── HTTP implementation ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AssetResponse {
    #[serde(rename = "assetID")]
    asset_id: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(rename = "jobID")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
    #[serde(default)]
    result: Option<AssetResponse>,
    #[serde(default)]
    error: Option<JobErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JobErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct JobRequest<'a> {
    input: JobInput,
    #[serde(rename = "targetFormat")]
    target_format: &'a str,
    #[serde(rename = "compressionLevel", skip_serializing_if = "Option::is_none")]
    compression_level: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct JobInput {
    href: String,
    #[serde(rename = "type")]
    media_type: &'static str,
}

/// [`JobClient`] speaking the asset/operation/job REST dialect.
///
/// - `POST {base}/assets` with the PDF body → `{"assetID": …}`
/// - `POST {base}/operation/{op}` → `{"jobID": …}`
/// - `GET  {base}/job/{id}` → `{"status": "in progress" | "done" | "failed", …}`
/// - `GET  {base}/assets/{id}` → result bytes
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    api_key: Option<String>,
}

impl HttpJobClient {
    /// Build a client with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            api_key: None,
        })
    }

    /// Bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Value for the `x-api-key` header.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = match self.token {
            Some(ref t) => req.bearer_auth(t),
            None => req,
        };
        match self.api_key {
            Some(ref k) => req.header("x-api-key", k),
            None => req,
        }
    }

    async fn download_asset(&self, asset_id: &str) -> Result<Vec<u8>, RemoteError> {
        let url = format!("{}/assets/{}", self.base_url, asset_id);
        let resp = self.authorize(self.http.get(url)).send().await?;
        if !resp.status().is_success() {
            return Err(RemoteError::Rejected {
                step: "download",
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

impl JobClient for HttpJobClient {
    async fn submit(&self, bytes: &[u8], operation: &Operation) -> Result<JobId, RemoteError> {
        let upload = self
            .authorize(self.http.post(format!("{}/assets", self.base_url)))
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await?;
        if !upload.status().is_success() {
            return Err(RemoteError::Rejected {
                step: "upload",
                status: upload.status().as_u16(),
            });
        }
        let asset: AssetResponse = upload.json().await.map_err(|e| RemoteError::Malformed {
            step: "upload",
            detail: e.to_string(),
        })?;

        let level = match operation {
            Operation::CompressPdf { level } => Some(level.as_str()),
            _ => None,
        };
        let body = JobRequest {
            input: JobInput {
                href: format!("{}/assets/{}", self.base_url, asset.asset_id),
                media_type: "application/pdf",
            },
            target_format: operation.target_format(),
            compression_level: level,
        };

        let created = self
            .authorize(
                self.http
                    .post(format!("{}/operation/{}", self.base_url, operation.path())),
            )
            .json(&body)
            .send()
            .await?;
        if !created.status().is_success() {
            return Err(RemoteError::Rejected {
                step: "create job",
                status: created.status().as_u16(),
            });
        }
        let job: JobResponse = created.json().await.map_err(|e| RemoteError::Malformed {
            step: "create job",
            detail: e.to_string(),
        })?;
        Ok(JobId(job.job_id))
    }

    async fn poll(&self, job: &JobId) -> Result<JobStatus, RemoteError> {
        let resp = self
            .authorize(self.http.get(format!("{}/job/{}", self.base_url, job)))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RemoteError::Rejected {
                step: "poll",
                status: resp.status().as_u16(),
            });
        }
        let body: JobStatusResponse = resp.json().await.map_err(|e| RemoteError::Malformed {
            step: "poll",
            detail: e.to_string(),
        })?;
        parse_status(body, |asset| async move { self.download_asset(&asset).await }).await
    }
}

async fn parse_status<F, Fut>(body: JobStatusResponse, download: F) -> Result<JobStatus, RemoteError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, RemoteError>>,
{
    match body.status.to_ascii_lowercase().as_str() {
        "done" | "succeeded" => {
            let asset = body.result.ok_or_else(|| RemoteError::Malformed {
                step: "poll",
                detail: "job done without a result asset".to_string(),
            })?;
            Ok(JobStatus::Done(download(asset.asset_id).await?))
        }
        "failed" | "error" => Ok(JobStatus::Failed(
            body.error
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unspecified failure".to_string()),
        )),
        _ => Ok(JobStatus::Pending),
    }
}
