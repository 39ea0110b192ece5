use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SpinnakerError;

/// Tracks upload submissions on the storage service's submission server.
pub trait SubmissionClient {
    /// Opens a new submission and returns its id.
    fn create_submission(&self) -> Result<String, SpinnakerError>;
    fn put_receipt(&self, submission_id: &str, receipt: &str) -> Result<(), SpinnakerError>;
}

#[derive(Debug, Deserialize)]
struct CreatedSubmission {
    submission: SubmissionRef,
}

#[derive(Debug, Deserialize)]
struct SubmissionRef {
    id: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ReceiptBody<'a> {
    receipt: &'a str,
}

#[derive(Clone)]
pub struct HttpSubmissionClient {
    client: Client,
    base_url: String,
}

impl HttpSubmissionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SpinnakerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("spinnaker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SpinnakerError::SubmissionHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SpinnakerError::SubmissionHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn submissions_url(&self) -> String {
        format!("{}/v0/submissions", self.base_url.trim_end_matches('/'))
    }

    pub fn submission_url(&self, submission_id: &str) -> String {
        format!("{}/{submission_id}", self.submissions_url())
    }

    fn check(response: reqwest::blocking::Response) -> Result<String, SpinnakerError> {
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| SpinnakerError::SubmissionHttp(err.to_string()))?;
        if !status.is_success() {
            return Err(SpinnakerError::SubmissionStatus {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }
}

impl SubmissionClient for HttpSubmissionClient {
    fn create_submission(&self) -> Result<String, SpinnakerError> {
        let response = self
            .client
            .post(self.submissions_url())
            .json(&serde_json::json!({}))
            .send()
            .map_err(|err| SpinnakerError::SubmissionHttp(err.to_string()))?;
        let body = Self::check(response)?;
        let id = parse_submission_id(&body)?;
        info!(submission_id = %id, "created submission");
        Ok(id)
    }

    fn put_receipt(&self, submission_id: &str, receipt: &str) -> Result<(), SpinnakerError> {
        let response = self
            .client
            .put(self.submission_url(submission_id))
            .json(&ReceiptBody { receipt })
            .send()
            .map_err(|err| SpinnakerError::SubmissionHttp(err.to_string()))?;
        Self::check(response)?;
        info!(%submission_id, "updated submission with receipt");
        Ok(())
    }
}

/// Extracts `submission.id`, which the server may send as a number or a string.
pub fn parse_submission_id(body: &str) -> Result<String, SpinnakerError> {
    let created: CreatedSubmission = serde_json::from_str(body)
        .map_err(|err| SpinnakerError::Json(format!("submission response: {err}")))?;
    match created.submission.id {
        serde_json::Value::String(id) => Ok(id),
        serde_json::Value::Number(id) => Ok(id.to_string()),
        other => Err(SpinnakerError::Json(format!(
            "unexpected submission id {other}"
        ))),
    }
}
