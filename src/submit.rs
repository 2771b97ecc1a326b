//! Solution submission.
//!
//! A submit is advisory: every outcome comes back as a [`SubmitOutcome`] and
//! the mining loop logs it and moves on.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::error_handling::SubmissionError;
use crate::types::{SubmitOutcome, Submission};

#[async_trait]
pub trait Submitter: Send {
    async fn submit(&mut self, submission: &Submission) -> SubmitOutcome;
}

pub fn from_config(config: &Config) -> Result<Box<dyn Submitter>, SubmissionError> {
    if config.dry_run {
        return Ok(Box::new(DryRunSubmitter::default()));
    }
    Ok(Box::new(HttpSubmitter::new(config)?))
}

/// `POST {coordinator}{submit_path}` with `{wallet, nonce, hash}`.
pub struct HttpSubmitter {
    client: reqwest::Client,
    url: String,
}

impl HttpSubmitter {
    pub fn new(config: &Config) -> Result<Self, SubmissionError> {
        let client = reqwest::Client::builder().timeout(config.get_http_timeout()).build()?;
        Ok(Self { client, url: config.submit_url() })
    }

    async fn post(&self, submission: &Submission) -> Result<SubmitOutcome, SubmissionError> {
        let resp = self.client.post(&self.url).json(submission).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(SubmitOutcome::Accepted);
        }
        let body = resp.text().await.unwrap_or_default();
        Ok(SubmitOutcome::Rejected { status: status.as_u16(), body })
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&mut self, submission: &Submission) -> SubmitOutcome {
        match self.post(submission).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    nonce = submission.nonce,
                    work_id = %submission.work_id,
                    error = %e,
                    "Submit failed"
                );
                SubmitOutcome::NetworkError(e.to_string())
            }
        }
    }
}

/// Logs the solution instead of sending it. Nothing is retained beyond a count.
#[derive(Default)]
pub struct DryRunSubmitter {
    submitted: u64,
}

impl DryRunSubmitter {
    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}

#[async_trait]
impl Submitter for DryRunSubmitter {
    async fn submit(&mut self, submission: &Submission) -> SubmitOutcome {
        info!(
            nonce = submission.nonce,
            work_id = %submission.work_id,
            hash = %submission.hash,
            "Dry run, solution not sent"
        );
        self.submitted += 1;
        SubmitOutcome::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve_once, serve_unreachable};
    use crate::types::HashResult;

    fn submission() -> Submission {
        let found = HashResult { nonce: 99, digest: [0x0f; 32] };
        Submission::new("LocalWallet123", "local_slot", &found)
    }

    fn submitter_for(base: &str) -> HttpSubmitter {
        HttpSubmitter::new(&Config { coordinator_url: base.to_string(), ..Config::default() })
            .unwrap()
    }

    #[tokio::test]
    async fn posts_solution_json_to_submit_block() {
        let (base, request) = serve_once("200 OK", "{}").await;
        let outcome = submitter_for(&base).submit(&submission()).await;
        assert_eq!(outcome, SubmitOutcome::Accepted);

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /submit_block "));
        let body = &raw[raw.find("\r\n\r\n").unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["wallet"], "LocalWallet123");
        assert_eq!(json["nonce"], 99);
        assert_eq!(json["hash"], "0f".repeat(32));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (base, _) = serve_once("409 Conflict", "stale work").await;
        let outcome = submitter_for(&base).submit(&submission()).await;
        assert_eq!(outcome, SubmitOutcome::Rejected { status: 409, body: "stale work".into() });
    }

    #[tokio::test]
    async fn connection_failure_is_a_network_error() {
        let base = serve_unreachable().await;
        let outcome = submitter_for(&base).submit(&submission()).await;
        assert!(matches!(outcome, SubmitOutcome::NetworkError(_)));
    }

    #[tokio::test]
    async fn dry_run_counts_without_keeping_solutions() {
        let mut dry = DryRunSubmitter::default();
        for _ in 0..10_000 {
            assert_eq!(dry.submit(&submission()).await, SubmitOutcome::Accepted);
        }
        assert_eq!(dry.submitted(), 10_000);
        assert_eq!(std::mem::size_of::<DryRunSubmitter>(), std::mem::size_of::<u64>());
    }
}
