//! Work sources.
//!
//! The mining loop pulls a [`WorkDescriptor`] once per epoch through the
//! [`WorkSource`] trait and never learns which variant answered.

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error_handling::WorkFetchError;
use crate::types::{Mode, Target, WorkDescriptor, WorkResponse};

#[async_trait]
pub trait WorkSource: Send {
    async fn fetch(&mut self) -> Result<WorkDescriptor, WorkFetchError>;
}

pub fn from_config(config: &Config) -> Result<Box<dyn WorkSource>, WorkFetchError> {
    Ok(match config.mode {
        Mode::Local => Box::new(LocalWorkSource::default()),
        Mode::Remote => Box::new(RemoteWorkSource::new(config)?),
    })
}

/// `GET {coordinator}{work_path}` returning `{work, poh_hash, target}`.
pub struct RemoteWorkSource {
    client: reqwest::Client,
    url: String,
}

impl RemoteWorkSource {
    pub fn new(config: &Config) -> Result<Self, WorkFetchError> {
        let client = reqwest::Client::builder().timeout(config.get_http_timeout()).build()?;
        Ok(Self { client, url: config.work_url() })
    }
}

#[async_trait]
impl WorkSource for RemoteWorkSource {
    async fn fetch(&mut self) -> Result<WorkDescriptor, WorkFetchError> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WorkFetchError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        let parsed: WorkResponse = serde_json::from_slice(&body)?;
        let work = WorkDescriptor::try_from(parsed)?;
        debug!(work_id = %work.work_id, target = %work.target, "Fetched remote work");
        Ok(work)
    }
}

/// Canned offline work; never touches the network.
pub struct LocalWorkSource {
    work: WorkDescriptor,
}

impl LocalWorkSource {
    pub const WORK_ID: &'static str = "local_slot";
    pub const ANCHOR_HASH: &'static str = "local_poh";
    pub const TARGET: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

    pub fn new(work: WorkDescriptor) -> Self {
        Self { work }
    }
}

impl Default for LocalWorkSource {
    fn default() -> Self {
        Self::new(WorkDescriptor {
            work_id: Self::WORK_ID.to_string(),
            anchor_hash: Self::ANCHOR_HASH.to_string(),
            target: Target::from_prefix(&Self::TARGET),
        })
    }
}

#[async_trait]
impl WorkSource for LocalWorkSource {
    async fn fetch(&mut self) -> Result<WorkDescriptor, WorkFetchError> {
        Ok(self.work.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve_once, serve_unreachable};

    fn config_for(base: &str) -> Config {
        Config { coordinator_url: base.to_string(), ..Config::default() }
    }

    #[tokio::test]
    async fn local_source_returns_canned_work() {
        let mut source = LocalWorkSource::default();
        let w = source.fetch().await.unwrap();
        assert_eq!(w.work_id, "local_slot");
        assert_eq!(w.anchor_hash, "local_poh");
        assert_eq!(w.target.to_string(), "0000ffff");
        assert_eq!(source.fetch().await.unwrap(), w);
    }

    #[tokio::test]
    async fn remote_source_parses_coordinator_body() {
        let (base, request) = serve_once(
            "200 OK",
            r#"{"work":"slot42","poh_hash":"abcd","target":"00ffffff"}"#,
        )
        .await;
        let mut source = RemoteWorkSource::new(&config_for(&base)).unwrap();
        let w = source.fetch().await.unwrap();
        assert_eq!(w.work_id, "slot42");
        assert_eq!(w.anchor_hash, "abcd");
        assert_eq!(w.target.as_bytes(), &[0x00, 0xff, 0xff, 0xff]);
        assert!(request.await.unwrap().starts_with("GET /work "));
    }

    #[tokio::test]
    async fn remote_source_reports_missing_fields() {
        let (base, _) = serve_once("200 OK", r#"{"work":"slot42","target":"ff"}"#).await;
        let mut source = RemoteWorkSource::new(&config_for(&base)).unwrap();
        assert!(matches!(source.fetch().await, Err(WorkFetchError::Parse(_))));
    }

    #[tokio::test]
    async fn remote_source_reports_http_status() {
        let (base, _) = serve_once("503 Service Unavailable", "busy").await;
        let mut source = RemoteWorkSource::new(&config_for(&base)).unwrap();
        assert!(matches!(source.fetch().await, Err(WorkFetchError::Status(503))));
    }

    #[tokio::test]
    async fn remote_source_reports_unreachable_coordinator() {
        let base = serve_unreachable().await;
        let mut source = RemoteWorkSource::new(&config_for(&base)).unwrap();
        assert!(matches!(source.fetch().await, Err(WorkFetchError::Network(_))));
    }
}
