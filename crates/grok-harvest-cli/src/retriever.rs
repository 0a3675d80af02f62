use anyhow::{anyhow, Result};
use async_trait::async_trait;
use grok_harvest_core::{RetrievalOutcome, Retriever};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Downloads assets over HTTP into a local directory.
pub struct HttpRetriever {
    client: Client,
    output_dir: PathBuf,
}

impl HttpRetriever {
    pub fn new(output_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            output_dir: output_dir.into(),
        })
    }

    /// Where `suggested_name` lands. Directory components are stripped.
    pub fn target_path(&self, suggested_name: &str) -> Result<PathBuf> {
        let name = Path::new(suggested_name)
            .file_name()
            .ok_or_else(|| anyhow!("unusable file name {:?}", suggested_name))?;
        Ok(self.output_dir.join(name))
    }

    async fn fetch(&self, url: &str, suggested_name: &str) -> Result<PathBuf> {
        let target = self.target_path(suggested_name)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&target, &body).await?;
        debug!("Wrote {} bytes to {}", body.len(), target.display());
        Ok(target)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, url: &str, suggested_name: &str) -> RetrievalOutcome {
        match self.fetch(url, suggested_name).await {
            Ok(_) => RetrievalOutcome::Success,
            Err(e) => {
                let timed_out = e
                    .downcast_ref::<reqwest::Error>()
                    .is_some_and(reqwest::Error::is_timeout);
                if timed_out {
                    RetrievalOutcome::Timeout
                } else {
                    RetrievalOutcome::Error(e.to_string())
                }
            }
        }
    }
}
