use crate::error::IngestError;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Resolves a source reference (http(s) URL or local path) to a local
    /// file, downloading it if remote.
    async fn fetch(&self, source_ref: &str) -> Result<PathBuf, IngestError>;
}

/// Downloads remote documents into per-session folders under `root`; local
/// paths are verified and passed through. Session folders are reaped later
/// by the sweeper.
pub struct HttpDocumentSource {
    root: PathBuf,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn download(&self, url: &Url) -> Result<PathBuf, IngestError> {
        let folder = self.root.join(session_folder_name());
        tokio::fs::create_dir_all(&folder).await?;
        let local_path = folder.join(safe_file_name(url.as_str()));

        tracing::info!(%url, path = %local_path.display(), "downloading document");
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::Fetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(&local_path, &bytes).await?;

        Ok(local_path)
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, source_ref: &str) -> Result<PathBuf, IngestError> {
        match Url::parse(source_ref) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                self.download(&url).await
            }
            _ => {
                let path = Path::new(source_ref);
                if tokio::fs::try_exists(path).await? {
                    Ok(path.to_path_buf())
                } else {
                    Err(IngestError::Fetch(format!(
                        "no document at {}",
                        path.display()
                    )))
                }
            }
        }
    }
}

fn session_folder_name() -> String {
    let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("session_{}_{}", Utc::now().timestamp(), short_id)
}

/// Collapses everything but alphanumerics to underscores and caps the
/// length, so arbitrary URLs become safe file names.
fn safe_file_name(source_ref: &str) -> String {
    let mut name = String::new();
    let mut last_was_underscore = false;

    for ch in source_ref.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore {
            name.push('_');
            last_was_underscore = true;
        }
        if name.chars().count() >= 50 {
            break;
        }
    }

    format!("{name}.pdf")
}
