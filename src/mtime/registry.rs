//! Package index lookup of release timestamps
//!
//! Theme files can be dated with the release time of the package version
//! that shipped them instead of the fixed sentinel. Any lookup failure falls
//! back to the sentinel at the call site.

use crate::error::{IncrError, IncrResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Source of package release timestamps
#[async_trait]
pub trait ReleaseRegistry: Send + Sync {
    /// Release time of `name` at `version`
    async fn release_time(&self, name: &str, version: &str) -> IncrResult<DateTime<Utc>>;
}

/// PyPI JSON API client
pub struct PyPiRegistry {
    index_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ReleasePage {
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    upload_time_iso_8601: Option<String>,
}

impl PyPiRegistry {
    /// Create a client for the index at `index_url`
    pub fn new(index_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            index_url: index_url.into(),
            timeout,
        }
    }

    /// URL of the JSON page of one release
    pub fn release_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/json",
            self.index_url.trim_end_matches('/'),
            name,
            version
        )
    }

    fn fetch(url: &str, timeout: Duration) -> Result<String, ureq::Error> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        agent.get(url).call()?.body_mut().read_to_string()
    }
}

#[async_trait]
impl ReleaseRegistry for PyPiRegistry {
    async fn release_time(&self, name: &str, version: &str) -> IncrResult<DateTime<Utc>> {
        let url = self.release_url(name, version);
        debug!("Querying {}", url);

        let timeout = self.timeout;
        let fetch_url = url.clone();
        let body = tokio::task::spawn_blocking(move || Self::fetch(&fetch_url, timeout))
            .await
            .map_err(|e| IncrError::Registry {
                package: name.to_string(),
                reason: e.to_string(),
            })?
            .map_err(|e| IncrError::Registry {
                package: name.to_string(),
                reason: format!("{}: {}", url, e),
            })?;

        earliest_upload(&body)?.ok_or_else(|| IncrError::Registry {
            package: name.to_string(),
            reason: format!("no upload time for version {}", version),
        })
    }
}

/// Earliest upload time among the files of a release page
fn earliest_upload(body: &str) -> IncrResult<Option<DateTime<Utc>>> {
    let page: ReleasePage = serde_json::from_str(body)?;
    Ok(page
        .urls
        .iter()
        .filter_map(|file| file.upload_time_iso_8601.as_deref())
        .filter_map(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .min())
}
