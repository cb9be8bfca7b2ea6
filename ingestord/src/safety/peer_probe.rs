//! Peer transfer probe: is a download from the P2P daemon still active for
//! this artist?
//!
//! On total failure this probe reports `busy`, not `idle` — the only one of
//! the three safety probes with that asymmetry, because racing a download
//! in progress risks moving a half-written file.

use super::fuzzy::{fuzzy_match, tokenize};
use serde::Deserialize;
use std::time::Duration;

const ACTIVE_STATE_SUBSTRINGS: &[&str] = &["requested", "initializing", "in-progress", "queued"];

#[derive(Debug, Clone)]
pub struct PeerProbeConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DaemonUser {
    #[serde(default)]
    directories: Vec<DaemonDirectory>,
}

#[derive(Debug, Deserialize)]
struct DaemonDirectory {
    #[serde(default)]
    files: Vec<DaemonFile>,
}

#[derive(Debug, Deserialize)]
struct DaemonFile {
    state: String,
    filename: String,
}

pub struct PeerProbe {
    client: reqwest::Client,
    config: PeerProbeConfig,
}

impl PeerProbe {
    pub fn new(config: PeerProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { client, config }
    }

    /// Fetch the current set of filenames in a non-terminal transfer state.
    ///
    /// Returns `None` on total failure (connection error, timeout, or
    /// malformed response after retries are exhausted) so callers can apply
    /// the conservative "treat as busy" policy.
    pub async fn active_transfer_filenames(&self) -> Option<Vec<String>> {
        let url = format!("{}/api/v0/transfers/downloads", self.config.base_url);
        let backoff = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(2))
            .with_max_interval(Duration::from_secs(8))
            .with_max_elapsed_time(Some(Duration::from_secs(2 + 4 + 8)))
            .build();

        let result = backoff::future::retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .header("X-API-Key", &self.config.api_key)
                .send()
                .await
                .map_err(backoff::Error::transient)?;

            if !response.status().is_success() {
                return Err(backoff::Error::transient(anyhow::anyhow!(
                    "peer daemon returned status {}",
                    response.status()
                )));
            }

            response
                .json::<Vec<DaemonUser>>()
                .await
                .map_err(|e| backoff::Error::transient(anyhow::anyhow!(e)))
        })
        .await;

        match result {
            Ok(users) => Some(
                users
                    .into_iter()
                    .flat_map(|u| u.directories)
                    .flat_map(|d| d.files)
                    .filter(|f| is_active_state(&f.state))
                    .map(|f| f.filename)
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "peer transfer probe exhausted retries, treating as busy");
                None
            }
        }
    }

    /// Is `artist_folder_name` referenced by any currently active transfer?
    pub async fn is_artist_busy(&self, artist_folder_name: &str) -> bool {
        match self.active_transfer_filenames().await {
            None => true, // total failure: conservative busy
            Some(active) => {
                let folder_tokens = tokenize(artist_folder_name);
                active
                    .iter()
                    .any(|path| fuzzy_match(&folder_tokens, &tokenize(path)))
            }
        }
    }
}

fn is_active_state(state: &str) -> bool {
    let lowered = state.to_lowercase();
    ACTIVE_STATE_SUBSTRINGS
        .iter()
        .any(|needle| lowered.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_state_matching_is_substring_and_case_insensitive() {
        assert!(is_active_state("InProgress"));
        assert!(is_active_state("Queued"));
        assert!(!is_active_state("Completed"));
    }
}
