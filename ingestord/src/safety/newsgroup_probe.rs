//! Newsgroup queue probe: is the Usenet downloader still processing this
//! artist's folder?
//!
//! Unlike the peer transfer probe, a total failure here is reported as
//! `idle` — the newsgroup daemon is not the one racing a half-written file
//! the way an in-progress P2P transfer is.

use serde::Deserialize;
use std::time::Duration;

const ACTIVE_STATUSES: &[&str] = &[
    "downloading",
    "verifying",
    "repairing",
    "extracting",
    "moving",
    "running",
];

#[derive(Debug, Clone)]
pub struct NewsgroupProbeConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    queue: Queue,
}

#[derive(Debug, Deserialize)]
struct Queue {
    #[serde(default)]
    slots: Vec<Slot>,
}

#[derive(Debug, Deserialize)]
struct Slot {
    status: String,
    #[serde(default)]
    storage: String,
    #[serde(default)]
    filename: String,
}

pub struct NewsgroupProbe {
    client: reqwest::Client,
    config: NewsgroupProbeConfig,
}

impl NewsgroupProbe {
    pub fn new(config: NewsgroupProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { client, config }
    }

    /// Is `artist_folder_name` referenced by a slot currently in an active
    /// (non-terminal, post-processing) status?
    ///
    /// Any failure (connection, timeout, decode) reports `idle` so a single
    /// probe outage does not permanently stall the pipeline.
    pub async fn is_artist_busy(&self, artist_folder_name: &str) -> bool {
        let url = format!(
            "{}/api?mode=queue&output=json&apikey={}",
            self.config.base_url, self.config.api_key
        );

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "newsgroup probe unreachable, treating as idle");
                return false;
            }
        };

        let parsed: QueueResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "newsgroup probe returned unparsable response, treating as idle");
                return false;
            }
        };

        let needle = artist_folder_name.to_lowercase();
        parsed.queue.slots.iter().any(|slot| {
            ACTIVE_STATUSES.contains(&slot.status.to_lowercase().as_str())
                && (path_contains_component(&slot.storage, &needle)
                    || slot.filename.to_lowercase().contains(&needle))
        })
    }
}

fn path_contains_component(path: &str, needle_lower: &str) -> bool {
    std::path::Path::new(path)
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(|component| component.to_lowercase() == *needle_lower)
}
