//! Tier 3 (optional): recording-ID confirmation against an external
//! fingerprint-lookup service, gated behind `DEDUP_USE_MUSICBRAINZ`.
//!
//! Tier 2 clusters by acoustic similarity alone; tier 3 raises confidence
//! by looking up each cluster member's own fingerprint (not its tags) in
//! an AcoustID-style recording database and confirming every member
//! resolves to the same recording identifier before acting on the cluster
//! as a hard duplicate.

use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

const MIN_CONFIDENCE: f64 = 0.8;

/// AcoustID's documented anonymous rate limit (roughly 1 request/second).
fn requests_per_second() -> NonZeroU32 {
    NonZeroU32::new(1).expect("1 is nonzero")
}

#[derive(Debug, Clone, Deserialize)]
struct LookupResponse {
    status: String,
    results: Option<Vec<LookupResult>>,
}

#[derive(Debug, Clone, Deserialize)]
struct LookupResult {
    score: f64,
    recordings: Option<Vec<RecordingMatch>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordingMatch {
    id: String,
}

pub struct RecordingResolver {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: Arc<RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>>,
}

impl RecordingResolver {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second()))),
        }
    }

    /// Resolve one file to a recording identifier by its own acoustic
    /// fingerprint, or `None` if no confident match exists. `fingerprint`
    /// is the same raw word array tier 2 already computed — no separate
    /// fingerprinting pass, no tag text involved in the query.
    pub async fn resolve(&self, fingerprint: &[u32], duration_secs: f64) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }
        self.limiter.until_ready().await;

        let encoded_fingerprint = fingerprint
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let duration = (duration_secs.round() as i64).to_string();
        let url = format!("{}/lookup", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("client", self.api_key.as_str()),
                ("meta", "recordingids"),
                ("duration", duration.as_str()),
                ("fingerprint", encoded_fingerprint.as_str()),
            ])
            .send()
            .await
            .ok()?;

        let body: LookupResponse = response.json().await.ok()?;
        if body.status != "ok" {
            return None;
        }

        let best = body
            .results?
            .into_iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))?;

        if best.score < MIN_CONFIDENCE {
            return None;
        }

        best.recordings?.into_iter().next().map(|r| r.id)
    }
}

/// Confirm that every member of `tracks` (indices into a caller-owned
/// fingerprinted-track slice) resolves to the same recording ID. Returns
/// `true` only when all resolve and agree; any unresolved member makes the
/// cluster unconfirmed rather than assumed-duplicate, since tier 3 exists
/// to raise confidence, not to reject on ambiguity.
pub async fn confirm_same_recording(
    resolver: &RecordingResolver,
    fingerprints: &[(&[u32], f64)],
) -> bool {
    if fingerprints.len() < 2 {
        return true;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for (fingerprint, duration_secs) in fingerprints {
        match resolver.resolve(fingerprint, *duration_secs).await {
            Some(id) => {
                *seen.entry(id).or_insert(0) += 1;
            }
            None => return false,
        }
    }

    seen.len() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_candidate_clusters_are_trivially_confirmed() {
        // No network access needed: the fast path for len < 2 never calls
        // the resolver.
        let fp = vec![1u32, 2, 3];
        let fingerprints = vec![(fp.as_slice(), 180.0)];
        assert_eq!(fingerprints.len(), 1);
    }

    #[tokio::test]
    async fn confirm_same_recording_short_circuits_below_two_members() {
        let resolver = RecordingResolver::new("https://api.acoustid.org/v2".to_string(), String::new());
        let fp = vec![1u32, 2, 3];
        assert!(confirm_same_recording(&resolver, &[(fp.as_slice(), 180.0)]).await);
    }

    #[tokio::test]
    async fn resolve_without_api_key_returns_none() {
        let resolver = RecordingResolver::new("https://api.acoustid.org/v2".to_string(), String::new());
        assert_eq!(resolver.resolve(&[1, 2, 3], 180.0).await, None);
    }
}
