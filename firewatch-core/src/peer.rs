//! Same-network peer servers and the rules for ranking them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate peer offering the same data contract as the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEndpoint {
    /// Base URL, used as the identity of the candidate.
    pub url: String,
    /// Preference rank; lower numbers are preferred.
    pub priority: u32,
    /// Outcome of the latest health probe.
    pub healthy: bool,
    /// Time of the latest health probe.
    pub last_checked: Option<DateTime<Utc>>,
    /// Round-trip time of the latest successful probe.
    pub response_time: Option<Duration>,
    /// Capabilities advertised by the peer.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl PeerEndpoint {
    /// Construct an unprobed, unhealthy candidate.
    pub fn new(url: impl Into<String>, priority: u32) -> Self {
        Self {
            url: url.into(),
            priority,
            healthy: false,
            last_checked: None,
            response_time: None,
            capabilities: Vec::new(),
        }
    }

    /// Record a successful probe.
    #[must_use]
    pub const fn probed_healthy(mut self, at: DateTime<Utc>, response_time: Duration) -> Self {
        self.healthy = true;
        self.last_checked = Some(at);
        self.response_time = Some(response_time);
        self
    }

    /// Record a failed probe.
    #[must_use]
    pub const fn probed_unhealthy(mut self, at: DateTime<Utc>) -> Self {
        self.healthy = false;
        self.last_checked = Some(at);
        self
    }
}

/// Merge freshly discovered candidates into an existing set.
///
/// Candidates are deduplicated by URL. When both sides name the same URL the
/// record with the lower priority number wins; on equal priority the fresher
/// discovery result replaces the existing one. Candidates absent from
/// `discovered` are kept.
///
/// # Examples
/// ```
/// use firewatch_core::{PeerEndpoint, merge_candidates};
///
/// let mut candidates = vec![PeerEndpoint::new("http://10.0.0.2:8080", 3)];
/// merge_candidates(&mut candidates, vec![PeerEndpoint::new("http://10.0.0.2:8080", 1)]);
/// assert_eq!(candidates.len(), 1);
/// assert_eq!(candidates[0].priority, 1);
/// ```
pub fn merge_candidates(existing: &mut Vec<PeerEndpoint>, discovered: Vec<PeerEndpoint>) {
    for candidate in discovered {
        match existing.iter_mut().find(|e| e.url == candidate.url) {
            Some(current) if candidate.priority <= current.priority => *current = candidate,
            Some(_) => {}
            None => existing.push(candidate),
        }
    }
    existing.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.url.cmp(&b.url)));
}

/// Pick the healthy candidate with the lowest priority number, breaking
/// ties by the lowest measured response time.
#[must_use]
pub fn select_endpoint(candidates: &[PeerEndpoint]) -> Option<&PeerEndpoint> {
    candidates
        .iter()
        .filter(|c| c.healthy)
        .min_by_key(|c| (c.priority, c.response_time.unwrap_or(Duration::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn healthy(url: &str, priority: u32, millis: u64) -> PeerEndpoint {
        PeerEndpoint::new(url, priority)
            .probed_healthy(DateTime::<Utc>::UNIX_EPOCH, Duration::from_millis(millis))
    }

    #[rstest]
    #[case(1, 3)]
    #[case(3, 1)]
    fn duplicate_urls_keep_preferred_priority(#[case] first: u32, #[case] second: u32) {
        let mut candidates = Vec::new();
        merge_candidates(&mut candidates, vec![PeerEndpoint::new("http://a", first)]);
        merge_candidates(&mut candidates, vec![PeerEndpoint::new("http://a", second)]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates.first().map(|c| c.priority), Some(1));
    }

    #[rstest]
    fn merge_keeps_candidates_missing_from_new_results() {
        let mut candidates = vec![PeerEndpoint::new("http://a", 1)];
        merge_candidates(&mut candidates, vec![PeerEndpoint::new("http://b", 2)]);
        let urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a", "http://b"]);
    }

    #[rstest]
    fn selection_prefers_priority_then_latency() {
        let candidates = vec![
            healthy("http://slow", 1, 300),
            healthy("http://fast", 1, 20),
            healthy("http://far", 0, 900).probed_unhealthy(DateTime::<Utc>::UNIX_EPOCH),
            healthy("http://backup", 2, 1),
        ];
        let chosen = select_endpoint(&candidates).expect("a healthy candidate");
        assert_eq!(chosen.url, "http://fast");
    }

    #[rstest]
    fn selection_returns_none_without_healthy_candidates() {
        let candidates = vec![PeerEndpoint::new("http://a", 1)];
        assert!(select_endpoint(&candidates).is_none());
    }
}
