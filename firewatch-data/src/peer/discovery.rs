//! Candidate discovery: manual list, address-range probing, and service
//! announcements, run concurrently and merged into one ranked set.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use firewatch_core::{PeerEndpoint, merge_candidates};
use futures_util::future::join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::probe::PeerProbe;

/// Priority offset for candidates found by address-range probing.
pub const RANGE_PRIORITY: u32 = 10;

/// Priority offset for candidates found through announcements.
pub const ANNOUNCED_PRIORITY: u32 = 20;

/// Bounded set of addresses to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    /// Host names or addresses.
    pub hosts: Vec<String>,
    /// Ports tried on every host.
    pub ports: Vec<u16>,
    /// URL scheme, usually `http`.
    pub scheme: String,
}

impl ScanRange {
    /// Hosts `{prefix}.{first}` through `{prefix}.{last}` on `ports`.
    ///
    /// # Examples
    ///
    /// ```
    /// use firewatch_data::ScanRange;
    ///
    /// let range = ScanRange::from_prefix("192.168.1", 10, 12, vec![8080]);
    /// assert_eq!(range.urls(), vec![
    ///     "http://192.168.1.10:8080",
    ///     "http://192.168.1.11:8080",
    ///     "http://192.168.1.12:8080",
    /// ]);
    /// ```
    #[must_use]
    pub fn from_prefix(prefix: &str, first: u8, last: u8, ports: Vec<u16>) -> Self {
        Self {
            hosts: (first..=last).map(|n| format!("{prefix}.{n}")).collect(),
            ports,
            scheme: "http".to_owned(),
        }
    }

    /// Every candidate base URL, host-major.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.hosts
            .iter()
            .flat_map(|host| {
                self.ports
                    .iter()
                    .map(move |port| format!("{}://{host}:{port}", self.scheme))
            })
            .collect()
    }
}

/// Configuration for candidate discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Operator-supplied base URLs, in preference order.
    pub manual: Vec<String>,
    /// Optional address range to probe.
    pub scan: Option<ScanRange>,
    /// Whether to consult the announcement browser.
    pub announcements: bool,
    /// Range batch size, and the cap on probes in flight across every
    /// strategy.
    pub batch_size: usize,
    /// Bound on each health probe.
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            manual: Vec::new(),
            scan: None,
            announcements: true,
            batch_size: 8,
            probe_timeout: Duration::from_secs(2),
        }
    }
}

impl DiscoveryConfig {
    /// Add a manual candidate.
    #[must_use]
    pub fn with_manual(mut self, url: impl Into<String>) -> Self {
        self.manual.push(url.into());
        self
    }

    /// Probe `range`.
    #[must_use]
    pub fn with_scan(mut self, range: ScanRange) -> Self {
        self.scan = Some(range);
        self
    }

    /// Set the probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the per-batch probe count.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Permits bounding concurrent probes.
    pub(crate) fn probe_limit(&self) -> Semaphore {
        Semaphore::new(self.batch_size.max(1))
    }
}

/// Source of peers advertising themselves on the local network.
#[async_trait]
pub trait AnnouncementBrowser: Send + Sync {
    /// Base URLs of peers currently announced.
    async fn browse(&self, timeout: Duration) -> Vec<String>;
}

/// Browser for platforms without a discovery service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnnouncements;

#[async_trait]
impl AnnouncementBrowser for NoAnnouncements {
    async fn browse(&self, _timeout: Duration) -> Vec<String> {
        Vec::new()
    }
}

/// Run every configured strategy concurrently and merge the results.
///
/// Manual candidates are kept whatever their health so the sweep can
/// revalidate them; probed and announced candidates are kept only when
/// they answered.
pub async fn discover(
    config: &DiscoveryConfig,
    probe: &dyn PeerProbe,
    browser: &dyn AnnouncementBrowser,
) -> Vec<PeerEndpoint> {
    let limit = config.probe_limit();
    let (manual, scanned, announced) = tokio::join!(
        probe_manual(config, probe, &limit),
        probe_range(config, probe, &limit),
        probe_announced(config, probe, browser, &limit),
    );
    debug!(
        "discovery found {} manual, {} scanned, {} announced candidates",
        manual.len(),
        scanned.len(),
        announced.len()
    );
    let mut candidates = Vec::new();
    merge_candidates(&mut candidates, manual);
    merge_candidates(&mut candidates, scanned);
    merge_candidates(&mut candidates, announced);
    info!(
        "discovered {} peer candidates, {} healthy",
        candidates.len(),
        candidates.iter().filter(|c| c.healthy).count()
    );
    candidates
}

/// Probe `url` once a permit from `limit` is free and return it as a
/// candidate with the outcome recorded.
pub(crate) async fn check(
    probe: &dyn PeerProbe,
    limit: &Semaphore,
    url: String,
    priority: u32,
    timeout: Duration,
) -> PeerEndpoint {
    // The semaphore is never closed, so a failed acquire cannot happen.
    let _permit = limit.acquire().await.ok();
    let candidate = PeerEndpoint::new(url, priority);
    match probe.health(&candidate.url, timeout).await {
        Ok(elapsed) => candidate.probed_healthy(Utc::now(), elapsed),
        Err(err) => {
            debug!("peer probe failed: {err}");
            candidate.probed_unhealthy(Utc::now())
        }
    }
}

fn rank(offset: u32, index: usize) -> u32 {
    offset.saturating_add(u32::try_from(index).unwrap_or(u32::MAX))
}

async fn probe_manual(
    config: &DiscoveryConfig,
    probe: &dyn PeerProbe,
    limit: &Semaphore,
) -> Vec<PeerEndpoint> {
    join_all(config.manual.iter().enumerate().map(|(index, url)| {
        check(probe, limit, url.clone(), rank(0, index), config.probe_timeout)
    }))
    .await
}

async fn probe_range(
    config: &DiscoveryConfig,
    probe: &dyn PeerProbe,
    limit: &Semaphore,
) -> Vec<PeerEndpoint> {
    let Some(range) = config.scan.as_ref() else {
        return Vec::new();
    };
    let urls = range.urls();
    let mut found = Vec::new();
    let mut offset = 0_usize;
    for batch in urls.chunks(config.batch_size.max(1)) {
        let results = join_all(batch.iter().enumerate().map(|(index, url)| {
            check(
                probe,
                limit,
                url.clone(),
                rank(RANGE_PRIORITY, offset.saturating_add(index)),
                config.probe_timeout,
            )
        }))
        .await;
        offset = offset.saturating_add(batch.len());
        found.extend(results.into_iter().filter(|c| c.healthy));
        if !found.is_empty() {
            debug!("range scan stopped after {offset} of {} addresses", urls.len());
            break;
        }
    }
    found
}

async fn probe_announced(
    config: &DiscoveryConfig,
    probe: &dyn PeerProbe,
    browser: &dyn AnnouncementBrowser,
    limit: &Semaphore,
) -> Vec<PeerEndpoint> {
    if !config.announcements {
        return Vec::new();
    }
    let urls = browser.browse(config.probe_timeout).await;
    join_all(urls.into_iter().enumerate().map(|(index, url)| {
        check(probe, limit, url, rank(ANNOUNCED_PRIORITY, index), config.probe_timeout)
    }))
    .await
    .into_iter()
    .filter(|c| c.healthy)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StaticBrowser, StubProbe};
    use rstest::{fixture, rstest};

    #[fixture]
    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime")
    }

    #[rstest]
    fn strategies_merge_by_url(runtime: tokio::runtime::Runtime) {
        let probe = StubProbe::default()
            .healthy("http://10.0.0.5:8080", "[]")
            .healthy("http://10.0.0.9:8080", "[]");
        let browser = StaticBrowser::new(vec!["http://10.0.0.5:8080".to_owned()]);
        let config = DiscoveryConfig::default()
            .with_manual("http://10.0.0.9:8080")
            .with_scan(ScanRange::from_prefix("10.0.0", 1, 6, vec![8080]));

        let candidates = runtime.block_on(discover(&config, &probe, &browser));

        let ranked: Vec<_> = candidates
            .iter()
            .map(|c| (c.url.as_str(), c.priority))
            .collect();
        assert_eq!(
            ranked,
            vec![("http://10.0.0.9:8080", 0), ("http://10.0.0.5:8080", 14)]
        );
    }

    #[rstest]
    fn range_scan_stops_after_first_hit(runtime: tokio::runtime::Runtime) {
        let probe = StubProbe::default()
            .healthy("http://10.0.0.2:8080", "[]")
            .healthy("http://10.0.0.7:8080", "[]");
        let config = DiscoveryConfig::default()
            .with_scan(ScanRange::from_prefix("10.0.0", 1, 8, vec![8080]))
            .with_batch_size(4);

        let candidates = runtime.block_on(discover(&config, &probe, &NoAnnouncements));

        let urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["http://10.0.0.2:8080"]);
        assert_eq!(probe.health_calls(), 4);
    }

    #[rstest]
    fn probes_share_one_in_flight_cap(runtime: tokio::runtime::Runtime) {
        let manual: Vec<String> = (1..=6).map(|n| format!("http://10.0.1.{n}:8080")).collect();
        let announced: Vec<String> = (1..=6).map(|n| format!("http://10.0.2.{n}:8080")).collect();
        let browser = StaticBrowser::new(announced);
        let config = manual
            .iter()
            .fold(DiscoveryConfig::default(), |config, url| config.with_manual(url.as_str()))
            .with_scan(ScanRange::from_prefix("10.0.0", 1, 6, vec![8080]))
            .with_batch_size(3);
        let probe = StubProbe::default();

        let candidates = runtime.block_on(discover(&config, &probe, &browser));

        assert_eq!(probe.health_calls(), 18);
        assert_eq!(probe.peak_in_flight(), 3);
        assert_eq!(candidates.len(), 6);
    }

    #[rstest]
    fn unhealthy_manual_candidates_are_kept(runtime: tokio::runtime::Runtime) {
        let probe = StubProbe::default();
        let config = DiscoveryConfig::default().with_manual("http://10.0.0.3:8080");

        let candidates = runtime.block_on(discover(&config, &probe, &NoAnnouncements));

        assert_eq!(candidates.len(), 1);
        assert!(candidates.iter().all(|c| !c.healthy && c.last_checked.is_some()));
    }
}
