use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::driver::{TagDriver, TagId};
use crate::error::TagError;

/// Timing of the discovery poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Overall window for a tag to show up.
    pub timeout: Duration,
    /// How long a single reader poll may wait.
    pub poll_timeout: Duration,
    /// Pause between polls.
    pub poll_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl DiscoveryConfig {
    /// Upper bound on poll attempts within one window.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.poll_interval.as_nanos().max(1);
        let attempts = self.timeout.as_nanos().div_ceil(interval) + 1;
        attempts.min(u32::MAX as u128) as u32
    }
}

/// Poll the reader until a tag answers or the window closes.
///
/// Never reports `Timeout` before `config.timeout` has elapsed. A reader
/// error on one attempt counts as "no tag"; if the window closes right after
/// such an error, that error is returned instead of `Timeout`.
pub async fn discover(
    driver: &mut dyn TagDriver,
    config: &DiscoveryConfig,
    cancel: &CancellationToken,
) -> Result<TagId, TagError> {
    let deadline = Instant::now() + config.timeout;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts() {
        // blocks the worker for up to `poll_timeout`; the reader is exclusive
        // to this request for the whole exchange anyway
        match driver.discover_tag(config.poll_timeout) {
            Ok(Some(uid)) => {
                info!(%uid, attempt, "found NFC tag");
                return Ok(uid);
            }
            Ok(None) => {
                debug!(attempt, "no tag yet");
                last_error = None;
            }
            Err(err) => {
                warn!(attempt, "reader poll failed: {err:#}");
                last_error = Some(err);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let pause = config.poll_interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(TagError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
    }

    // the attempt cap can only run out early if the clock stalls
    let now = Instant::now();
    if now < deadline {
        tokio::select! {
            _ = cancel.cancelled() => return Err(TagError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {}
        }
    }

    match last_error {
        Some(err) => Err(TagError::Reader(err)),
        None => {
            info!(timeout = ?config.timeout, "no tag found");
            Err(TagError::Timeout(config.timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfc::memory::MemoryTag;

    fn config() -> DiscoveryConfig {
        DiscoveryConfig::default()
    }

    #[test]
    fn attempts_follow_interval() {
        assert_eq!(config().max_attempts(), 101);
        let coarse = DiscoveryConfig {
            timeout: Duration::from_millis(250),
            poll_interval: Duration::from_millis(100),
            ..config()
        };
        assert_eq!(coarse.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn finds_present_tag_immediately() {
        let tag = MemoryTag::new().with_uid(vec![0xAA, 0xBB]);
        let mut driver = tag.clone();
        let start = Instant::now();
        let uid = discover(&mut driver, &config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(uid.to_hex(), "AABB");
        assert_eq!(tag.polls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_late_tag() {
        let tag = MemoryTag::new();
        tag.appear_after(3);
        let mut driver = tag.clone();
        let start = Instant::now();
        discover(&mut driver, &config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tag.polls(), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_full_window() {
        let tag = MemoryTag::new();
        tag.set_present(false);
        let mut driver = tag.clone();
        let start = Instant::now();
        let err = discover(&mut driver, &config(), &CancellationToken::new())
            .await
            .unwrap_err();
        let elapsed = start.elapsed();
        assert!(matches!(err, TagError::Timeout(t) if t == Duration::from_secs(10)));
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10) + config().poll_interval, "{elapsed:?}");
        assert_eq!(tag.polls(), 101);
    }

    #[tokio::test(start_paused = true)]
    async fn uneven_window_is_not_cut_short() {
        let tag = MemoryTag::new();
        tag.set_present(false);
        let mut driver = tag.clone();
        let config = DiscoveryConfig {
            timeout: Duration::from_millis(250),
            ..config()
        };
        let start = Instant::now();
        let err = discover(&mut driver, &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::Timeout(_)));
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn reader_fault_surfaces_after_window() {
        let tag = MemoryTag::new();
        tag.fail_polls(true);
        let mut driver = tag.clone();
        let start = Instant::now();
        let err = discover(&mut driver, &config(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::Reader(_)));
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let tag = MemoryTag::new();
        tag.set_present(false);
        let mut driver = tag.clone();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        let err = discover(&mut driver, &config(), &cancel).await.unwrap_err();
        assert!(matches!(err, TagError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
