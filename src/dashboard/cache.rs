use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::debug;

/// One loaded dataset, reloaded once it is older than `ttl`.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    slot: Option<(Instant, V)>,
    hits: u64,
    misses: u64,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None, hits: 0, misses: 0 }
    }

    /// The cached value, or the result of `load` when missing or expired.
    /// A failed load leaves the previous entry untouched.
    pub fn get_or_load<F>(&mut self, load: F) -> Result<&V>
    where
        F: FnOnce() -> Result<V>,
    {
        self.get_or_load_at(Instant::now(), load)
    }

    fn get_or_load_at<F>(&mut self, now: Instant, load: F) -> Result<&V>
    where
        F: FnOnce() -> Result<V>,
    {
        let fresh = matches!(&self.slot, Some((at, _)) if now.saturating_duration_since(*at) < self.ttl);
        if fresh {
            self.hits += 1;
        } else {
            self.misses += 1;
            debug!("cache miss, loading");
            let v = load()?;
            self.slot = Some((now, v));
        }
        match &self.slot {
            Some((_, v)) => Ok(v),
            None => bail!("cache slot empty after load"),
        }
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// `(hits, misses)`
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_until_expired() {
        let mut cache = TtlCache::new(utils::HOUR);
        let start = Instant::now();
        assert_eq!(*cache.get_or_load_at(start, || Ok(1)).unwrap(), 1);
        assert_eq!(*cache.get_or_load_at(start + utils::MINUTE, || Ok(2)).unwrap(), 1);
        assert_eq!(*cache.get_or_load_at(start + utils::HOUR, || Ok(3)).unwrap(), 3);
        assert_eq!(cache.stats(), (1, 2));
    }

    #[test]
    fn expired_entry_reloads_after_failure() {
        let mut cache = TtlCache::new(utils::MINUTE);
        let start = Instant::now();
        assert_eq!(*cache.get_or_load_at(start, || Ok(1)).unwrap(), 1);
        assert!(cache.get_or_load_at(start + utils::HOUR, || bail!("down")).is_err());
        assert_eq!(*cache.get_or_load_at(start + utils::HOUR, || Ok(2)).unwrap(), 2);
        assert_eq!(cache.stats(), (0, 3));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let mut cache = TtlCache::<u32>::new(utils::HOUR);
        assert!(cache.get_or_load(|| bail!("down")).is_err());
        assert_eq!(*cache.get_or_load(|| Ok(7)).unwrap(), 7);
        cache.invalidate();
        assert_eq!(*cache.get_or_load(|| Ok(8)).unwrap(), 8);
    }
}
