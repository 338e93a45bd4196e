//! Adaptive growth counters.
//!
//! Hot evictions (evicting a page that was hit while resident) signal that
//! the working set does not fit. Every `threshold` hot evictions the pool
//! grows by `multiplier` pages; every `threshold` growths the multiplier
//! itself grows by one.

/// Counters driving pool expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmpState {
    pub expansion_counter: usize,
    pub expansion_multiplier: usize,
    pub expansion_events: usize,
    threshold: usize,
}

impl AmpState {
    pub fn new(threshold: usize) -> Self {
        Self {
            expansion_counter: 0,
            expansion_multiplier: 1,
            expansion_events: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Counts one hot eviction. Returns the pages to add when the threshold
    /// is reached; the counter restarts either way.
    pub fn record_hot_eviction(&mut self) -> Option<usize> {
        self.expansion_counter += 1;
        if self.expansion_counter < self.threshold {
            return None;
        }
        self.expansion_counter = 0;
        Some(self.expansion_multiplier)
    }

    /// Counts one completed expansion.
    pub fn record_expansion(&mut self) {
        self.expansion_events += 1;
        if self.expansion_events >= self.threshold {
            self.expansion_multiplier += 1;
            self.expansion_events = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_triggers_every_threshold_hot_evictions() {
        let mut amp = AmpState::new(3);
        assert_eq!(amp.record_hot_eviction(), None);
        assert_eq!(amp.record_hot_eviction(), None);
        assert_eq!(amp.record_hot_eviction(), Some(1));
        assert_eq!(amp.expansion_counter, 0);
        assert_eq!(amp.record_hot_eviction(), None);
    }

    #[test]
    fn multiplier_grows_every_threshold_expansions() {
        let mut amp = AmpState::new(2);
        amp.record_expansion();
        assert_eq!(amp.expansion_multiplier, 1);
        amp.record_expansion();
        assert_eq!(amp.expansion_multiplier, 2);
        assert_eq!(amp.expansion_events, 0);

        amp.record_hot_eviction();
        assert_eq!(amp.record_hot_eviction(), Some(2));
    }

    #[test]
    fn zero_threshold_is_treated_as_one() {
        let mut amp = AmpState::new(0);
        assert_eq!(amp.threshold(), 1);
        assert_eq!(amp.record_hot_eviction(), Some(1));
    }
}
