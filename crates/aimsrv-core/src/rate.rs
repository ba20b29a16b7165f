//! Rate-limit governor (`spec.md` §4.11, C11): a per-(class, session)
//! leaky-bucket evaluated lazily on read, the way `warning_level` decays
//! lazily in [`crate::session`].

use std::collections::HashMap;
use std::sync::Mutex;

/// State machine position for a bucket, driven purely by where
/// `current_level` sits relative to the class's thresholds (`spec.md`
/// §4.11 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateState {
    Clear,
    Alert,
    Limited,
    Disconnected,
}

/// Static parameters for one rate class. The table of these is immutable
/// after boot (`spec.md` §5, "process-wide rate-limit class table").
#[derive(Debug, Clone, Copy)]
pub struct RateClass {
    pub id: u16,
    pub window_size_ms: u32,
    pub clear_level: u32,
    pub alert_level: u32,
    pub limit_level: u32,
    pub disconnect_level: u32,
    pub max_level: u32,
    /// Fixed amount a charged SNAC lowers `current_level` by.
    pub decrement: u32,
}

impl RateClass {
    /// `spec.md` §4.11's table: the band between `alert_level` and
    /// `clear_level` is sticky — a bucket already `Clear` stays `Clear`
    /// there, but a bucket arriving from below only reaches `Clear` once it
    /// crosses `clear_level` itself. `previous` carries that history.
    fn state_for(&self, level: u32, previous: RateState) -> RateState {
        if level >= self.clear_level {
            RateState::Clear
        } else if level >= self.alert_level {
            if previous == RateState::Clear {
                RateState::Clear
            } else {
                RateState::Alert
            }
        } else if level >= self.limit_level {
            RateState::Alert
        } else if level >= self.disconnect_level {
            RateState::Limited
        } else {
            RateState::Disconnected
        }
    }
}

/// The default rate class table (`spec.md` §4.6, C11). Classes are modeled
/// on the ones real AIM clients expect to find in `RateParamsQuery`; exact
/// numeric tuning is a deployment concern, not a protocol one.
pub fn default_classes() -> Vec<RateClass> {
    vec![
        RateClass {
            id: 1,
            window_size_ms: 20_000,
            clear_level: 4000,
            alert_level: 3000,
            limit_level: 2000,
            disconnect_level: 1000,
            max_level: 6000,
            decrement: 800,
        },
        RateClass {
            id: 2,
            window_size_ms: 20_000,
            clear_level: 4000,
            alert_level: 3000,
            limit_level: 2000,
            disconnect_level: 1000,
            max_level: 6000,
            decrement: 1000,
        },
        RateClass {
            id: 3,
            window_size_ms: 10_000,
            clear_level: 5000,
            alert_level: 4000,
            limit_level: 3000,
            disconnect_level: 2000,
            max_level: 8000,
            decrement: 1200,
        },
        RateClass {
            id: 4,
            window_size_ms: 30_000,
            clear_level: 3000,
            alert_level: 2400,
            limit_level: 1800,
            disconnect_level: 1000,
            max_level: 5000,
            decrement: 500,
        },
        RateClass {
            id: 5,
            window_size_ms: 60_000,
            clear_level: 2500,
            alert_level: 2000,
            limit_level: 1500,
            disconnect_level: 800,
            max_level: 4000,
            decrement: 400,
        },
    ]
}

#[derive(Debug)]
struct BucketState {
    current_level: u32,
    last_time_ms: u64,
    state: RateState,
}

/// Per-session rate accounting across every class it has been charged
/// against. Lives on [`crate::session::Session`] behind the session's own
/// lock (`spec.md` §5: "per-session buckets are ... session-lock-guarded").
#[derive(Debug)]
pub struct RateBuckets {
    classes: &'static [RateClass],
    buckets: Mutex<HashMap<u16, BucketState>>,
}

/// Outcome of charging an incoming SNAC against its class's bucket.
pub struct Evaluation {
    pub state: RateState,
    pub transitioned: bool,
}

impl RateBuckets {
    pub fn new(classes: &'static [RateClass]) -> Self {
        Self {
            classes,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn class(&self, class_id: u16) -> Option<&'static RateClass> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    /// Raises the bucket toward `max_level` for elapsed time, charges the
    /// per-SNAC decrement, and returns the resulting state plus whether the
    /// state differs from before this call (`spec.md` §4.11).
    pub fn charge(&self, class_id: u16, now_ms: u64) -> Option<Evaluation> {
        let class = self.class(class_id)?;
        let mut buckets = self.buckets.lock().unwrap_or_else(|p| p.into_inner());
        let bucket = buckets.entry(class_id).or_insert(BucketState {
            current_level: class.max_level,
            last_time_ms: now_ms,
            state: RateState::Clear,
        });

        let elapsed = now_ms.saturating_sub(bucket.last_time_ms);
        let refill = ((elapsed as u128 * class.max_level as u128) / class.window_size_ms.max(1) as u128) as u32;
        let replenished = bucket.current_level.saturating_add(refill).min(class.max_level);
        bucket.current_level = replenished.saturating_sub(class.decrement);
        bucket.last_time_ms = now_ms;

        let new_state = class.state_for(bucket.current_level, bucket.state);
        let transitioned = new_state != bucket.state;
        bucket.state = new_state;

        Some(Evaluation {
            state: new_state,
            transitioned,
        })
    }

    pub fn current_level(&self, class_id: u16) -> Option<u32> {
        self.buckets.lock().unwrap_or_else(|p| p.into_inner()).get(&class_id).map(|b| b.current_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_CLASSES: &[RateClass] = &[RateClass {
        id: 1,
        window_size_ms: 10_000,
        clear_level: 4000,
        alert_level: 3000,
        limit_level: 2000,
        disconnect_level: 1000,
        max_level: 5000,
        decrement: 1000,
    }];

    #[test]
    fn idle_time_refills_more_than_a_back_to_back_charge() {
        let immediate = RateBuckets::new(TEST_CLASSES);
        immediate.charge(1, 0).unwrap();
        immediate.charge(1, 0).unwrap();

        let idle = RateBuckets::new(TEST_CLASSES);
        idle.charge(1, 0).unwrap();
        idle.charge(1, 5_000).unwrap();

        assert!(idle.current_level(1) > immediate.current_level(1));
    }

    #[test]
    fn repeated_charges_without_idle_drive_toward_disconnect() {
        let buckets = RateBuckets::new(TEST_CLASSES);
        let mut last_state = RateState::Clear;
        for i in 0..10 {
            let eval = buckets.charge(1, i).unwrap();
            last_state = eval.state;
        }
        assert_eq!(last_state, RateState::Disconnected);
    }

    #[test]
    fn unknown_class_returns_none() {
        let buckets = RateBuckets::new(TEST_CLASSES);
        assert!(buckets.charge(999, 0).is_none());
    }

    #[test]
    fn clear_state_stays_clear_while_dipping_into_the_sticky_band() {
        let class = TEST_CLASSES[0];
        assert_eq!(class.state_for(3500, RateState::Clear), RateState::Clear);
    }

    #[test]
    fn alert_state_does_not_jump_back_to_clear_until_clear_level() {
        let class = TEST_CLASSES[0];
        assert_eq!(class.state_for(3500, RateState::Alert), RateState::Alert);
        assert_eq!(class.state_for(4000, RateState::Alert), RateState::Clear);
    }
}
