//! Per-namespace cooldown bookkeeping
//!
//! A namespace owns a cooldown and a last-used stamp for every pooled proxy.
//! Stamps are signed nanosecond offsets from the rotator's epoch so that
//! never-used proxies can be back-dated past the epoch and still compare
//! correctly against real lease times.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Deserializer};

/// Point in time, in nanoseconds relative to the rotator's epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Stamp(i128);

impl Stamp {
    pub(crate) fn from_elapsed(elapsed: Duration) -> Self {
        Stamp(nanos(elapsed))
    }

    fn since(self, earlier: Stamp) -> i128 {
        self.0.saturating_sub(earlier.0)
    }

    fn back(self, by: Duration) -> Stamp {
        Stamp(self.0.saturating_sub(nanos(by)))
    }
}

const NANOS_PER_MILLI: i128 = 1_000_000;

fn nanos(d: Duration) -> i128 {
    i128::try_from(d.as_nanos()).unwrap_or(i128::MAX)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Namespace policy as supplied by a caller or config file.
///
/// Absent fields leave the current value untouched when the namespace
/// already exists; a new namespace falls back to the rotator's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamespaceConfig {
    pub key: String,
    #[serde(
        default,
        rename = "cooldown_ms",
        deserialize_with = "deserialize_cooldown"
    )]
    pub cooldown: Option<Duration>,
}

impl NamespaceConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cooldown: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

fn deserialize_cooldown<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

/// Cooldown policy plus last-used stamps for one namespace.
#[derive(Debug, Clone)]
pub(crate) struct Namespace {
    pub(crate) cooldown: Duration,
    last_used: HashMap<String, Stamp>,
}

impl Namespace {
    pub(crate) fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_used: HashMap::new(),
        }
    }

    /// Make the tracked set equal `pool`.
    ///
    /// Stale stamps are dropped. Proxies seen for the first time are stamped
    /// `now - cooldown - jitter`, jitter drawn from `[0, max_jitter]`, so they
    /// are eligible immediately but do not all tie for selection.
    /// Returns `(added, removed)`.
    pub(crate) fn reconcile(
        &mut self,
        pool: &[String],
        now: Stamp,
        max_jitter: Duration,
    ) -> (usize, usize) {
        let pooled: HashSet<&str> = pool.iter().map(String::as_str).collect();
        let before = self.last_used.len();
        self.last_used.retain(|id, _| pooled.contains(id.as_str()));
        let removed = before - self.last_used.len();

        let mut rng = rand::rng();
        let jitter_cap = whole_millis(max_jitter);
        let mut added = 0;
        for id in pool {
            if self.last_used.contains_key(id) {
                continue;
            }
            let jitter = Duration::from_millis(rng.random_range(0..=jitter_cap));
            let stamp = now.back(self.cooldown).back(jitter);
            self.last_used.insert(id.clone(), stamp);
            added += 1;
        }
        (added, removed)
    }

    fn is_eligible(&self, stamp: Stamp, now: Stamp) -> bool {
        now.since(stamp) >= nanos(self.cooldown)
    }

    /// Eligible proxies, least recently used first, ties broken by id.
    pub(crate) fn eligible(&self, now: Stamp) -> Vec<&str> {
        let mut eligible: Vec<(Stamp, &str)> = self
            .last_used
            .iter()
            .filter(|(_, stamp)| self.is_eligible(**stamp, now))
            .map(|(id, stamp)| (*stamp, id.as_str()))
            .collect();
        eligible.sort_unstable();
        eligible.into_iter().map(|(_, id)| id).collect()
    }

    /// Mark `id` as leased at `now`.
    pub(crate) fn stamp(&mut self, id: &str, now: Stamp) {
        if let Some(stamp) = self.last_used.get_mut(id) {
            *stamp = now;
        }
    }

    /// Time until the soonest tracked proxy becomes eligible again.
    ///
    /// Rounded up to whole milliseconds so a caller sleeping for it never
    /// wakes early. Zero if something is already eligible; the full cooldown
    /// if nothing is tracked at all.
    pub(crate) fn retry_after(&self, now: Stamp) -> Duration {
        let cooldown = nanos(self.cooldown);
        self.last_used
            .values()
            .map(|stamp| cooldown.saturating_sub(now.since(*stamp)).max(0))
            .min()
            .map(|remaining| {
                let ms = (remaining + NANOS_PER_MILLI - 1) / NANOS_PER_MILLI;
                Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
            })
            .unwrap_or(self.cooldown)
    }

    /// Count of `(eligible, cooling_down)` proxies.
    pub(crate) fn counts(&self, now: Stamp) -> (usize, usize) {
        let eligible = self
            .last_used
            .values()
            .filter(|stamp| self.is_eligible(**stamp, now))
            .count();
        (eligible, self.last_used.len() - eligible)
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> std::collections::BTreeMap<String, Stamp> {
        self.last_used
            .iter()
            .map(|(id, stamp)| (id.clone(), *stamp))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn at(ms: i64) -> Stamp {
        Stamp(i128::from(ms) * NANOS_PER_MILLI)
    }

    fn at_micros(us: i64) -> Stamp {
        Stamp(i128::from(us) * 1_000)
    }

    #[test]
    fn reconcile_adds_and_removes() {
        let mut ns = Namespace::new(Duration::from_secs(1));
        assert_eq!(ns.reconcile(&pool(&["a", "b"]), at(0), Duration::ZERO), (2, 0));
        assert_eq!(ns.reconcile(&pool(&["b", "c"]), at(0), Duration::ZERO), (1, 1));

        let tracked: Vec<String> = ns.tracked().into_keys().collect();
        assert_eq!(tracked, vec!["b", "c"]);
    }

    #[test]
    fn new_proxies_are_backdated_past_cooldown() {
        let mut ns = Namespace::new(Duration::from_millis(500));
        ns.reconcile(&pool(&["a"]), at(10_000), Duration::from_millis(1000));

        let stamp = ns.tracked()["a"];
        assert!(stamp <= at(9_500), "stamp {stamp:?} must be at least one cooldown back");
        assert!(stamp >= at(8_500), "jitter must stay within bounds, got {stamp:?}");
        assert_eq!(ns.eligible(at(10_000)), vec!["a"]);
    }

    #[test]
    fn backdating_before_epoch_is_allowed() {
        let mut ns = Namespace::new(Duration::from_secs(60));
        ns.reconcile(&pool(&["a"]), at(0), Duration::ZERO);
        assert_eq!(ns.tracked()["a"], at(-60_000));
        assert_eq!(ns.eligible(at(0)), vec!["a"]);
    }

    #[test]
    fn reconcile_keeps_existing_stamps() {
        let mut ns = Namespace::new(Duration::from_secs(1));
        ns.reconcile(&pool(&["a"]), at(0), Duration::ZERO);
        ns.stamp("a", at(5_000));
        ns.reconcile(&pool(&["a", "b"]), at(5_000), Duration::ZERO);
        assert_eq!(ns.tracked()["a"], at(5_000));
    }

    #[test]
    fn eligible_orders_oldest_first_then_by_id() {
        let mut ns = Namespace::new(Duration::from_millis(100));
        ns.reconcile(&pool(&["c", "b", "a"]), at(0), Duration::ZERO);
        ns.stamp("a", at(50));
        // b and c tie at -100
        assert_eq!(ns.eligible(at(150)), vec!["b", "c", "a"]);
        assert_eq!(ns.eligible(at(149)), vec!["b", "c"]);
    }

    #[test]
    fn eligibility_boundary_is_inclusive() {
        let mut ns = Namespace::new(Duration::from_millis(1000));
        ns.reconcile(&pool(&["a"]), at(0), Duration::ZERO);
        ns.stamp("a", at(0));
        assert!(ns.eligible(at(999)).is_empty());
        assert_eq!(ns.eligible(at(1000)), vec!["a"]);
    }

    #[test]
    fn retry_after_reports_soonest_release() {
        let mut ns = Namespace::new(Duration::from_millis(1000));
        ns.reconcile(&pool(&["a", "b"]), at(0), Duration::ZERO);
        ns.stamp("a", at(100));
        ns.stamp("b", at(400));
        assert_eq!(ns.retry_after(at(500)), Duration::from_millis(600));
        assert_eq!(ns.retry_after(at(1200)), Duration::ZERO);
    }

    #[test]
    fn submillisecond_cooldown_is_honoured() {
        let mut ns = Namespace::new(Duration::from_micros(900));
        ns.reconcile(&pool(&["a"]), at(0), Duration::ZERO);
        ns.stamp("a", at(0));
        assert!(ns.eligible(at(0)).is_empty());
        assert!(ns.eligible(at_micros(899)).is_empty());
        assert_eq!(ns.eligible(at_micros(900)), vec!["a"]);
    }

    #[test]
    fn retry_after_rounds_up_to_whole_millis() {
        let mut ns = Namespace::new(Duration::from_millis(1000));
        ns.reconcile(&pool(&["a"]), at(0), Duration::ZERO);
        ns.stamp("a", at_micros(1_999));
        // 999.001ms elapsed, 0.999ms left
        assert_eq!(
            ns.retry_after(at_micros(1_001_000)),
            Duration::from_millis(1)
        );

        let mut ns = Namespace::new(Duration::from_micros(900));
        ns.reconcile(&pool(&["a"]), at(0), Duration::ZERO);
        ns.stamp("a", at(0));
        assert_eq!(ns.retry_after(at(0)), Duration::from_millis(1));
    }

    #[test]
    fn whole_millis_saturates() {
        assert_eq!(whole_millis(Duration::from_micros(1_500)), 1);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn retry_after_empty_is_cooldown() {
        let ns = Namespace::new(Duration::from_millis(750));
        assert_eq!(ns.retry_after(at(0)), Duration::from_millis(750));
    }

    #[test]
    fn counts_split_eligible_and_cooling() {
        let mut ns = Namespace::new(Duration::from_millis(1000));
        ns.reconcile(&pool(&["a", "b", "c"]), at(0), Duration::ZERO);
        ns.stamp("a", at(0));
        assert_eq!(ns.counts(at(10)), (2, 1));
    }

    #[test]
    fn config_deserializes_cooldown_millis() {
        #[derive(Deserialize)]
        struct Wrapper {
            namespaces: Vec<NamespaceConfig>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
[[namespaces]]
key = "search"
cooldown_ms = 5000

[[namespaces]]
key = "bare"
"#,
        )
        .unwrap();
        assert_eq!(
            parsed.namespaces[0],
            NamespaceConfig::new("search").with_cooldown(Duration::from_secs(5))
        );
        assert_eq!(parsed.namespaces[1], NamespaceConfig::new("bare"));
    }
}
