use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub fail: u64,
}

impl Counts {
    pub fn record(&mut self, success: bool) {
        if success {
            self.success += 1;
        } else {
            self.fail += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodayState {
    pub date: NaiveDate,
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub fail: u64,
    #[serde(default)]
    pub by_config_id: FxHashMap<String, Counts>,
}

impl TodayState {
    pub fn record(&mut self, success: bool) {
        if success {
            self.success += 1;
        } else {
            self.fail += 1;
        }
    }
}

impl Default for TodayState {
    fn default() -> Self {
        Self {
            date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default(),
            success: 0,
            fail: 0,
            by_config_id: FxHashMap::default(),
        }
    }
}

/// Per-upstream counters and breaker state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamState {
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub fail: u64,
    #[serde(default)]
    pub consecutive_fails: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_until: Option<chrono::DateTime<chrono::Utc>>,
}

impl UpstreamState {
    /// Whether this upstream is currently tripped (breaker open) at `now`.
    #[must_use]
    pub fn is_tripped(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.disabled_until.is_some_and(|until| until > now)
    }
}

/// The full `state` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalState {
    #[serde(default)]
    pub total: Counts,
    #[serde(default)]
    pub today: TodayState,
    #[serde(default)]
    pub by_config_id: FxHashMap<String, UpstreamState>,
    #[serde(default)]
    pub round_robin_state: FxHashMap<String, FxHashMap<String, usize>>,
}

impl GlobalState {
    /// Cursor for `(scheme, priority)`, defaulting to 0 and clamped modulo
    /// `group_size` so a shrunk group never yields an out-of-range index.
    #[must_use]
    pub fn round_robin_cursor(&self, scheme: &str, priority: i64, group_size: usize) -> usize {
        if group_size == 0 {
            return 0;
        }
        let cursor = self
            .round_robin_state
            .get(scheme)
            .and_then(|by_priority| by_priority.get(&priority.to_string()))
            .copied()
            .unwrap_or(0);
        cursor % group_size
    }
}
