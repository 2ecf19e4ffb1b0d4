use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ConfigError, Schemes};
use crate::store::PersistentStore;
use crate::util::{now, today_local_date};

use super::types::{GlobalState, UpstreamState};

const STATE_DOC: &str = "state";

/// Outcome of one dispatch attempt against one upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// In-memory view over the `state` document. The sole hot-path mutator is
/// [`StateStore::record_attempt`]; everything else is a read.
///
/// All mutation happens under one process-wide mutex, inside which the
/// document is loaded, modified, and persisted — matching the prescription
/// that any state-mutating operation takes its lock exactly once and does
/// all of its I/O inside it.
pub struct StateStore {
    store: Arc<PersistentStore>,
    guard: Mutex<()>,
}

impl StateStore {
    #[must_use]
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Read a coherent snapshot, applying day-rollover first so admin reads
    /// and scheduler reads never see stale `today.*` counters.
    pub fn snapshot(&self, schemes: &Schemes) -> Result<GlobalState, ConfigError> {
        let _guard = self.guard.lock();
        let mut state: GlobalState = self.store.load(STATE_DOC)?;
        let changed = roll_over_and_prune(&mut state, schemes);
        if changed {
            self.store.store(STATE_DOC, &state)?;
        }
        Ok(state)
    }

    /// Record the outcome of one attempt against `upstream_id` and persist
    /// the result. `scheme` and `priority`/`group_size`/`cursor_in_group`
    /// are only used to advance the round-robin cursor on success.
    #[allow(clippy::too_many_arguments)]
    pub fn record_attempt(
        &self,
        schemes: &Schemes,
        upstream_id: &str,
        outcome: Outcome,
        scheme: &str,
        priority: i64,
        group_size: usize,
        cursor_in_group: usize,
        threshold: Option<u32>,
        disable_duration_secs: Option<u64>,
    ) -> Result<(), ConfigError> {
        let _guard = self.guard.lock();
        let mut state: GlobalState = self.store.load(STATE_DOC)?;
        roll_over_and_prune(&mut state, schemes);

        let success = outcome == Outcome::Success;
        state.total.record(success);
        state.today.record(success);
        state
            .today
            .by_config_id
            .entry(upstream_id.to_string())
            .or_default()
            .record(success);

        let upstream_state = state
            .by_config_id
            .entry(upstream_id.to_string())
            .or_insert_with(UpstreamState::default);
        upstream_state.record(success);
        apply_breaker(upstream_state, success, threshold, disable_duration_secs);

        if success && group_size > 0 {
            let next = (cursor_in_group + 1) % group_size;
            state
                .round_robin_state
                .entry(scheme.to_string())
                .or_default()
                .insert(priority.to_string(), next);
        }

        self.store.store(STATE_DOC, &state)
    }
}

impl UpstreamState {
    fn record(&mut self, success: bool) {
        if success {
            self.success += 1;
        } else {
            self.fail += 1;
        }
    }
}

fn apply_breaker(
    state: &mut UpstreamState,
    success: bool,
    threshold: Option<u32>,
    disable_duration_secs: Option<u64>,
) {
    if success {
        state.consecutive_fails = 0;
        state.disabled_until = None;
        return;
    }

    state.consecutive_fails = state.consecutive_fails.saturating_add(1);
    if let (Some(threshold), Some(duration_secs)) = (threshold, disable_duration_secs) {
        if state.consecutive_fails >= threshold {
            state.disabled_until =
                Some(now() + chrono::Duration::seconds(duration_secs.min(i64::MAX as u64) as i64));
        }
    }
}

/// Reset `today.*` on a local-date boundary crossing and drop state rows for
/// upstream ids that no longer exist in `schemes`. Returns whether the
/// document changed and should be persisted.
fn roll_over_and_prune(state: &mut GlobalState, schemes: &Schemes) -> bool {
    let mut changed = false;

    let today = today_local_date();
    if state.today.date != today {
        state.today = super::types::TodayState {
            date: today,
            success: 0,
            fail: 0,
            by_config_id: Default::default(),
        };
        changed = true;
    }

    let live_ids: std::collections::HashSet<&str> = schemes
        .values()
        .flat_map(|scheme| scheme.iter().map(|u| u.id.as_str()))
        .collect();

    let before = state.by_config_id.len();
    state.by_config_id.retain(|id, _| live_ids.contains(id.as_str()));
    if state.by_config_id.len() != before {
        changed = true;
    }

    let before = state.today.by_config_id.len();
    state
        .today
        .by_config_id
        .retain(|id, _| live_ids.contains(id.as_str()));
    if state.today.by_config_id.len() != before {
        changed = true;
    }

    changed
}
