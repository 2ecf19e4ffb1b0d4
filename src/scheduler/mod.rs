//! The dispatch engine's ordering algorithm: pure and side-effect free.
//!
//! Given a requested scheme name, the config snapshot, the state snapshot
//! and the current time, [`build_attempt_queue`] produces the ordered list
//! of candidates the dispatcher should try, annotated with enough
//! round-robin bookkeeping (`priority`, `group_size`, `cursor_in_group`) for
//! the dispatcher to advance the cursor on success.

use chrono::{DateTime, Utc};

use crate::config::{Schemes, Upstream};
use crate::state::GlobalState;

/// One entry in the attempt queue: the upstream to try, plus the
/// round-robin coordinates needed to advance its cursor on success.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub upstream: Upstream,
    pub priority: i64,
    pub group_size: usize,
    pub cursor_in_group: usize,
}

/// Outcome of scheme selection and queue construction.
pub struct AttemptQueue {
    pub scheme_name: String,
    /// True when the requested scheme name did not match any configured
    /// scheme and the lexicographically-first scheme was used instead.
    pub fell_back: bool,
    pub candidates: Vec<Candidate>,
}

/// Build the ordered attempt queue for one incoming request.
///
/// Returns `None` only when `schemes` is empty — there is nothing to select
/// a scheme from at all.
#[must_use]
pub fn build_attempt_queue(
    requested_scheme: Option<&str>,
    schemes: &Schemes,
    state: &GlobalState,
    now: DateTime<Utc>,
) -> Option<AttemptQueue> {
    if schemes.is_empty() {
        return None;
    }

    let (scheme_name, fell_back) = select_scheme(requested_scheme, schemes);
    let scheme = &schemes[&scheme_name];

    let active: Vec<&Upstream> = scheme
        .iter()
        .filter(|u| {
            !state
                .by_config_id
                .get(&u.id)
                .is_some_and(|s| s.is_tripped(now))
        })
        .collect();

    let mut candidates = Vec::with_capacity(active.len());
    for (priority, group) in group_by_priority(&active) {
        let group_size = group.len();
        let cursor = state.round_robin_cursor(&scheme_name, priority, group_size);
        let rotated = rotate(&group, cursor);
        for (index_in_rotated, upstream) in rotated.iter().enumerate() {
            let cursor_in_group = (cursor + index_in_rotated) % group_size;
            candidates.push(Candidate {
                upstream: (*upstream).clone(),
                priority,
                group_size,
                cursor_in_group,
            });
        }
    }

    Some(AttemptQueue {
        scheme_name,
        fell_back,
        candidates,
    })
}

/// If `requested` names a configured scheme, use it. Otherwise fall back to
/// the lexicographically-first scheme name, deterministically.
fn select_scheme(requested: Option<&str>, schemes: &Schemes) -> (String, bool) {
    if let Some(name) = requested {
        if schemes.contains_key(name) {
            return (name.to_string(), false);
        }
    }
    let mut names: Vec<&str> = schemes.keys().map(String::as_str).collect();
    names.sort_unstable();
    (names[0].to_string(), true)
}

/// Partition `upstreams` into ascending-priority groups, preserving
/// within-group (insertion) order.
fn group_by_priority<'a>(upstreams: &[&'a Upstream]) -> Vec<(i64, Vec<&'a Upstream>)> {
    let mut groups: Vec<(i64, Vec<&'a Upstream>)> = Vec::new();
    for upstream in upstreams {
        match groups.iter_mut().find(|(p, _)| *p == upstream.priority) {
            Some((_, group)) => group.push(upstream),
            None => groups.push((upstream.priority, vec![*upstream])),
        }
    }
    groups.sort_by_key(|(priority, _)| *priority);
    groups
}

/// Rotate `group` so that `cursor` becomes the new head: `group[cursor..] +
/// group[..cursor]`. `cursor` is assumed already clamped to `[0, len)`.
fn rotate<'a>(group: &[&'a Upstream], cursor: usize) -> Vec<&'a Upstream> {
    if group.is_empty() {
        return Vec::new();
    }
    let cursor = cursor % group.len();
    let mut rotated = Vec::with_capacity(group.len());
    rotated.extend_from_slice(&group[cursor..]);
    rotated.extend_from_slice(&group[..cursor]);
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UpstreamState;

    fn upstream(id: &str, priority: i64) -> Upstream {
        Upstream {
            id: id.to_string(),
            priority,
            url: format!("http://{id}"),
            api_key: "k".to_string(),
            model: None,
            consecutive_failure_threshold: None,
            disable_duration_seconds: None,
        }
    }

    fn schemes_with(name: &str, upstreams: Vec<Upstream>) -> Schemes {
        let mut schemes = Schemes::default();
        schemes.insert(name.to_string(), upstreams);
        schemes
    }

    #[test]
    fn empty_config_yields_none() {
        let schemes = Schemes::default();
        let state = GlobalState::default();
        assert!(build_attempt_queue(Some("default"), &schemes, &state, Utc::now()).is_none());
    }

    #[test]
    fn unknown_scheme_falls_back_to_lexicographically_first() {
        let schemes = {
            let mut s = Schemes::default();
            s.insert("zeta".to_string(), vec![upstream("a", 1)]);
            s.insert("alpha".to_string(), vec![upstream("b", 1)]);
            s
        };
        let state = GlobalState::default();
        let queue = build_attempt_queue(Some("missing"), &schemes, &state, Utc::now()).unwrap();
        assert_eq!(queue.scheme_name, "alpha");
        assert!(queue.fell_back);
    }

    #[test]
    fn single_group_of_one_rotation_is_noop() {
        let schemes = schemes_with("default", vec![upstream("a", 1)]);
        let state = GlobalState::default();
        let queue = build_attempt_queue(Some("default"), &schemes, &state, Utc::now()).unwrap();
        assert_eq!(queue.candidates.len(), 1);
        assert_eq!(queue.candidates[0].upstream.id, "a");
    }

    #[test]
    fn priority_groups_ordered_ascending_with_rotation() {
        let schemes = schemes_with(
            "default",
            vec![upstream("a", 1), upstream("b", 1), upstream("c", 2)],
        );
        let mut state = GlobalState::default();
        state
            .round_robin_state
            .entry("default".to_string())
            .or_default()
            .insert("1".to_string(), 1);
        let queue = build_attempt_queue(Some("default"), &schemes, &state, Utc::now()).unwrap();
        let ids: Vec<&str> = queue.candidates.iter().map(|c| c.upstream.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn tripped_upstream_is_skipped() {
        let schemes = schemes_with("default", vec![upstream("a", 1), upstream("b", 2)]);
        let mut state = GlobalState::default();
        state.by_config_id.insert(
            "a".to_string(),
            UpstreamState {
                disabled_until: Some(Utc::now() + chrono::Duration::seconds(60)),
                ..Default::default()
            },
        );
        let queue = build_attempt_queue(Some("default"), &schemes, &state, Utc::now()).unwrap();
        let ids: Vec<&str> = queue.candidates.iter().map(|c| c.upstream.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn all_tripped_yields_empty_candidates() {
        let schemes = schemes_with("default", vec![upstream("a", 1)]);
        let mut state = GlobalState::default();
        state.by_config_id.insert(
            "a".to_string(),
            UpstreamState {
                disabled_until: Some(Utc::now() + chrono::Duration::seconds(60)),
                ..Default::default()
            },
        );
        let queue = build_attempt_queue(Some("default"), &schemes, &state, Utc::now()).unwrap();
        assert!(queue.candidates.is_empty());
    }

    #[test]
    fn cursor_beyond_group_size_does_not_crash() {
        let schemes = schemes_with("default", vec![upstream("a", 1), upstream("b", 1)]);
        let mut state = GlobalState::default();
        state
            .round_robin_state
            .entry("default".to_string())
            .or_default()
            .insert("1".to_string(), 7);
        let queue = build_attempt_queue(Some("default"), &schemes, &state, Utc::now()).unwrap();
        assert_eq!(queue.candidates.len(), 2);
    }

    #[test]
    fn deterministic_given_identical_inputs() {
        let schemes = schemes_with("default", vec![upstream("a", 1), upstream("b", 1)]);
        let state = GlobalState::default();
        let now = Utc::now();
        let first = build_attempt_queue(Some("default"), &schemes, &state, now).unwrap();
        let second = build_attempt_queue(Some("default"), &schemes, &state, now).unwrap();
        let first_ids: Vec<&str> = first.candidates.iter().map(|c| c.upstream.id.as_str()).collect();
        let second_ids: Vec<&str> = second.candidates.iter().map(|c| c.upstream.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }
}
