pub mod registry;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub use registry::ConfigRegistry;

/// Error type for configuration loading, validation and mutation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config store: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Upstream not found: {0}")]
    NotFound(String),
}

/// One configured backend endpoint.
///
/// Identified by a stable opaque `id` assigned on creation. `priority`
/// controls ordering within a [`Scheme`] (smaller tried earlier); upstreams
/// sharing the same `priority` form a priority group that the scheduler
/// round-robins across.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub id: String,
    pub priority: i64,
    pub url: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Breaker arms only when this and `disable_duration_seconds` are both set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_duration_seconds: Option<u64>,
}

impl Upstream {
    #[must_use]
    pub fn breaker_armed(&self) -> bool {
        self.consecutive_failure_threshold.is_some() && self.disable_duration_seconds.is_some()
    }

    /// Forward URL: base URL with exactly one trailing slash stripped, then
    /// `/chat/completions` appended.
    #[must_use]
    pub fn chat_completions_url(&self) -> String {
        let base = self.url.strip_suffix('/').unwrap_or(&self.url);
        format!("{base}/chat/completions")
    }
}

/// The subset of an [`Upstream`]'s fields that a client may supply when
/// creating or partially updating it. `None` fields are left unchanged on
/// update, and default to `None`/absent on create.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamInput {
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<Option<String>>,
    #[serde(default)]
    pub consecutive_failure_threshold: Option<Option<u32>>,
    #[serde(default)]
    pub disable_duration_seconds: Option<Option<u64>>,
}

/// A named, ordered collection of upstreams, selected by a client's `model`
/// field.
pub type Scheme = Vec<Upstream>;

/// The full config document: scheme name -> ordered upstream list.
///
/// Invariant: every [`Upstream::id`] is unique across the whole document.
pub type Schemes = FxHashMap<String, Scheme>;

/// Sort a scheme's upstreams ascending by priority, stable on ties so that
/// insertion order within a priority group is preserved across a load.
pub fn sort_scheme(scheme: &mut Scheme) {
    scheme.sort_by_key(|u| u.priority);
}
