use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use crate::store::PersistentStore;
use crate::util::new_upstream_id;

use super::{sort_scheme, ConfigError, Schemes, Upstream, UpstreamInput};

const CONFIG_DOC: &str = "config";

/// In-memory view over the `config` document: scheme name -> ordered
/// upstream list. Every mutator holds `guard` across its whole
/// load-modify-save so two concurrent admin writes can't race each other's
/// save and clobber one another — the same single-lock-per-mutation
/// discipline [`crate::state::StateStore`] uses for `record_attempt`.
pub struct ConfigRegistry {
    store: Arc<PersistentStore>,
    guard: Mutex<()>,
}

impl ConfigRegistry {
    #[must_use]
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Load all schemes, migrating a legacy flat-list document to the
    /// scheme-keyed `{"default": [...]}` shape and writing the migrated form
    /// back before returning. Within each scheme, upstreams are sorted
    /// ascending by priority (stable on ties).
    pub fn load_schemes(&self) -> Result<Schemes, ConfigError> {
        let _guard = self.guard.lock();
        self.load_schemes_locked()
    }

    pub fn save_schemes(&self, schemes: &Schemes) -> Result<(), ConfigError> {
        let _guard = self.guard.lock();
        self.save_schemes_locked(schemes)
    }

    /// Append a new upstream with a freshly generated id, creating the
    /// scheme if it does not already exist.
    pub fn create(&self, scheme_name: &str, fields: UpstreamCreate) -> Result<Upstream, ConfigError> {
        let _guard = self.guard.lock();
        let mut schemes = self.load_schemes_locked()?;
        let upstream = Upstream {
            id: new_upstream_id(),
            priority: fields.priority,
            url: fields.url,
            api_key: fields.api_key,
            model: fields.model,
            consecutive_failure_threshold: fields.consecutive_failure_threshold,
            disable_duration_seconds: fields.disable_duration_seconds,
        };
        schemes
            .entry(scheme_name.to_string())
            .or_default()
            .push(upstream.clone());
        self.save_schemes_locked(&schemes)?;
        Ok(upstream)
    }

    /// Locate an upstream by id across all schemes and merge only the
    /// fields present in `fields`.
    pub fn update(&self, id: &str, fields: UpstreamInput) -> Result<Upstream, ConfigError> {
        let _guard = self.guard.lock();
        let mut schemes = self.load_schemes_locked()?;
        for scheme in schemes.values_mut() {
            if let Some(upstream) = scheme.iter_mut().find(|u| u.id == id) {
                if let Some(priority) = fields.priority {
                    upstream.priority = priority;
                }
                if let Some(url) = fields.url {
                    upstream.url = url;
                }
                if let Some(api_key) = fields.api_key {
                    upstream.api_key = api_key;
                }
                if let Some(model) = fields.model {
                    upstream.model = model;
                }
                if let Some(threshold) = fields.consecutive_failure_threshold {
                    upstream.consecutive_failure_threshold = threshold;
                }
                if let Some(duration) = fields.disable_duration_seconds {
                    upstream.disable_duration_seconds = duration;
                }
                let updated = upstream.clone();
                self.save_schemes_locked(&schemes)?;
                return Ok(updated);
            }
        }
        Err(ConfigError::NotFound(id.to_string()))
    }

    /// Remove an upstream by id. If its scheme becomes empty, remove the
    /// scheme too.
    pub fn delete(&self, id: &str) -> Result<(), ConfigError> {
        let _guard = self.guard.lock();
        let mut schemes = self.load_schemes_locked()?;
        let mut found = false;
        schemes.retain(|_, scheme| {
            let before = scheme.len();
            scheme.retain(|u| u.id != id);
            if scheme.len() != before {
                found = true;
            }
            !scheme.is_empty()
        });
        if !found {
            return Err(ConfigError::NotFound(id.to_string()));
        }
        self.save_schemes_locked(&schemes)
    }

    /// Load and migrate, assuming `guard` is already held by the caller.
    fn load_schemes_locked(&self) -> Result<Schemes, ConfigError> {
        let raw: Value = self.store.load(CONFIG_DOC)?;
        let (mut schemes, migrated) = parse_config_document(raw)?;

        for scheme in schemes.values_mut() {
            sort_scheme(scheme);
        }

        if migrated {
            self.save_schemes_locked(&schemes)?;
        }

        Ok(schemes)
    }

    /// Persist, assuming `guard` is already held by the caller.
    fn save_schemes_locked(&self, schemes: &Schemes) -> Result<(), ConfigError> {
        self.store.store(CONFIG_DOC, schemes)
    }
}

/// Fields required to create a new upstream, paired with the scheme it
/// should be created in. Mirrors the admin `POST /config` wire shape.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamCreate {
    pub priority: i64,
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub consecutive_failure_threshold: Option<u32>,
    #[serde(default)]
    pub disable_duration_seconds: Option<u64>,
}

fn parse_config_document(raw: Value) -> Result<(Schemes, bool), ConfigError> {
    match raw {
        Value::Array(list) => {
            let upstreams: Vec<Upstream> = serde_json::from_value(Value::Array(list))?;
            let mut schemes = Schemes::default();
            schemes.insert("default".to_string(), upstreams);
            Ok((schemes, true))
        }
        Value::Object(_) | Value::Null => {
            let schemes: Schemes = if raw.is_null() {
                Schemes::default()
            } else {
                serde_json::from_value(raw)?
            };
            Ok((schemes, false))
        }
        other => Err(ConfigError::Json(<serde_json::Error as serde::de::Error>::custom(
            format!("unexpected config document shape: {other}"),
        ))),
    }
}
