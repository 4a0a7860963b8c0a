//! Extension points: hook registration and waterfall application.
//!
//! A hook is a function registered under a named key. Applying a key
//! threads an accumulator through every hook registered for it, in
//! registration order, strictly sequentially. How each hook's result
//! folds into the accumulator depends on the key's [`HookKind`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::trace;

use kiln_config::shallow_merge;

use crate::plugin::PluginId;
use crate::{CoreError, Result};

/// Extension-point keys driven by the run loop.
pub mod keys {
    pub const ON_CHECK: &str = "onCheck";
    pub const ON_START: &str = "onStart";
    pub const MODIFY_CONFIG: &str = "modifyConfig";
    pub const ON_BUILD_START: &str = "onBuildStart";
}

/// How a key's waterfall results are interpreted.
///
/// A key's kind is fixed by its first registration; later registrations
/// and applications under a different kind are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Results accumulate into a sequence.
    Add,
    /// Results shallow-merge over the running value.
    Modify,
    /// Results are ignored; hooks run for their side effects.
    Event,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Add => "add",
            HookKind::Modify => "modify",
            HookKind::Event => "event",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boxed hook function: `(accumulator, args) -> partial result`.
pub type HookFn =
    Arc<dyn Fn(Value, Value) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;

/// A registered hook entry. Immutable once registered.
#[derive(Clone)]
pub struct Hook {
    /// Plugin the registration is attributed to.
    pub plugin: PluginId,
    pub key: String,
    pub kind: HookKind,
    pub(crate) f: HookFn,
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("plugin", &self.plugin)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Ordered hook storage with per-plugin attribution.
///
/// Hooks are indexed twice: by key for application (insertion order
/// preserved) and by owning plugin for diagnostics.
#[derive(Debug, Default)]
pub struct HookRegistry {
    by_key: HashMap<String, Vec<Arc<Hook>>>,
    by_plugin: HashMap<PluginId, Vec<Arc<Hook>>>,
    kinds: HashMap<String, HookKind>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook under `key`, attributed to `plugin`.
    ///
    /// The first registration under a key fixes the key's kind;
    /// registering the same key under a different kind fails.
    pub fn register(
        &mut self,
        plugin: PluginId,
        key: &str,
        kind: HookKind,
        f: HookFn,
    ) -> Result<()> {
        match self.kinds.get(key) {
            Some(registered) if *registered != kind => {
                return Err(CoreError::KindMismatch {
                    key: key.to_string(),
                    registered: *registered,
                    requested: kind,
                });
            }
            Some(_) => {}
            None => {
                self.kinds.insert(key.to_string(), kind);
            }
        }

        let hook = Arc::new(Hook {
            plugin: plugin.clone(),
            key: key.to_string(),
            kind,
            f,
        });

        self.by_key
            .entry(key.to_string())
            .or_default()
            .push(hook.clone());
        self.by_plugin.entry(plugin).or_default().push(hook);
        Ok(())
    }

    /// Kind declared for `key`, if any hook registered it.
    pub fn kind_of(&self, key: &str) -> Option<HookKind> {
        self.kinds.get(key).copied()
    }

    /// Hooks registered under `key`, in registration order.
    pub fn hooks_for_key(&self, key: &str) -> &[Arc<Hook>] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Hooks a plugin registered, in registration order.
    pub fn hooks_for_plugin(&self, plugin: &PluginId) -> &[Arc<Hook>] {
        self.by_plugin.get(plugin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All keys with at least one registration.
    pub fn registered_keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    /// Thread `initial` through every hook registered under `key`.
    ///
    /// No hooks under the key is a no-op: the seed comes back unchanged
    /// (an empty object, array, or null when absent, per kind). Hooks
    /// run strictly sequentially in registration order; the first
    /// failure aborts the waterfall and the remaining hooks never run.
    pub async fn apply(
        &self,
        key: &str,
        kind: HookKind,
        initial: Option<Value>,
        args: Value,
    ) -> Result<Value> {
        if let Some(registered) = self.kind_of(key) {
            if registered != kind {
                return Err(CoreError::KindMismatch {
                    key: key.to_string(),
                    registered,
                    requested: kind,
                });
            }
        }

        let mut memo = seed(kind, initial);
        let Some(hooks) = self.by_key.get(key) else {
            return Ok(memo);
        };

        for hook in hooks {
            trace!(key, plugin = %hook.plugin, "applying hook");
            let result =
                (hook.f)(memo.clone(), args.clone())
                    .await
                    .map_err(|source| CoreError::Hook {
                        key: key.to_string(),
                        plugin: hook.plugin.to_string(),
                        source,
                    })?;

            match kind {
                HookKind::Event => {}
                HookKind::Modify => match result {
                    None | Some(Value::Null) => {}
                    Some(partial) => shallow_merge(&mut memo, partial),
                },
                HookKind::Add => match result {
                    None | Some(Value::Null) => {}
                    Some(partial) => append(&mut memo, partial),
                },
            }
        }

        Ok(memo)
    }
}

/// Starting accumulator for a waterfall.
fn seed(kind: HookKind, initial: Option<Value>) -> Value {
    match initial {
        Some(value) => value,
        None => match kind {
            HookKind::Modify => Value::Object(Map::new()),
            HookKind::Add => Value::Array(Vec::new()),
            HookKind::Event => Value::Null,
        },
    }
}

/// Fold an `add` result into the accumulator: arrays extend, anything
/// else is pushed as a single element.
fn append(memo: &mut Value, partial: Value) {
    let items = match partial {
        Value::Array(items) => items,
        other => vec![other],
    };
    match memo {
        Value::Array(existing) => existing.extend(items),
        Value::Null => *memo = Value::Array(items),
        other => {
            let mut merged = vec![std::mem::take(other)];
            merged.extend(items);
            *other = Value::Array(merged);
        }
    }
}
