//! Compiled-in presets.
//!
//! The binary ships one builtin preset, prepended ahead of any user
//! presets. It seeds configuration defaults at the bottom of the
//! `modifyConfig` waterfall and registers the `inspect` command.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use kiln_core::{keys, Contribution, HookKind, PluginApi, PluginFactory, RegistryResolver};

/// Identifier of the builtin preset.
pub const BUILTIN_PRESET: &str = "builtin";

/// Resolver preloaded with the compiled-in factories.
pub fn resolver() -> RegistryResolver {
    RegistryResolver::new().with(BUILTIN_PRESET, BuiltinPreset)
}

/// Baseline registrations every run gets.
struct BuiltinPreset;

#[async_trait]
impl PluginFactory for BuiltinPreset {
    async fn setup(&self, api: &mut PluginApi<'_>) -> anyhow::Result<Contribution> {
        // Defaults only fill keys the running config does not already
        // have; later hooks and user config always win.
        api.register_hook(keys::MODIFY_CONFIG, HookKind::Modify, |memo, _args| async move {
            Ok(missing_defaults(&memo))
        })?;

        // The build-start accumulator carries the final config; stash
        // it where the inspect command can reach it.
        let captured: Arc<Mutex<Value>> = Arc::new(Mutex::new(Value::Null));
        let sink = captured.clone();
        api.register_hook(keys::ON_BUILD_START, HookKind::Event, move |memo, _args| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = memo;
                Ok(None)
            }
        })?;

        api.register_command("inspect", move |_args| {
            let captured = captured.clone();
            async move {
                let config = captured.lock().unwrap().clone();
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        });

        Ok(Contribution::default())
    }
}

/// Default config values, filtered down to keys `memo` lacks.
fn missing_defaults(memo: &Value) -> Option<Value> {
    let defaults = json!({
        "outDir": "dist",
        "minify": false,
    });

    let mut fill = Map::new();
    if let (Some(defaults), Some(memo)) = (defaults.as_object(), memo.as_object()) {
        for (key, value) in defaults {
            if !memo.contains_key(key) {
                fill.insert(key.clone(), value.clone());
            }
        }
    }

    if fill.is_empty() {
        None
    } else {
        Some(Value::Object(fill))
    }
}
