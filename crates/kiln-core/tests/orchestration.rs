//! End-to-end orchestration behavior: discovery order, phase
//! sequencing, waterfall configuration, and dispatch.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;

use kiln_core::{
    keys, Contribution, Core, CoreError, CoreOptions, Env, HookKind, PluginApi, RegistryResolver,
    RunOptions, RunPhase, SetupFn,
};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Factory that records its initialization and hands back a fixed
/// contribution.
fn recording(
    log: Log,
    name: &'static str,
    contribution: Contribution,
) -> SetupFn<impl Fn(&mut PluginApi<'_>) -> anyhow::Result<Contribution> + Send + Sync> {
    SetupFn(move |_api: &mut PluginApi<'_>| {
        log.lock().unwrap().push(format!("init:{name}"));
        Ok(contribution.clone())
    })
}

/// Factory registering a no-op command so runs have something to
/// dispatch.
fn with_command(
    name: &'static str,
) -> SetupFn<impl Fn(&mut PluginApi<'_>) -> anyhow::Result<Contribution> + Send + Sync> {
    SetupFn(move |api: &mut PluginApi<'_>| {
        api.register_command(name, |_args| async { Ok(()) });
        Ok(Contribution::default())
    })
}

fn core_in(dir: &TempDir, resolver: RegistryResolver, opts: impl FnOnce(&mut CoreOptions)) -> Core {
    let mut options = CoreOptions::new(dir.path(), Env::Development);
    opts(&mut options);
    Core::new(options, Arc::new(resolver))
}

#[tokio::test]
async fn presets_expand_depth_first() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    // P1 contributes [P2, P3]; P2 contributes [P4]. Expected
    // initialization order: P1, P2, P4, P3.
    let resolver = RegistryResolver::new()
        .with(
            "p1",
            recording(log.clone(), "p1", Contribution::presets(["p2", "p3"])),
        )
        .with(
            "p2",
            recording(log.clone(), "p2", Contribution::presets(["p4"])),
        )
        .with("p3", recording(log.clone(), "p3", Contribution::default()))
        .with("p4", recording(log.clone(), "p4", Contribution::default()))
        .with("cmd", with_command("build"));

    let mut core = core_in(&dir, resolver, |opts| {
        opts.presets.push("p1".into());
        opts.plugins.push("cmd".into());
    });
    core.run(RunOptions::new("build")).await.unwrap();

    assert_eq!(
        entries(&log),
        vec!["init:p1", "init:p2", "init:p4", "init:p3"]
    );
}

#[tokio::test]
async fn presets_initialize_before_any_plugin() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    // The first preset contributes a plugin; that plugin must still
    // wait for the sibling preset to finish.
    let resolver = RegistryResolver::new()
        .with(
            "preset-a",
            recording(log.clone(), "preset-a", Contribution::plugins(["plug-x"])),
        )
        .with(
            "preset-b",
            recording(log.clone(), "preset-b", Contribution::default()),
        )
        .with(
            "plug-x",
            recording(log.clone(), "plug-x", Contribution::default()),
        )
        .with(
            "plug-y",
            recording(log.clone(), "plug-y", Contribution::default()),
        )
        .with("cmd", with_command("build"));

    let mut core = core_in(&dir, resolver, |opts| {
        opts.presets.extend(["preset-a".into(), "preset-b".into()]);
        opts.plugins.push("plug-y".into());
    });
    core.run(RunOptions::new("build")).await.unwrap();

    // Initial plugins queue first, then preset contributions append.
    assert_eq!(
        entries(&log),
        vec![
            "init:preset-a",
            "init:preset-b",
            "init:plug-y",
            "init:plug-x"
        ]
    );
    let expected: Vec<kiln_core::PluginId> = vec!["plug-y".into(), "plug-x".into()];
    assert_eq!(core.resolved_plugins(), expected.as_slice());
}

#[tokio::test]
async fn finalized_plugins_initialize_strictly_in_order() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    let mut resolver = RegistryResolver::new().with("cmd", with_command("build"));
    let names = ["a", "b", "c", "d", "e"];
    for name in names {
        resolver.register(name, recording(log.clone(), name, Contribution::default()));
    }

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins.extend(names.map(Into::into));
        opts.plugins.push("cmd".into());
    });
    core.run(RunOptions::new("build")).await.unwrap();

    assert_eq!(
        entries(&log),
        vec!["init:a", "init:b", "init:c", "init:d", "init:e"]
    );
}

#[tokio::test]
async fn phases_run_in_fixed_order() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    let log2 = log.clone();
    let resolver = RegistryResolver::new().with(
        "base",
        SetupFn(move |api: &mut PluginApi<'_>| {
            for (key, kind) in [
                (keys::ON_CHECK, HookKind::Event),
                (keys::ON_START, HookKind::Event),
                (keys::ON_BUILD_START, HookKind::Event),
            ] {
                let log = log2.clone();
                api.register_hook(key, kind, move |_memo, _args| {
                    let log = log.clone();
                    let key = key.to_string();
                    async move {
                        log.lock().unwrap().push(key);
                        Ok(None)
                    }
                })?;
            }
            let log = log2.clone();
            api.register_hook(keys::MODIFY_CONFIG, HookKind::Modify, move |_memo, _args| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("modifyConfig".to_string());
                    Ok(None)
                }
            })?;
            let log = log2.clone();
            api.register_command("build", move |_args| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("command:build".to_string());
                    Ok(())
                }
            });
            Ok(Contribution::default())
        }),
    );

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins.push("base".into());
    });
    core.run(RunOptions::new("build")).await.unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "onCheck",
            "onStart",
            "modifyConfig",
            "onBuildStart",
            "command:build"
        ]
    );
    assert_eq!(core.phase(), RunPhase::Done);
}

#[tokio::test]
async fn modify_config_waterfall_produces_final_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("kiln.config.yaml"), "a: 1\n").unwrap();

    let resolver = RegistryResolver::new()
        .with(
            "first",
            SetupFn(|api: &mut PluginApi<'_>| {
                api.register_hook(keys::MODIFY_CONFIG, HookKind::Modify, |_memo, _args| async {
                    Ok(Some(json!({"b": 2})))
                })?;
                Ok(Contribution::default())
            }),
        )
        .with(
            "second",
            SetupFn(|api: &mut PluginApi<'_>| {
                api.register_hook(keys::MODIFY_CONFIG, HookKind::Modify, |_memo, _args| async {
                    Ok(Some(json!({"a": 3})))
                })?;
                Ok(Contribution::default())
            }),
        )
        .with("cmd", with_command("build"));

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins
            .extend(["first".into(), "second".into(), "cmd".into()]);
    });
    core.run(RunOptions::new("build")).await.unwrap();

    assert_eq!(core.user_config(), &json!({"a": 1}));
    assert_eq!(core.config(), &json!({"a": 3, "b": 2}));
}

#[tokio::test]
async fn failing_hook_aborts_before_later_phases() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    let log2 = log.clone();
    let resolver = RegistryResolver::new().with(
        "base",
        SetupFn(move |api: &mut PluginApi<'_>| {
            api.register_hook(keys::ON_START, HookKind::Event, |_memo, _args| async {
                Err(anyhow::anyhow!("startup refused"))
            })?;
            let log = log2.clone();
            api.register_hook(keys::MODIFY_CONFIG, HookKind::Modify, move |_memo, _args| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("modifyConfig".to_string());
                    Ok(None)
                }
            })?;
            let log = log2.clone();
            api.register_command("build", move |_args| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("command:build".to_string());
                    Ok(())
                }
            });
            Ok(Contribution::default())
        }),
    );

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins.push("base".into());
    });
    let err = core.run(RunOptions::new("build")).await.unwrap_err();

    match err {
        CoreError::Hook { key, plugin, .. } => {
            assert_eq!(key, keys::ON_START);
            assert_eq!(plugin, "base");
        }
        other => panic!("expected Hook error, got {other:?}"),
    }
    // Neither modifyConfig nor the command ever ran.
    assert!(entries(&log).is_empty());
    assert_eq!(core.phase(), RunPhase::Failed);
    assert_eq!(core.config(), &json!({}));
}

#[tokio::test]
async fn unknown_command_invokes_no_handler() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    let log2 = log.clone();
    let resolver = RegistryResolver::new().with(
        "base",
        SetupFn(move |api: &mut PluginApi<'_>| {
            let log = log2.clone();
            api.register_command("build", move |_args| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("command:build".to_string());
                    Ok(())
                }
            });
            Ok(Contribution::default())
        }),
    );

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins.push("base".into());
    });
    let err = core.run(RunOptions::new("deploy")).await.unwrap_err();

    assert!(matches!(err, CoreError::CommandNotFound(name) if name == "deploy"));
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn failing_factory_aborts_initialization() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    let resolver = RegistryResolver::new()
        .with(
            "bad",
            SetupFn(|_api: &mut PluginApi<'_>| Err(anyhow::anyhow!("no license"))),
        )
        .with(
            "after",
            recording(log.clone(), "after", Contribution::default()),
        );

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins.extend(["bad".into(), "after".into()]);
    });
    let err = core.run(RunOptions::new("build")).await.unwrap_err();

    match err {
        CoreError::PluginInit { id, .. } => assert_eq!(id, "bad"),
        other => panic!("expected PluginInit, got {other:?}"),
    }
    // The plugin queued after the failing one never initialized.
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn api_exposes_live_state_and_attribution() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("kiln.config.yaml"), "target: wasm\n").unwrap();

    let seen = Arc::new(Mutex::new(Value::Null));
    let seen2 = seen.clone();
    let resolver = RegistryResolver::new()
        .with(
            "probe",
            SetupFn(move |api: &mut PluginApi<'_>| {
                // User config is already loaded by the time factories run.
                *seen2.lock().unwrap() = api.user_config().clone();
                anyhow::ensure!(api.env() == Env::Development);
                anyhow::ensure!(api.plugin_id().as_str() == "probe");
                api.register_hook(keys::ON_CHECK, HookKind::Event, |_memo, _args| async {
                    Ok(None)
                })?;
                Ok(Contribution::default())
            }),
        )
        .with("cmd", with_command("build"));

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins.extend(["probe".into(), "cmd".into()]);
    });
    core.run(RunOptions::new("build")).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), json!({"target": "wasm"}));
    // Registrations are attributed to the plugin that made them.
    assert_eq!(core.hooks().hooks_for_plugin(&"probe".into()).len(), 1);
    assert_eq!(
        core.commands().get("build").unwrap().plugin.as_str(),
        "cmd"
    );
}

#[tokio::test]
async fn duplicate_command_keeps_later_registration() {
    let dir = TempDir::new().unwrap();
    let log = new_log();

    let make = |log: Log, tag: &'static str| {
        SetupFn(move |api: &mut PluginApi<'_>| {
            let log = log.clone();
            api.register_command("build", move |_args| {
                let log = log.clone();
                let tag = tag.to_string();
                async move {
                    log.lock().unwrap().push(tag);
                    Ok(())
                }
            });
            Ok(Contribution::default())
        })
    };

    let resolver = RegistryResolver::new()
        .with("first", make(log.clone(), "first"))
        .with("second", make(log.clone(), "second"));

    let mut core = core_in(&dir, resolver, |opts| {
        opts.plugins.extend(["first".into(), "second".into()]);
    });
    core.run(RunOptions::new("build")).await.unwrap();

    assert_eq!(entries(&log), vec!["second"]);
}
