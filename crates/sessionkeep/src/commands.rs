//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use sessionkeep_core::Error;
use sessionkeep_core::config::Config;
use sessionkeep_core::controller::ControllerHandle;
use sessionkeep_core::error::StoreError;
use sessionkeep_core::kitty::KittyRemote;
use sessionkeep_core::sessionizer::{OpenOutcome, Sessionizer, capture_choice, project_candidates};
use sessionkeep_core::snapshot::SnapshotExtractor;
use sessionkeep_core::store::{StoreHandle, open_store};
use sessionkeep_core::topology::SessionName;
use sessionkeep_core::watcher::{ChangeWatcher, WatchEvent};
use tracing::info;

fn store(config: &Config) -> Result<StoreHandle, Error> {
    Ok(open_store(&config.store)?)
}

fn controller(config: &Config) -> ControllerHandle {
    Arc::new(KittyRemote::from_config(&config.controller))
}

fn extractor(config: &Config) -> SnapshotExtractor {
    SnapshotExtractor::new(config.controller.shell_wrapper_token.clone())
        .with_excluded_commands(config.watcher.excluded_prompt_commands.clone())
}

fn session_name(name: &str) -> Result<SessionName, Error> {
    Ok(SessionName::new(name)?)
}

fn watcher(config: &Config) -> Result<ChangeWatcher, Error> {
    Ok(ChangeWatcher::new(
        controller(config),
        store(config)?,
        extractor(config),
        &config.watcher,
    ))
}

pub async fn open(config: &Config, answer: &str, origin: Option<u64>) -> anyhow::Result<()> {
    if answer.trim().is_empty() {
        info!("no project chosen");
        return Ok(());
    }
    let Some(project_dir) = capture_choice(answer) else {
        bail!("not a project directory: {}", answer.trim());
    };

    let sessionizer = Sessionizer::new(
        controller(config),
        store(config)?,
        extractor(config),
        config.replay.clone(),
    );
    match sessionizer.apply(&project_dir, origin).await? {
        OpenOutcome::Replayed { session, report } => {
            println!(
                "Restored session {session}: {} windows in {} tabs",
                report.windows_launched, report.tabs_created
            );
            for layout in &report.skipped_layouts {
                println!("  unknown layout skipped: {layout}");
            }
        }
        OpenOutcome::Created { session, window_id } => {
            println!("Started session {session} in window {window_id}");
        }
    }
    Ok(())
}

pub fn pick(root: &Path) -> anyhow::Result<()> {
    let candidates = project_candidates(root)
        .with_context(|| format!("cannot list projects under {}", root.display()))?;
    for dir in candidates {
        println!("{}", dir.display());
    }
    Ok(())
}

pub async fn event(config: &Config, json: &str) -> anyhow::Result<()> {
    let event: WatchEvent = serde_json::from_str(json).map_err(Error::from)?;
    let outcome = watcher(config)?.handle(&event).await;
    println!("{}", serde_json::to_string(&outcome).map_err(Error::from)?);
    Ok(())
}

pub async fn watch(config: &Config) -> anyhow::Result<()> {
    let watcher = watcher(config)?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let handled = watcher.run(stdin).await.map_err(Error::from)?;
    info!(handled, "event stream closed");
    Ok(())
}

pub fn list(config: &Config, json: bool) -> anyhow::Result<()> {
    let names = store(config)?.list().map_err(Error::from)?;
    if json {
        println!("{}", serde_json::to_string(&names).map_err(Error::from)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

pub fn show(config: &Config, name: &str) -> anyhow::Result<()> {
    let model = store(config)?
        .lookup(&session_name(name)?)
        .map_err(Error::from)?;
    println!("{}", serde_json::to_string_pretty(&model).map_err(Error::from)?);
    Ok(())
}

pub fn forget(config: &Config, name: &str) -> anyhow::Result<()> {
    let name = session_name(name)?;
    if store(config)?.delete(&name).map_err(Error::from)? {
        println!("Forgot session {name}");
        Ok(())
    } else {
        Err(Error::Store(StoreError::NotFound(name.to_string())).into())
    }
}

pub fn config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_toml().map_err(Error::from)?);
    Ok(())
}
