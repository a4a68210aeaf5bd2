//! Apply command

use crate::backend::DirBackend;
use crate::manifest::Manifest;
use crate::ui::{self, ConsoleListener};
use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tend_core::{
    ApplyBackend, BackendRegistry, Coordinator, CoordinatorHandle, MemoryBackend, RetrySignal,
};
use tend_schema::{ActiveTags, ResourceKind, ResourceUrl};

/// Converge the runtime on `manifest_path`.
pub async fn apply(
    manifest_path: &Path,
    root: Option<&Path>,
    watch: bool,
    dry_run: bool,
) -> Result<()> {
    let manifest = Manifest::load(manifest_path).await?;
    let specs = manifest.resource_specs(manifest_path).await?;

    let backends = Arc::new(BackendRegistry::new(RetrySignal::new()));
    for kind in ResourceKind::ALL {
        let backend: Arc<dyn ApplyBackend> = if dry_run {
            Arc::new(MemoryBackend::new())
        } else {
            let root = match root {
                Some(root) => root.to_path_buf(),
                None => crate::default_root()
                    .context("Could not determine home directory; pass --root")?,
            };
            Arc::new(DirBackend::new(root, kind))
        };
        backends.register(kind, backend);
    }
    if dry_run {
        println!("Dry run: applying against an in-memory runtime.");
    }

    let (coordinator, handle) = Coordinator::new(manifest.engine.clone(), backends);
    let mut registered = BTreeSet::new();
    for spec in specs {
        registered.insert(spec.url.clone());
        handle.register(spec)?;
    }
    tracing::debug!("Registered {} resource(s)", registered.len());

    if watch {
        watch_manifest(coordinator, &handle, manifest_path, manifest, registered).await?;
    } else {
        let mut coordinator = coordinator;
        loop {
            let report = coordinator.run_cycle().await;
            if report.pending == 0 || report.succeeded() == 0 {
                break;
            }
        }
    }

    let state = handle.state();
    println!("{}", ui::state_table(&state));
    println!("{}", ui::summary(&state));
    let errors = state.errors().count();
    if errors > 0 {
        bail!("{errors} resource(s) failed to apply");
    }
    Ok(())
}

/// Run the coordinator in the background, re-reading the manifest every
/// idle period until Ctrl-C.
async fn watch_manifest(
    coordinator: Coordinator,
    handle: &CoordinatorHandle,
    path: &Path,
    mut manifest: Manifest,
    mut registered: BTreeSet<ResourceUrl>,
) -> Result<()> {
    let interval = manifest.engine.idle_timeout();
    let worker = coordinator.with_listener(Arc::new(ConsoleListener)).spawn();
    println!("Watching {} (Ctrl-C to stop)", path.display());

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            () = tokio::time::sleep(interval) => {
                match reload(handle, path, &manifest.engine.tags, &registered).await {
                    Ok((next, urls)) => {
                        manifest = next;
                        registered = urls;
                    }
                    Err(e) => tracing::warn!("Keeping previous manifest: {e:#}"),
                }
            }
        }
    }

    handle.shutdown();
    worker.await.context("Coordinator task failed")?;
    Ok(())
}

/// Submit the current manifest. Unchanged resources merge as no-ops;
/// resources that disappeared are withdrawn.
async fn reload(
    handle: &CoordinatorHandle,
    path: &Path,
    tags: &ActiveTags,
    previous: &BTreeSet<ResourceUrl>,
) -> Result<(Manifest, BTreeSet<ResourceUrl>)> {
    let manifest = Manifest::load(path).await?;
    let specs = manifest.resource_specs(path).await?;

    if manifest.engine.tags != *tags {
        handle.set_active_tags(manifest.engine.tags.clone())?;
    }
    let mut urls = BTreeSet::new();
    for spec in specs {
        urls.insert(spec.url.clone());
        handle.register(spec)?;
    }
    for gone in previous.difference(&urls) {
        tracing::info!("{gone} left the manifest");
        handle.unregister(gone.clone())?;
    }
    Ok((manifest, urls))
}
