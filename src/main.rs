//! Two simulated clients editing one board through the in-memory backend.

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use board_sync::clock::SystemClock;
use board_sync::presence::Participant;
use board_sync::remote::memory::{MemoryRemote, PresenceHub};
use board_sync::viewport::ViewportState;
use board_sync::{NewShape, ShapeKind, ShapePatch, SyncClient, SyncConfig, SyncError};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "demo failed");
            ExitCode::FAILURE
        }
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::from_env()?;
    let clock = Arc::new(SystemClock);
    let remote = MemoryRemote::new(clock.clone());
    let hub = PresenceHub::new();

    let (ada, mut ada_notices) = SyncClient::new(
        config.clone(),
        Arc::new(remote.clone()),
        Arc::new(hub.join(Participant::new("u-ada", Some("Ada".into())))),
        clock.clone(),
    );
    let (ben, _ben_notices) = SyncClient::new(
        config,
        Arc::new(remote.clone()),
        Arc::new(hub.join(Participant::new("u-ben", Some("Ben".into())))),
        clock,
    );
    let ada_tasks = ada.spawn_sync_tasks();
    let ben_tasks = ben.spawn_sync_tasks();

    // Create and move.
    let id = ada.create_entity(NewShape::new(ShapeKind::Sticky, 40.0, 40.0, 160.0, 120.0).with_text("hello")).await?;
    settle().await;
    info!(%id, seen_by_ben = ben.get(&id).is_some(), "sticky created");

    let version = ben.mutate(id, ShapePatch::position(120.0, 60.0)).await?;
    settle().await;
    info!(?version, ada_x = ada.get(&id).map(|e| e.x), "ben moved the sticky");

    // Ben drags while Ada's client still thinks the sticky is where it was.
    let mut drag = ben.begin_gesture(id)?;
    drag.preview(ShapePatch::position(400.0, 60.0))?;
    settle().await;
    if let Some(lock) = ada.get_edit_lock(&id) {
        info!(holder = %lock.holder_label, "ada sees the edit indicator");
    }
    drag.commit().await?;

    // Ada's stale write loses the race only if she edits before the push arrives.
    let base = ada.get(&id).map_or(0, |e| e.version);
    match ada.mutate(id, ShapePatch::size(200.0, 200.0)).await {
        Ok(v) => info!(base, ?v, "ada resized"),
        Err(SyncError::VersionConflict { .. }) => {
            if let Some(notice) = ada_notices.recv().await {
                warn!(message = %notice.message, "ada was told");
            }
        }
        Err(e) => return Err(e.into()),
    }

    // Culling: a far-away shape is skipped unless selected.
    let far = ada.create_entity(NewShape::new(ShapeKind::Ellipse, 5_000.0, 5_000.0, 50.0, 50.0)).await?;
    let viewport = ViewportState::new(1280.0, 720.0);
    let visible = ada.visible_entities(&viewport, &HashSet::new()).len();
    let with_selection = ada.visible_entities(&viewport, &HashSet::from([far])).len();
    info!(total = ada.all().len(), visible, with_selection, "culled render set");

    ada.delete_entity(far).await?;
    settle().await;
    info!(ben_count = ben.all().len(), "far shape deleted");

    ada_tasks.shutdown().await;
    ben_tasks.shutdown().await;
    Ok(())
}
