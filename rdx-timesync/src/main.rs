use anyhow::Result;
use colored::Colorize;
use std::env;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use timesync::demo::{demo_dataset, register_console_views};
use timesync::prelude::*;
use timesync::{ENGINE_NAME, VERSION};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration, if a path was given.
    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SyncConfig::from_file(&path)?
        }
        None => SyncConfig::default(),
    };
    info!("{} v{}", ENGINE_NAME.cyan(), VERSION);

    // 3. Create the engine and load a two-minute synthetic drive.
    let engine = SyncEngine::new(config);
    let dataset = demo_dataset(120);

    // 4. Spawn a task that logs everything the engine decides.
    spawn_event_listener(&engine);

    // 5. Register one console view per role, then load the data.
    let muted = Arc::new(AtomicBool::new(false));
    let views = register_console_views(&engine, &dataset, &muted);
    info!("{} console views registered.", views.len());
    engine.load_dataset(&dataset);

    // 6. Play a short scrub session against the running frame loop.
    spawn_scripted_session(&engine);

    // 7. Run the engine.
    engine.run().await?;

    Ok(())
}

fn spawn_event_listener(engine: &SyncEngine) {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::ViewportChanged { start_label, end_label, origin, .. } => {
                    info!("[VIEWPORT] {} .. {} ({:?})", start_label, end_label, origin);
                }
                SyncEvent::ConsumerFailed { name, reason, .. } => {
                    warn!("[CONSUMER] {} failed: {}", name, reason);
                }
                other => info!("[EVENT] => {:?}", other),
            }
        }
    });
}

/// Drives the engine the way a user would: hover a chart, narrow the window
/// with the right handle, pan it, zoom and finally leave the chart.
fn spawn_scripted_session(engine: &SyncEngine) {
    let engine = engine.clone();
    tokio::spawn(async move {
        let pause = Duration::from_millis(400);
        let Some((start, end)) = engine.visible_range() else {
            warn!("No data loaded; scripted session skipped.");
            return;
        };
        let scrubber = engine.scrubber();
        scrubber.resize(1_000.0);
        tokio::time::sleep(pause).await;

        for step in 1..=4 {
            let time = start + (end - start) * step / 5;
            engine.hover_time(time, SourceKind::Chart);
            tokio::time::sleep(pause).await;
        }

        if let Err(err) = scrubber.pointer_down(Some(ScrubTarget::RightHandle), 1_000.0) {
            warn!("Scripted drag failed: {}", err);
            return;
        }
        for x in [900.0, 750.0, 600.0] {
            scrubber.pointer_move(x);
            tokio::time::sleep(pause).await;
        }
        scrubber.pointer_up();

        scrubber.pointer_down(Some(ScrubTarget::Body), 300.0).ok();
        scrubber.pointer_move(500.0);
        scrubber.pointer_up();
        tokio::time::sleep(pause).await;

        scrubber.zoom_in();
        tokio::time::sleep(pause).await;
        engine.hover_track(500.0, 1_000.0, SourceKind::Timeline);
        tokio::time::sleep(pause).await;

        engine.pointer_leave();
        engine.pointer_leave();
        tokio::time::sleep(pause).await;

        scrubber.reset();
        info!("Scripted session finished. Press Ctrl+C to exit.");
    });
}
