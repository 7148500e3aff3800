//! HIDPilot daemon entry point.
//!
//! Wires together the gadget report sink, the keyboard engine, and the
//! macro service, then parks until a shutdown signal arrives.
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML + environment overrides
//!  └─ KeyboardEngine::spawn()  -- single owner of state + device writes
//!  └─ MacroService::new()      -- record / persist / replay facade
//!  └─ ctrl_c().await           -- park; the transport drives the service
//!  └─ service.shutdown()       -- cancel replay, release all keys
//! ```
//!
//! The remote control transport (how key notifications arrive over the
//! network) is an external collaborator: it is handed the [`MacroService`]
//! constructed here and calls `press`/`release`/`play`/… on it. Everything
//! below that surface (encoding, arbitration, recording, replay) lives in
//! this crate and is exercised directly by the integration tests.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hidpilot_daemon::application::keyboard_engine::KeyboardEngine;
use hidpilot_daemon::application::macro_service::MacroService;
use hidpilot_daemon::infrastructure::sink::{gadget::GadgetSink, ReportSink};
use hidpilot_daemon::infrastructure::storage::config::load_config;
use hidpilot_daemon::infrastructure::storage::recordings::RecordingStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    // Initialise structured logging. RUST_LOG wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level)),
        )
        .init();

    info!("HIDPilot daemon starting");

    let recordings_dir = config
        .recordings_dir()
        .context("failed to resolve recordings directory")?;

    let sink: Arc<dyn ReportSink> = Arc::new(GadgetSink::new(&config.device.hid_path));
    let (keyboard, engine_task) = KeyboardEngine::spawn(sink);

    // Bring gadget and state to a known all-released baseline. A missing
    // device node is logged rather than fatal so the daemon can come up
    // before the gadget function is configured.
    if let Err(e) = keyboard.reset().await {
        warn!("initial reset failed (is the gadget configured?): {e}");
    }

    let mut service = MacroService::new(keyboard.clone(), RecordingStore::new(recordings_dir));

    info!(
        device = %config.device.hid_path.display(),
        "HIDPilot daemon ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    // Cancel any replay and release every held key before exiting, so the
    // host is never left with a stuck keyboard.
    service.shutdown().await;

    drop(service);
    drop(keyboard);
    engine_task.await.context("engine task failed")?;

    info!("HIDPilot daemon stopped");
    Ok(())
}
