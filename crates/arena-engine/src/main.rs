//! Arena engine binary.
//!
//! Runs the arena system against a simulated world: loads configuration,
//! activates the configured zones, and drives the proximity monitor from
//! the host loop until Ctrl-C or the tick limit, then tears every zone
//! down.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `arena-config.yaml` (or `ARENA_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the simulated lifecycle, spawners, and players
//! 4. Create the zone registry and arena services
//! 5. Activate configured zones through the admin console
//! 6. Run the host loop
//! 7. Shut down: deactivate all zones, clear monitor and auto-enter state

mod error;
mod scan_callback;
mod sim;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arena_core::auto_enter::AutoEnterService;
use arena_core::{
    ArenaConfig, CommandContext, CommandDispatcher, HostControl, ProximityDeps, ProximityMonitor, PvpAutomationGate,
    ZoneCommand, runner,
};
use arena_types::PlayerId;
use arena_zone::{SpawnerKind, ZoneCollaborators, ZoneRegistry};
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::scan_callback::EngineCallback;
use crate::sim::{LogMarkers, SimConfig, SimLifecycle, SimSpawner, SimWorld};

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "arena-config.yaml";

/// Player id the admin console issues commands as.
const CONSOLE_PLAYER: PlayerId = PlayerId::new(0);

/// Application entry point for the arena engine.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or a startup
/// command is rejected.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = config_path();
    let config = ArenaConfig::load_or_default(&config_path).map_err(EngineError::from)?;
    let sim_config = load_sim_config(&config_path)?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        path = %config_path.display(),
        enter_radius = config.proximity.enter_radius,
        exit_radius = config.proximity.exit_radius,
        scan_interval_seconds = config.proximity.interval_seconds,
        configured_zones = config.zones.len(),
        "arena-engine starting"
    );

    // 3. Simulated collaborators.
    let lifecycle = Arc::new(SimLifecycle::new());
    let structures = Arc::new(SimSpawner::new(SpawnerKind::Structures, sim_config.structures_per_zone));
    let decorations = Arc::new(SimSpawner::new(SpawnerKind::Decorations, 0));
    let spawners = (Arc::clone(&structures), Arc::clone(&decorations));
    let markers = Arc::new(LogMarkers::default());

    // 4. Registry and services.
    let registry = Arc::new(ZoneRegistry::new(
        config.registry_settings(),
        ZoneCollaborators {
            structures,
            decorations,
            lifecycle,
        },
    ));
    let auto_enter = Arc::new(AutoEnterService::new(config.auto_enter_settings(), Arc::clone(&registry)));
    let proximity_settings = config.proximity_settings();
    let dispatcher = CommandDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&auto_enter),
        Arc::new(PvpAutomationGate::new()),
        proximity_settings.arena_id,
        proximity_settings.arena_label.clone(),
    );

    // 5. Activate zones through the admin console.
    let console = CommandContext {
        player_id: CONSOLE_PLAYER,
        position: None,
        is_admin: true,
        now: Utc::now(),
    };
    let mut startup = Vec::new();
    for definition in &config.zones {
        startup.push(ZoneCommand::Activate {
            arena_id: definition.arena_id,
            zone: Some(definition.zone.clone()),
        });
    }
    if !config.zones.iter().any(|d| d.arena_id == proximity_settings.arena_id) {
        startup.push(ZoneCommand::Activate {
            arena_id: proximity_settings.arena_id,
            zone: None,
        });
    }
    startup.push(ZoneCommand::Status);
    for command in startup {
        log_replies(&dispatcher.dispatch(&console, command).map_err(EngineError::from)?);
    }

    info!(
        arena_id = %proximity_settings.arena_id,
        structures = spawners.0.live_count(proximity_settings.arena_id),
        decorations = spawners.1.live_count(proximity_settings.arena_id),
        "Arena props placed"
    );

    // Players roam around the zone they are admitted to.
    let roam_center = registry
        .zone_state(proximity_settings.arena_id)
        .map_or_else(|| config.registry_settings().default_zone.synthesize().center, |s| s.zone.center);
    let world = Arc::new(SimWorld::new(&sim_config, roam_center));
    enable_auto_enter(&dispatcher, &world, sim_config.auto_enter_every);

    // 6. Host loop.
    let mut monitor = ProximityMonitor::new(
        proximity_settings,
        ProximityDeps {
            registry: Arc::clone(&registry),
            players: world.clone(),
            markers: markers.clone(),
        },
    );
    let control = Arc::new(HostControl::new(config.host.tick_interval_ms, config.host.max_ticks));
    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, stopping"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C, stopping"),
            }
            control.request_stop();
        });
    }

    let mut callback = EngineCallback::new(Arc::clone(&world), Arc::clone(&auto_enter));
    let result = runner::run_host_loop(&mut monitor, &control, &mut callback).await;

    // 7. Shutdown.
    log_replies(&dispatcher.dispatch(&console, ZoneCommand::Status).map_err(EngineError::from)?);
    let summary = runner::shutdown(&registry, &mut monitor, &auto_enter);

    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        total_scans = result.total_scans,
        auto_entries = callback.auto_entries(),
        marker_refreshes = markers.refreshes(),
        zones_removed = summary.removed,
        "arena-engine shutdown complete"
    );

    Ok(())
}

/// Resolve the config path from `ARENA_CONFIG`, or the default.
fn config_path() -> PathBuf {
    std::env::var_os("ARENA_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the `simulation` section of the config file.
///
/// A missing file or section yields defaults.
fn load_sim_config(path: &Path) -> Result<SimConfig, EngineError> {
    if !path.exists() {
        return Ok(SimConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Simulation {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Simulation {
        message: format!("failed to parse config YAML: {e}"),
    })?;
    match raw.get("simulation") {
        Some(section) => serde_yml::from_value(section.clone()).map_err(|e| EngineError::Simulation {
            message: format!("failed to parse simulation config: {e}"),
        }),
        None => Ok(SimConfig::default()),
    }
}

/// Opt every `every`-th simulated player into auto-enter.
fn enable_auto_enter(dispatcher: &CommandDispatcher, world: &SimWorld, every: u32) {
    for player in world.player_ids() {
        if player.into_inner().checked_rem(u64::from(every)) != Some(0) {
            continue;
        }
        let context = CommandContext {
            player_id: player,
            position: None,
            is_admin: false,
            now: Utc::now(),
        };
        match dispatcher.dispatch(&context, ZoneCommand::AutoEnter { enabled: true }) {
            Ok(replies) => log_replies(&replies),
            Err(e) => warn!(player_id = %player, error = %e, "auto-enter opt-in failed"),
        }
    }
}

fn log_replies(replies: &[String]) {
    for line in replies {
        info!("{line}");
    }
}
