//! Scan callback that advances the simulated world and runs auto-enter.
//!
//! After each proximity scan the callback moves every simulated player
//! one step and gives opted-in players a chance to auto-enter.

use std::sync::Arc;

use arena_core::auto_enter::AutoEnterService;
use arena_core::{PlayerSource, ProximityMonitor, ScanCallback, ScanSummary};
use chrono::Utc;
use tracing::{debug, info};

use crate::sim::SimWorld;

/// Bridges proximity scans to the simulated world.
pub struct EngineCallback {
    world: Arc<SimWorld>,
    auto_enter: Arc<AutoEnterService>,
    auto_entries: usize,
}

impl EngineCallback {
    /// Create a callback over the given world and auto-enter service.
    pub const fn new(world: Arc<SimWorld>, auto_enter: Arc<AutoEnterService>) -> Self {
        Self {
            world,
            auto_enter,
            auto_entries: 0,
        }
    }

    /// Players entered through auto-enter so far.
    pub const fn auto_entries(&self) -> usize {
        self.auto_entries
    }
}

impl ScanCallback for EngineCallback {
    fn on_scan(&mut self, summary: &ScanSummary, monitor: &ProximityMonitor) {
        let players = self.world.connected_players();
        let entered = self.auto_enter.process_all(&players, Utc::now());
        self.auto_entries = self.auto_entries.saturating_add(entered);

        let registry = monitor.registry();
        let arena_id = monitor.settings().arena_id;
        if summary.entered > 0 || summary.exited > 0 || entered > 0 {
            info!(
                arena_id = %arena_id,
                members = registry.active_player_count(arena_id),
                proximity_entered = summary.entered,
                proximity_exited = summary.exited,
                auto_entered = entered,
                "Arena membership changed"
            );
        } else {
            debug!(tracked = monitor.tracked_players(), "Scan quiet");
        }

        self.world.step();
    }
}
