//! Arena entry and exit orchestration on top of the zone registry.
//!
//! This crate turns player positions and commands into registry and
//! lifecycle calls. Every trigger source (proximity, auto-enter, player
//! commands) goes through the same enter and exit sequences in
//! [`transition`].
//!
//! # Modules
//!
//! - [`config`] -- Loading `arena-config.yaml` into typed settings
//! - [`transition`] -- Shared enter/exit sequences
//! - [`proximity`] -- Fixed-interval proximity monitor with hysteresis
//! - [`auto_enter`] -- Opt-in automatic entry with a cooldown
//! - [`gate`] -- Capability gate for automation scripts
//! - [`command`] -- Typed admin and player commands
//! - [`runner`] -- Host loop, stop control, and shutdown

pub mod auto_enter;
pub mod command;
pub mod config;
pub mod gate;
pub mod proximity;
pub mod runner;
pub mod transition;

pub use auto_enter::{AutoEnterOutcome, AutoEnterService, AutoEnterSettings};
pub use command::{CommandContext, CommandDispatcher, CommandError, ZoneCommand};
pub use config::{ArenaConfig, ConfigError};
pub use gate::{AutomationContext, AutomationGate, GateDenial, PvpAutomationGate};
pub use proximity::{
    ConnectedPlayer, MarkerRefresher, NoOpMarkers, PlayerSource, ProximityDeps, ProximityMonitor,
    ProximitySettings, ScanSummary,
};
pub use runner::{HostControl, HostEndReason, HostResult, NoOpCallback, ScanCallback, run_host_loop, shutdown};
pub use transition::{EnterOutcome, ExitOutcome, TransitionError, enter_arena, exit_arena};
