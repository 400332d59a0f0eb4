//! # Dreamgoal Core Library
//!
//! Goal consistency and scoring engine. Users keep "dreams", set weekly,
//! monthly, or deadline goals against them, and earn points for completions.
//! Every operation is available through the `dreamgoal` CLI, which is a thin
//! layer over this crate.
//!
//! ## Architecture
//!
//! - **Calendar**: ISO-8601 week math; all functions take the reference week
//!   explicitly, with a [`Clock`] supplying "now"
//! - **Streaks**: forward-only consecutive completion counts that gate
//!   automatic goal completion
//! - **Lifecycle**: [`GoalManager`] sequences compute, persist, dispatch, and
//!   award for every mutation, serialized per goal
//! - **State**: a pure reducer over immutable [`Snapshot`]s with a typed
//!   [`Event`] broadcast channel
//! - **Store**: the [`ItemStore`] trait with memory, SQLite, and HTTP backends
//!
//! ## Key Components
//!
//! - [`GoalManager`]: goal lifecycle operations
//! - [`StateStore`]: in-memory state and subscriptions
//! - [`ItemStore`]: persistence collaborator
//! - [`Config`]: TOML configuration

pub mod calendar;
pub mod config;
pub mod error;
pub mod events;
pub mod goal;
pub mod lifecycle;
pub mod scoring;
pub mod state;
pub mod store;
pub mod streak;

pub use calendar::{current_iso_week, Clock, FixedClock, SystemClock, WeekId};
pub use config::{Config, StoreBackend, StoreConfig};
pub use error::{ConfigError, CoreError, GoalError, StoreError, ValidationError};
pub use events::Event;
pub use goal::{
    Dream, DreamPatch, DreamSpec, Goal, GoalKind, GoalSpec, Recurrence, WeeklyGoalInstance,
    WeeklyGoalTemplate,
};
pub use lifecycle::{AwardStatus, GoalManager, ToggleOutcome};
pub use scoring::{ScoringEntry, ScoringRules, ScoringSource};
pub use state::{Command, Snapshot, StateStore};
pub use store::{open_store, HttpItemStore, ItemStore, MemoryStore, SqliteItemStore};
pub use streak::{compute_streak, GoalProgress};
