//! Command/query-separated state: a pure reducer over immutable snapshots
//! plus a store that applies commands and broadcasts events.

mod command;
mod store;

pub use command::{reduce, Command, Snapshot};
pub use store::StateStore;
