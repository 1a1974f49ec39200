//! Domain model (ids, item states, retry decisions).

pub mod decision;
pub mod ids;
pub mod state;

pub use decision::{Decision, FailReason};
pub use ids::ItemId;
pub use state::ItemState;
