pub mod store;
pub mod types;

pub use store::{Outcome, StateStore};
pub use types::{Counts, GlobalState, TodayState, UpstreamState};
