//! Per-contact conversation state.

pub mod model;
pub mod store;

pub use model::{ActiveFlow, ConversationState, FlowOutcome, Selections};
pub use store::{MemoryStateStore, StateStore};
