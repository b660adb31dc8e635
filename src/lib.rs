//! Leadflow — guided WhatsApp conversation core.
//!
//! Turns inbound webhook events into flow-state transitions, outbound
//! prompts, silence reminders, and deduplicated CRM leads. The wire-level
//! WhatsApp client, the HTTP ingress, and durable persistence live outside
//! this crate and plug in through the [`sender::Sender`],
//! [`state::store::StateStore`], and [`sync::CrmClient`] seams.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod flow;
pub mod followup;
pub mod orchestrator;
pub mod router;
pub mod sender;
pub mod state;
pub mod sync;

pub use error::{Error, Result};
