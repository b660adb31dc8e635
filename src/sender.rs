//! Outbound message sender abstraction.
//!
//! The wire-level WhatsApp client lives outside this crate; the core only
//! describes *what* to send. Implementations must report acceptance by the
//! provider — conversation state is mutated only after a send is accepted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SendError;
use crate::router::ResolvedChannel;

/// A reply button (`{id, label}` pair) on an interactive message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub label: String,
}

impl Button {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// One row of an interactive list message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
        }
    }
}

/// A titled section of list rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Provider-assigned id of an accepted outbound message.
pub type MessageId = String;

/// Sends messages through a resolved business channel.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send_text(
        &self,
        channel: &ResolvedChannel,
        to: &str,
        text: &str,
    ) -> Result<MessageId, SendError>;

    async fn send_buttons(
        &self,
        channel: &ResolvedChannel,
        to: &str,
        body: &str,
        buttons: &[Button],
    ) -> Result<MessageId, SendError>;

    async fn send_list(
        &self,
        channel: &ResolvedChannel,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<MessageId, SendError>;

    async fn send_template(
        &self,
        channel: &ResolvedChannel,
        to: &str,
        name: &str,
        language: &str,
        components: Option<&serde_json::Value>,
    ) -> Result<MessageId, SendError>;
}
