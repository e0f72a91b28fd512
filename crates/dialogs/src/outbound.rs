//! Chat transport seam.

use {async_trait::async_trait, lorebot_common::ChatId};

use crate::{event::ImageRef, render::RenderedDocument};

/// An inline button after localization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSpec {
    pub label: String,
    pub data: String,
}

/// A localized text message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub buttons: Vec<Vec<ButtonSpec>>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }
}

/// Sends messages and fetches user-supplied files.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    async fn send_text(&self, chat: ChatId, message: &OutboundMessage) -> anyhow::Result<()>;

    async fn send_document(
        &self,
        chat: ChatId,
        document: &RenderedDocument,
        caption: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Remove the inline keyboard from a message whose button was consumed.
    async fn clear_keyboard(&self, _chat: ChatId, _message_id: i32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn fetch_image(&self, image: &ImageRef) -> anyhow::Result<Vec<u8>>;
}
