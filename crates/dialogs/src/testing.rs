//! Test doubles for the transport and renderer.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use {async_trait::async_trait, lorebot_common::ChatId};

use crate::{
    event::ImageRef,
    outbound::{ChatOutbound, OutboundMessage},
    render::{EntryDocument, RenderError, RenderedDocument, Renderer},
};

#[derive(Default)]
pub struct RecordingOutbound {
    messages: Mutex<Vec<(ChatId, OutboundMessage)>>,
    documents: Mutex<Vec<(ChatId, RenderedDocument)>>,
    cleared: Mutex<Vec<(ChatId, i32)>>,
    fail: AtomicBool,
}

impl RecordingOutbound {
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<(ChatId, OutboundMessage)> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn texts(&self) -> Vec<(ChatId, String)> {
        self.messages()
            .into_iter()
            .map(|(chat, m)| (chat, m.text))
            .collect()
    }

    pub fn documents(&self) -> Vec<(ChatId, String)> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(chat, d)| (*chat, d.file_name.clone()))
            .collect()
    }

    pub fn cleared(&self) -> Vec<(ChatId, i32)> {
        self.cleared.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("transport down");
        }
        Ok(())
    }
}

#[async_trait]
impl ChatOutbound for RecordingOutbound {
    async fn send_text(&self, chat: ChatId, message: &OutboundMessage) -> anyhow::Result<()> {
        self.check()?;
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((chat, message.clone()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatId,
        document: &RenderedDocument,
        _caption: Option<&str>,
    ) -> anyhow::Result<()> {
        self.check()?;
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((chat, document.clone()));
        Ok(())
    }

    async fn clear_keyboard(&self, chat: ChatId, message_id: i32) -> anyhow::Result<()> {
        self.cleared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((chat, message_id));
        Ok(())
    }

    async fn fetch_image(&self, image: &ImageRef) -> anyhow::Result<Vec<u8>> {
        Ok(format!("image:{}", image.file_id).into_bytes())
    }
}

/// Renders the entry name and content as plain bytes.
#[derive(Default)]
pub struct StubRenderer {
    pub fail: bool,
}

impl Renderer for StubRenderer {
    fn render(&self, document: &EntryDocument<'_>) -> Result<RenderedDocument, RenderError> {
        if self.fail {
            return Err(RenderError::Failed("stub".into()));
        }
        Ok(RenderedDocument {
            file_name: format!("{}.html", document.name),
            media_type: "text/html".into(),
            bytes: format!("{}\n{}", document.name, document.content).into_bytes(),
        })
    }
}
