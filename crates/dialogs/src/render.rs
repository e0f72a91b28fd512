//! Document rendering seam.

use thiserror::Error;

use crate::store::{Category, EntryImage};

/// Everything needed to render one entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryDocument<'a> {
    pub topic: &'a str,
    pub name: &'a str,
    pub content: &'a str,
    pub category: Category,
    pub image: Option<&'a EntryImage>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),

    #[error("document is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("render failed: {0}")]
    Failed(String),
}

pub trait Renderer: Send + Sync {
    fn render(&self, document: &EntryDocument<'_>) -> Result<RenderedDocument, RenderError>;
}
