//! Renders lore entries into standalone HTML documents.
//!
//! Entry content is markdown. Raw HTML inside the content is escaped rather
//! than passed through, and the entry image (if any) is embedded as a base64
//! data URI so the document has no external references.

use {
    base64::Engine,
    lorebot_dialogs::{
        render::{EntryDocument, RenderError, RenderedDocument, Renderer},
        store::Category,
    },
    pulldown_cmark::{Event, Options, Parser, html},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, histogram, labels, render as render_metrics};

/// Telegram bots may upload documents up to 50 MB.
pub const DEFAULT_SIZE_LIMIT: usize = 50 * 1024 * 1024;

const SUPPORTED_IMAGES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const STYLE: &str = "body{font-family:Georgia,serif;max-width:42em;margin:2em auto;padding:0 1em;\
line-height:1.5;color:#222}header p{color:#666;margin-top:0}\
figure{margin:1em 0}figure img{max-width:100%}\
.ranking h1::before{content:\"\\2605 \"}";

pub struct HtmlRenderer {
    size_limit: usize,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlRenderer {
    pub fn new() -> Self {
        Self {
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }

    pub fn with_size_limit(mut self, bytes: usize) -> Self {
        self.size_limit = bytes;
        self
    }

    fn build(&self, doc: &EntryDocument<'_>) -> Result<String, RenderError> {
        let class = match doc.category {
            Category::Standard => "standard",
            Category::Ranking => "ranking",
        };
        let mut out = String::with_capacity(doc.content.len() * 2 + 512);
        out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
        out.push_str(&format!(
            "<meta name=\"updated\" content=\"{}\"><title>{}</title><style>{STYLE}</style></head>",
            doc.updated_at,
            escape(doc.name)
        ));
        out.push_str(&format!(
            "<body class=\"{class}\"><header><h1>{}</h1><p>{}</p></header>",
            escape(doc.name),
            escape(doc.topic)
        ));

        if let Some(image) = doc.image {
            if !SUPPORTED_IMAGES.contains(&image.media_type.as_str()) {
                return Err(RenderError::UnsupportedImage(image.media_type.clone()));
            }
            let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
            out.push_str(&format!(
                "<figure><img src=\"data:{};base64,{encoded}\" alt=\"{}\"></figure>",
                image.media_type,
                escape(doc.name)
            ));
        }

        out.push_str("<main>");
        out.push_str(&markdown_to_html(doc.content));
        out.push_str("</main></body></html>\n");
        Ok(out)
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, doc: &EntryDocument<'_>) -> Result<RenderedDocument, RenderError> {
        let result = self.build(doc).and_then(|html| {
            let size = html.len();
            if size > self.size_limit {
                return Err(RenderError::TooLarge {
                    size,
                    limit: self.size_limit,
                });
            }
            Ok(RenderedDocument {
                file_name: file_name(doc.name),
                media_type: "text/html".into(),
                bytes: html.into_bytes(),
            })
        });

        #[cfg(feature = "metrics")]
        {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            counter!(render_metrics::DOCUMENTS_TOTAL, labels::OUTCOME => outcome).increment(1);
            if let Ok(rendered) = &result {
                histogram!(render_metrics::DOCUMENT_BYTES).record(rendered.bytes.len() as f64);
            }
        }

        match &result {
            Ok(rendered) => debug!(
                file = %rendered.file_name,
                bytes = rendered.bytes.len(),
                "entry rendered"
            ),
            Err(e) => debug!(entry = doc.name, error = %e, "entry render failed"),
        }
        result
    }
}

/// Convert markdown to HTML. Embedded HTML is shown as text.
fn markdown_to_html(md: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(md, opts).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    html_output
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// File name for an entry: letters and digits kept, everything else `_`.
fn file_name(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "entry.html".into()
    } else {
        format!("{stem}.html")
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        lorebot_common::EntryId,
        lorebot_dialogs::store::EntryImage,
        rstest::rstest,
    };

    fn doc<'a>(content: &'a str, image: Option<&'a EntryImage>) -> EntryDocument<'a> {
        EntryDocument {
            topic: "Ashfall",
            name: "Aëlin",
            content,
            category: Category::Standard,
            image,
            updated_at: 1_700_000_000,
        }
    }

    fn html(rendered: &RenderedDocument) -> String {
        String::from_utf8(rendered.bytes.clone()).unwrap()
    }

    #[test]
    fn renders_markdown_and_header() {
        let rendered = HtmlRenderer::new()
            .render(&doc("A **bold** heir.", None))
            .unwrap();
        assert_eq!(rendered.file_name, "Aëlin.html");
        assert_eq!(rendered.media_type, "text/html");
        let body = html(&rendered);
        assert!(body.contains("<strong>bold</strong>"));
        assert!(body.contains("<h1>Aëlin</h1>"));
        assert!(body.contains("<p>Ashfall</p>"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let rendered = HtmlRenderer::new()
            .render(&doc("<script>alert(1)</script>", None))
            .unwrap();
        let body = html(&rendered);
        assert!(!body.contains("<script>"));
        assert!(body.contains("&lt;script&gt;"));
    }

    #[test]
    fn embeds_image_as_data_uri() {
        let image = EntryImage {
            entry_id: EntryId(1),
            media_type: "image/png".into(),
            data: vec![1, 2, 3],
        };
        let rendered = HtmlRenderer::new().render(&doc("x", Some(&image))).unwrap();
        assert!(html(&rendered).contains("src=\"data:image/png;base64,AQID\""));
    }

    #[test]
    fn rejects_unsupported_image() {
        let image = EntryImage {
            entry_id: EntryId(1),
            media_type: "image/tiff".into(),
            data: vec![0],
        };
        let err = HtmlRenderer::new()
            .render(&doc("x", Some(&image)))
            .unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedImage(t) if t == "image/tiff"));
    }

    #[test]
    fn enforces_size_limit() {
        let err = HtmlRenderer::new()
            .with_size_limit(64)
            .render(&doc("long enough content", None))
            .unwrap_err();
        assert!(matches!(err, RenderError::TooLarge { limit: 64, .. }));
    }

    #[test]
    fn ranking_entries_get_marker_class() {
        let mut ranked = doc("x", None);
        ranked.category = Category::Ranking;
        let body = html(&HtmlRenderer::new().render(&ranked).unwrap());
        assert!(body.contains("<body class=\"ranking\">"));
    }

    #[rstest]
    #[case("Old Tom", "Old_Tom.html")]
    #[case("a/b", "a_b.html")]
    #[case("Jean-Luc", "Jean-Luc.html")]
    #[case("   ", "entry.html")]
    fn file_names(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(file_name(name), expected);
    }
}
