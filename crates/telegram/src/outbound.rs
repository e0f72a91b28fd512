use {
    anyhow::Result,
    async_trait::async_trait,
    lorebot_common::ChatId,
    lorebot_dialogs::{
        event::ImageRef,
        outbound::{ButtonSpec, ChatOutbound, OutboundMessage},
        render::RenderedDocument,
    },
    std::{future::Future, time::Duration},
    teloxide::{
        ApiError, RequestError,
        payloads::{SendDocumentSetters, SendMessageSetters},
        prelude::*,
        types::{ChatId as TgChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId},
    },
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, histogram, labels, telegram as tg_metrics};

use crate::error::Error;

/// Telegram rejects text messages longer than this many bytes.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Captions are limited to this many characters.
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Sends dialog replies through one bot account.
pub struct TelegramOutbound {
    bot: Bot,
    account_id: String,
}

impl TelegramOutbound {
    pub fn new(bot: Bot, account_id: impl Into<String>) -> Self {
        Self {
            bot,
            account_id: account_id.into(),
        }
    }

    /// Run a request, sleeping through `RetryAfter` responses up to
    /// [`TELEGRAM_RETRY_AFTER_MAX_RETRIES`] times.
    async fn with_retry<T, F, Fut>(
        &self,
        chat: ChatId,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let account_id = self.account_id.as_str();
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => {
                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::MESSAGES_SENT_TOTAL, labels::OPERATION => operation)
                        .increment(1);
                    return Ok(value);
                },
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        #[cfg(feature = "metrics")]
                        counter!(tg_metrics::SEND_ERRORS_TOTAL, labels::OPERATION => operation)
                            .increment(1);
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            account_id,
                            chat_id = %chat,
                            operation,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        #[cfg(feature = "metrics")]
                        counter!(tg_metrics::SEND_ERRORS_TOTAL, labels::OPERATION => operation)
                            .increment(1);
                        return Err(err);
                    }

                    retries += 1;
                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::RETRY_AFTER_TOTAL).increment(1);
                    warn!(
                        account_id,
                        chat_id = %chat,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }

    /// Download a user-supplied file by its Telegram file ID.
    pub async fn download(&self, file_id: &str) -> crate::Result<Vec<u8>> {
        let file = self.bot.get_file(file_id).await?;
        let mut url = self.bot.api_url();
        url.set_path(&format!("file/bot{}/{}", self.bot.token(), file.path));

        let response = reqwest::get(url).await?;
        if !response.status().is_success() {
            return Err(Error::DownloadStatus {
                status: response.status().as_u16(),
            });
        }
        let data = response.bytes().await?.to_vec();

        #[cfg(feature = "metrics")]
        histogram!(tg_metrics::DOWNLOAD_BYTES).record(data.len() as f64);

        debug!(account_id = self.account_id, file_id, bytes = data.len(), "file downloaded");
        Ok(data)
    }
}

fn keyboard(rows: &[Vec<ButtonSpec>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Split text into chunks of at most `max_len` bytes, preferring newline then
/// space boundaries.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len || max_len == 0 {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while remaining.len() > max_len {
        let mut window = remaining.floor_char_boundary(max_len);
        if window == 0 {
            window = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
        }
        let slice = &remaining[..window];
        let split_at = match slice.rfind('\n').or_else(|| slice.rfind(' ')) {
            Some(0) | None => window,
            Some(i) => i,
        };
        chunks.push(&remaining[..split_at]);
        remaining = remaining[split_at..].trim_start_matches(['\n', ' ']);
    }
    if !remaining.is_empty() {
        chunks.push(remaining);
    }
    chunks
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

#[async_trait]
impl ChatOutbound for TelegramOutbound {
    async fn send_text(&self, chat: ChatId, message: &OutboundMessage) -> Result<()> {
        let chat_id = TgChatId(chat.0);
        let chunks = chunk_message(&message.text, TELEGRAM_MAX_MESSAGE_LEN);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = (i == last && !message.buttons.is_empty()).then(|| keyboard(&message.buttons));
            self.with_retry(chat, "send_message", || {
                let mut req = self.bot.send_message(chat_id, *chunk);
                if let Some(markup) = &markup {
                    req = req.reply_markup(markup.clone());
                }
                async move { req.await }
            })
            .await?;
        }
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatId,
        document: &RenderedDocument,
        caption: Option<&str>,
    ) -> Result<()> {
        let chat_id = TgChatId(chat.0);
        self.with_retry(chat, "send_document", || {
            let input =
                InputFile::memory(document.bytes.clone()).file_name(document.file_name.clone());
            let mut req = self.bot.send_document(chat_id, input);
            if let Some(caption) = caption {
                req = req.caption(truncate_chars(caption, TELEGRAM_CAPTION_LIMIT));
            }
            async move { req.await }
        })
        .await?;
        debug!(
            account_id = self.account_id,
            chat_id = %chat,
            file = %document.file_name,
            bytes = document.bytes.len(),
            "document sent"
        );
        Ok(())
    }

    async fn clear_keyboard(&self, chat: ChatId, message_id: i32) -> Result<()> {
        let chat_id = TgChatId(chat.0);
        let result = self
            .with_retry(chat, "clear_keyboard", || {
                let req = self.bot.edit_message_reply_markup(chat_id, MessageId(message_id));
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>> {
        Ok(self.download(&image.file_id).await?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::MockTelegramApi,
        rstest::rstest,
    };

    #[test]
    fn retry_after_duration_extracts_wait() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(42));
        assert_eq!(retry_after_duration(&err), Some(Duration::from_secs(42)));
    }

    #[test]
    fn retry_after_duration_ignores_other_errors() {
        let err = RequestError::Api(ApiError::BotBlocked);
        assert_eq!(retry_after_duration(&err), None);
    }

    #[test]
    fn detects_not_modified() {
        assert!(is_message_not_modified_error(&RequestError::Api(
            ApiError::MessageNotModified
        )));
        assert!(!is_message_not_modified_error(&RequestError::Api(
            ApiError::BotBlocked
        )));
    }

    #[rstest]
    #[case("short", 10, vec!["short"])]
    #[case("one two three", 8, vec!["one two", "three"])]
    #[case("line one\nline two", 12, vec!["line one", "line two"])]
    #[case("abcdefgh", 3, vec!["abc", "def", "gh"])]
    fn chunks(#[case] text: &str, #[case] max: usize, #[case] expected: Vec<&str>) {
        assert_eq!(chunk_message(text, max), expected);
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        let text = "ééééé";
        for chunk in chunk_message(text, 3) {
            assert!(chunk.len() <= 3);
        }
        assert_eq!(chunk_message(text, 3).concat(), text);
    }

    #[test]
    fn caption_truncates_by_chars() {
        assert_eq!(truncate_chars("ëëëë", 2), "ëë");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[tokio::test]
    async fn send_text_attaches_keyboard_to_last_chunk() {
        let api = MockTelegramApi::start().await;
        let outbound = TelegramOutbound::new(api.bot(), "test");
        let message = OutboundMessage {
            text: format!("{}\n{}", "a".repeat(4000), "b".repeat(200)),
            buttons: vec![vec![ButtonSpec {
                label: "Ashfall".into(),
                data: "topic:1".into(),
            }]],
        };
        outbound.send_text(ChatId(42), &message).await.unwrap();

        let sent = api.calls("SendMessage");
        assert_eq!(sent.len(), 2);
        assert!(sent[0].get("reply_markup").is_none());
        assert_eq!(
            sent[1]["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "topic:1"
        );
        assert_eq!(sent[1]["chat_id"], 42);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn fetch_image_downloads_file_bytes() {
        let api = MockTelegramApi::start().await;
        let outbound = TelegramOutbound::new(api.bot(), "test");
        let bytes = outbound
            .fetch_image(&ImageRef {
                file_id: "photo-1".into(),
                media_type: "image/jpeg".into(),
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"image-bytes");
        assert_eq!(api.calls("GetFile")[0]["file_id"], "photo-1");
        api.shutdown().await;
    }

    #[tokio::test]
    async fn clear_keyboard_edits_markup() {
        let api = MockTelegramApi::start().await;
        let outbound = TelegramOutbound::new(api.bot(), "test");
        outbound.clear_keyboard(ChatId(42), 7).await.unwrap();
        let edits = api.calls("EditMessageReplyMarkup");
        assert_eq!(edits[0]["message_id"], 7);
        api.shutdown().await;
    }
}
