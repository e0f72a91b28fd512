//! Inbound notifications and their classification into session events.

use std::fmt;

use lorebot_common::{ChatId, EntryId, Role, TopicId, UserId};

/// Who sent an inbound notification, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub display_name: String,
    pub username: Option<String>,
    pub language: Option<String>,
}

/// Reference to an image held by the transport. The bytes are fetched only
/// when an effect needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub file_id: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    Text(String),
    Image(ImageRef),
    /// Opaque data attached to a tapped inline button.
    Callback(String),
}

/// One notification from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub sender: Sender,
    pub chat_id: ChatId,
    pub payload: InboundPayload,
    /// Message carrying the inline keyboard, for callbacks.
    pub message_id: Option<i32>,
}

/// A normalized inbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command { name: String, args: Vec<String> },
    Text { value: String },
    Image { reference: ImageRef },
    Callback { data: String },
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Callback { .. } => "callback",
        }
    }

    /// Text value with surrounding whitespace removed.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { value } => Some(value.trim()),
            _ => None,
        }
    }

    #[must_use]
    pub fn callback(&self) -> Option<CallbackData> {
        match self {
            Self::Callback { data } => CallbackData::parse(data),
            _ => None,
        }
    }
}

/// Classify a payload. Text that starts with `/` is a command; an `@botname`
/// suffix on the command word is dropped and the name is lowercased.
#[must_use]
pub fn classify(payload: &InboundPayload) -> Event {
    match payload {
        InboundPayload::Text(text) => {
            let trimmed = text.trim_start();
            match trimmed.strip_prefix('/') {
                Some(rest) if rest.starts_with(|c: char| c.is_alphanumeric()) => {
                    let mut words = rest.split_whitespace();
                    let head = words.next().unwrap_or_default();
                    let name = head.split('@').next().unwrap_or_default().to_lowercase();
                    Event::Command {
                        name,
                        args: words.map(str::to_string).collect(),
                    }
                },
                _ => Event::Text {
                    value: text.clone(),
                },
            }
        },
        InboundPayload::Image(reference) => Event::Image {
            reference: reference.clone(),
        },
        InboundPayload::Callback(data) => Event::Callback { data: data.clone() },
    }
}

/// Inline button payloads understood by the command flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackData {
    Topic(TopicId),
    Entry(EntryId),
    Role(Role),
    Confirm(bool),
    Skip,
}

impl CallbackData {
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let (tag, value) = data.split_once(':').unwrap_or((data, ""));
        match tag {
            "topic" => value.parse().ok().map(Self::Topic),
            "entry" => value.parse().ok().map(Self::Entry),
            "role" => value.parse().ok().map(Self::Role),
            "confirm" => match value {
                "yes" => Some(Self::Confirm(true)),
                "no" => Some(Self::Confirm(false)),
                _ => None,
            },
            "skip" if value.is_empty() => Some(Self::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic(id) => write!(f, "topic:{id}"),
            Self::Entry(id) => write!(f, "entry:{id}"),
            Self::Role(role) => write!(f, "role:{role}"),
            Self::Confirm(true) => f.write_str("confirm:yes"),
            Self::Confirm(false) => f.write_str("confirm:no"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn text(s: &str) -> InboundPayload {
        InboundPayload::Text(s.into())
    }

    #[test]
    fn command_with_bot_suffix_and_args() {
        let event = classify(&text("/NewEntry@lorebot_bot ranking"));
        assert_eq!(event, Event::Command {
            name: "newentry".into(),
            args: vec!["ranking".into()],
        });
    }

    #[rstest]
    #[case("Aëlin")]
    #[case("  hello /there")]
    #[case("/")]
    #[case("/ spaced")]
    fn plain_text_is_not_a_command(#[case] input: &str) {
        assert_eq!(classify(&text(input)), Event::Text {
            value: input.into()
        });
    }

    #[test]
    fn text_accessor_trims() {
        let event = classify(&text("  Aëlin \n"));
        assert_eq!(event.text(), Some("Aëlin"));
        assert_eq!(event.callback(), None);
    }

    #[rstest]
    #[case("topic:7", Some(CallbackData::Topic(TopicId(7))))]
    #[case("entry:12", Some(CallbackData::Entry(EntryId(12))))]
    #[case("role:editor", Some(CallbackData::Role(Role::Editor)))]
    #[case("confirm:no", Some(CallbackData::Confirm(false)))]
    #[case("skip", Some(CallbackData::Skip))]
    #[case("topic:abc", None)]
    #[case("confirm:maybe", None)]
    #[case("skip:1", None)]
    #[case("", None)]
    fn callback_parsing(#[case] data: &str, #[case] expected: Option<CallbackData>) {
        assert_eq!(CallbackData::parse(data), expected);
    }

    #[test]
    fn callback_display_matches_parser() {
        let data = CallbackData::Topic(TopicId(3)).to_string();
        assert_eq!(data, "topic:3");
        assert_eq!(CallbackData::parse(&data), Some(CallbackData::Topic(TopicId(3))));
    }
}
