//! Outbound replies before localization.

use crate::i18n::{Localizer, MessageKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Text {
    Key {
        key: MessageKey,
        args: Vec<(&'static str, String)>,
    },
    /// User data shown as-is, such as topic or entry names on buttons.
    Plain(String),
}

impl Text {
    pub fn localize(&self, localizer: &dyn Localizer, language: Option<&str>) -> String {
        match self {
            Self::Key { key, args } => localizer.translate(language, *key, args),
            Self::Plain(text) => text.clone(),
        }
    }
}

impl From<MessageKey> for Text {
    fn from(key: MessageKey) -> Self {
        Self::Key {
            key,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: Text,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<Text>, data: impl ToString) -> Self {
        Self {
            label: label.into(),
            data: data.to_string(),
        }
    }
}

/// Inline keyboard, one inner vector per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// One button per row.
    pub fn column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// All buttons on a single row.
    pub fn row(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: vec![buttons.into_iter().collect()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: Text,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn key(key: MessageKey) -> Self {
        Self {
            text: key.into(),
            keyboard: None,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: Text::Plain(text.into()),
            keyboard: None,
        }
    }

    /// Add a named argument. No-op for plain text.
    #[must_use]
    pub fn arg(mut self, name: &'static str, value: impl ToString) -> Self {
        if let Text::Key { args, .. } = &mut self.text {
            args.push((name, value.to_string()));
        }
        self
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// The message key, if this reply is localized.
    pub fn message_key(&self) -> Option<MessageKey> {
        match &self.text {
            Text::Key { key, .. } => Some(*key),
            Text::Plain(_) => None,
        }
    }
}

impl From<String> for Text {
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}
