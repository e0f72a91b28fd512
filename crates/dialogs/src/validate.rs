//! Input validation for names and content, and the duplicate-detection key.

use std::sync::LazyLock;

use {regex::Regex, thiserror::Error, unicode_normalization::UnicodeNormalization};

use crate::{i18n::MessageKey, reply::Reply};

pub const NAME_MAX_CHARS: usize = 64;
pub const CONTENT_MAX_CHARS: usize = 64_000;

/// Words of letters, digits or underscores, joined by single spaces. An
/// apostrophe or hyphen may appear between word characters.
static NAME_SHAPE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\w+(?:['’-]\w+)*(?: \w+(?:['’-]\w+)*)*$").ok()
});

/// A recoverable input error. The session stays at its current step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name is blank")]
    NameBlank,
    #[error("name exceeds {max} characters")]
    NameTooLong { max: usize },
    #[error("name has an invalid shape")]
    NameInvalid,
    #[error("{scope} already has an entry named {name:?}")]
    DuplicateName { name: String, scope: String },
    #[error("a topic named {name:?} already exists")]
    DuplicateTopic { name: String },
    #[error("content is blank")]
    ContentBlank,
    #[error("content exceeds {max} characters")]
    ContentTooLong { max: usize },
    #[error("no user matches {query:?}")]
    UnknownUser { query: String },
    #[error("cannot change own role")]
    OwnRole,
}

impl ValidationError {
    /// Label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NameBlank => "name_blank",
            Self::NameTooLong { .. } => "name_too_long",
            Self::NameInvalid => "name_invalid",
            Self::DuplicateName { .. } => "duplicate_name",
            Self::DuplicateTopic { .. } => "duplicate_topic",
            Self::ContentBlank => "content_blank",
            Self::ContentTooLong { .. } => "content_too_long",
            Self::UnknownUser { .. } => "unknown_user",
            Self::OwnRole => "own_role",
        }
    }

    pub fn reply(&self) -> Reply {
        match self {
            Self::NameBlank => Reply::key(MessageKey::NameBlank),
            Self::NameTooLong { max } => Reply::key(MessageKey::NameTooLong).arg("max", max),
            Self::NameInvalid => Reply::key(MessageKey::NameInvalid),
            Self::DuplicateName { name, scope } => Reply::key(MessageKey::NameDuplicate)
                .arg("name", name)
                .arg("topic", scope),
            Self::DuplicateTopic { name } => {
                Reply::key(MessageKey::DuplicateTopic).arg("name", name)
            },
            Self::ContentBlank => Reply::key(MessageKey::ContentBlank),
            Self::ContentTooLong { max } => {
                Reply::key(MessageKey::ContentTooLong).arg("max", max)
            },
            Self::UnknownUser { query } => Reply::key(MessageKey::UnknownUser).arg("query", query),
            Self::OwnRole => Reply::key(MessageKey::OwnRole),
        }
    }
}

/// Validate an entry or topic name. Returns the trimmed name.
pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::NameBlank);
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(ValidationError::NameTooLong {
            max: NAME_MAX_CHARS,
        });
    }
    match NAME_SHAPE.as_ref() {
        Some(shape) if shape.is_match(name) => Ok(name.to_string()),
        _ => Err(ValidationError::NameInvalid),
    }
}

/// Validate entry content. Returns the trimmed content.
pub fn validate_content(raw: &str) -> Result<String, ValidationError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ValidationError::ContentBlank);
    }
    if content.chars().count() > CONTENT_MAX_CHARS {
        return Err(ValidationError::ContentTooLong {
            max: CONTENT_MAX_CHARS,
        });
    }
    Ok(content.to_string())
}

/// Comparison key for names: decomposed, combining marks removed, lowercased,
/// whitespace collapsed. `"Aëlin"` and `" aelin "` share a key.
pub fn name_key(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `candidate` collides with any of the already stored keys.
pub fn is_duplicate<'a>(candidate: &str, existing: impl IntoIterator<Item = &'a str>) -> bool {
    let key = name_key(candidate);
    existing.into_iter().any(|other| other == key)
}
