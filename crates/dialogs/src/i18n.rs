//! User-facing message keys and their localization.
//!
//! Every outbound text is a [`MessageKey`] plus named arguments. The key's id
//! is stable and used for template overrides in the `[locale.messages]`
//! config table; the English template is the built-in fallback.

use std::collections::HashMap;

use lorebot_config::LocaleConfig;

macro_rules! message_keys {
    ($($variant:ident => $id:literal, $english:literal;)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageKey {
            $($variant,)+
        }

        impl MessageKey {
            pub const ALL: &'static [MessageKey] = &[$(Self::$variant,)+];

            #[must_use]
            pub fn id(self) -> &'static str {
                match self {
                    $(Self::$variant => $id,)+
                }
            }

            #[must_use]
            pub fn english(self) -> &'static str {
                match self {
                    $(Self::$variant => $english,)+
                }
            }
        }
    };
}

message_keys! {
    Welcome => "help.welcome", "Hello {name}! Send part of an entry name to look it up, or use one of these commands:";
    HelpHeader => "help.header", "Available commands:";
    HelpCancel => "help.cancel", "Cancel the command in progress";
    HelpHelp => "help.help", "Show this list";
    HelpNewEntry => "help.newentry", "Add an entry to a topic (append \"ranking\" for the ranking category)";
    HelpEditEntry => "help.editentry", "Replace the content of an entry";
    HelpEntryImage => "help.entryimage", "Attach an image to an entry";
    HelpDeleteEntry => "help.deleteentry", "Delete an entry";
    HelpNewTopic => "help.newtopic", "Create a topic";
    HelpSubscribe => "help.subscribe", "Get notified about new entries in a topic";
    HelpUnsubscribe => "help.unsubscribe", "Stop notifications for a topic";
    HelpSetRole => "help.setrole", "Change the role of a user";

    UnknownCommand => "command.unknown", "Unknown command /{command}. Send /help for the list.";
    Unauthorized => "command.unauthorized", "You are not allowed to use /{command}.";
    AlreadyActive => "session.conflict", "Finish or /cancel your current /{command} first.";
    Cancelled => "session.cancelled", "/{command} cancelled.";
    NothingToCancel => "session.nothing_to_cancel", "There is nothing to cancel.";
    Expired => "session.expired", "Your /{command} expired. Start it again when you are ready.";
    GenericError => "error.generic", "Something went wrong. Please try again later.";

    ChooseTopic => "topic.choose", "Choose a topic:";
    NoTopics => "topic.none", "There are no topics yet.";
    TopicNotFound => "topic.not_found", "That topic no longer exists.";
    EnterTopicName => "topic.enter_name", "Send the name of the new topic.";
    TopicCreated => "topic.created", "Topic {topic} created.";
    DuplicateTopic => "topic.duplicate", "A topic named {name} already exists.";

    ChooseEntry => "entry.choose", "Choose an entry from {topic}:";
    NoEntries => "entry.none", "{topic} has no entries yet.";
    EntryNotFound => "entry.not_found", "That entry no longer exists.";
    EnterName => "entry.enter_name", "Send the name of the new entry in {topic}.";
    EnterContent => "entry.enter_content", "Send the content for {name}.";
    EnterNewContent => "entry.enter_new_content", "Send the new content for {name}.";
    SendImage => "entry.send_image", "Send an image for {name}.";
    SendImageOrSkip => "entry.send_image_or_skip", "Send an image for {name}, or tap Skip to keep the current one.";
    ConfirmDelete => "entry.confirm_delete", "Delete {name} from {topic}? This cannot be undone.";
    EntryCreated => "entry.created", "{name} added to {topic}.";
    EntryUpdated => "entry.updated", "{name} updated.";
    ImageUpdated => "entry.image_updated", "Image for {name} updated.";
    EntryDeleted => "entry.deleted", "{name} deleted.";
    DeleteAborted => "entry.delete_aborted", "{name} was kept.";
    NewEntryNotice => "entry.new_notice", "New entry in {topic}: {name}";

    ButtonSkip => "button.skip", "Skip";
    ButtonDelete => "button.delete", "Delete";
    ButtonKeep => "button.keep", "Keep";

    NameBlank => "validation.name.blank", "The name cannot be empty.";
    NameTooLong => "validation.name.too_long", "The name cannot be longer than {max} characters.";
    NameInvalid => "validation.name.invalid", "Use letters and digits, with apostrophes or hyphens inside words and single spaces between them.";
    NameDuplicate => "validation.name.duplicate", "{topic} already has an entry named {name}.";
    ContentBlank => "validation.content.blank", "The content cannot be empty.";
    ContentTooLong => "validation.content.too_long", "The content cannot be longer than {max} characters.";

    Subscribed => "subscription.added", "You will be notified about new entries in {topic}.";
    Unsubscribed => "subscription.removed", "You will no longer be notified about {topic}.";
    AllSubscribed => "subscription.all", "You are already subscribed to every topic.";
    NotSubscribed => "subscription.none", "You have no subscriptions.";

    EnterUser => "role.enter_user", "Send the numeric id or @username of the user.";
    UnknownUser => "role.unknown_user", "No user matches {query}. They need to message the bot first.";
    OwnRole => "role.own", "You cannot change your own role.";
    ChooseRole => "role.choose", "Choose the new role for {name}:";
    RoleViewer => "role.viewer", "Viewer";
    RoleEditor => "role.editor", "Editor";
    RoleAdmin => "role.admin", "Admin";
    RoleChanged => "role.changed", "{name} is now {role}.";

    SearchResults => "search.results", "Entries matching \"{query}\":";
    SearchTruncated => "search.truncated", "More entries match. Send a longer name to narrow it down.";
}

/// Turns a message key into user-facing text in the requested language.
pub trait Localizer: Send + Sync {
    fn translate(&self, language: Option<&str>, key: MessageKey, args: &[(&str, String)])
    -> String;
}

/// English templates with per-language overrides from config.
///
/// Lookup order for a language tag such as `pt-BR`: `pt-BR`, `pt`, the
/// configured default language, then the built-in English text.
#[derive(Debug, Clone)]
pub struct BuiltinLocalizer {
    default_language: String,
    overrides: HashMap<String, HashMap<String, String>>,
}

impl Default for BuiltinLocalizer {
    fn default() -> Self {
        Self::from_config(&LocaleConfig::default())
    }
}

impl BuiltinLocalizer {
    pub fn from_config(config: &LocaleConfig) -> Self {
        let overrides = config
            .messages
            .iter()
            .map(|(lang, messages)| (lang.to_ascii_lowercase(), messages.clone()))
            .collect();
        Self {
            default_language: config.default_language.to_ascii_lowercase(),
            overrides,
        }
    }

    fn template(&self, language: Option<&str>, key: MessageKey) -> &str {
        let requested = language.map(str::to_ascii_lowercase);
        let primary = requested
            .as_deref()
            .and_then(|tag| tag.split(['-', '_']).next())
            .map(str::to_string);
        [requested, primary, Some(self.default_language.clone())]
            .into_iter()
            .flatten()
            .find_map(|lang| {
                self.overrides
                    .get(&lang)
                    .and_then(|messages| messages.get(key.id()))
            })
            .map_or(key.english(), String::as_str)
    }
}

impl Localizer for BuiltinLocalizer {
    fn translate(
        &self,
        language: Option<&str>,
        key: MessageKey,
        args: &[(&str, String)],
    ) -> String {
        substitute(self.template(language, key), args)
    }
}

/// Replace `{name}` placeholders. Unknown placeholders are left as written.
pub fn substitute(template: &str, args: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match args.iter().find(|(arg, _)| *arg == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            },
        }
    }
    out.push_str(rest);
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashSet};

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = MessageKey::ALL.iter().map(|k| k.id()).collect();
        assert_eq!(ids.len(), MessageKey::ALL.len());
    }

    #[test]
    fn substitutes_named_args() {
        let text = substitute("{name} added to {topic}.", &[
            ("name", "Aëlin".into()),
            ("topic", "Ashfall".into()),
        ]);
        assert_eq!(text, "Aëlin added to Ashfall.");
    }

    #[test]
    fn unknown_and_unterminated_placeholders_survive() {
        assert_eq!(substitute("{who} {", &[]), "{who} {");
    }

    #[test]
    fn falls_back_from_region_to_language_to_english() {
        let mut pt = HashMap::new();
        pt.insert("session.cancelled".to_string(), "/{command} cancelado.".to_string());
        let mut messages = HashMap::new();
        messages.insert("pt".to_string(), pt);
        let localizer = BuiltinLocalizer::from_config(&LocaleConfig {
            default_language: "en".into(),
            messages,
        });
        let args = [("command", "newentry".to_string())];

        assert_eq!(
            localizer.translate(Some("pt-BR"), MessageKey::Cancelled, &args),
            "/newentry cancelado."
        );
        assert_eq!(
            localizer.translate(Some("de"), MessageKey::Cancelled, &args),
            "/newentry cancelled."
        );
        assert_eq!(
            localizer.translate(None, MessageKey::NothingToCancel, &[]),
            "There is nothing to cancel."
        );
    }

    #[test]
    fn default_language_overrides_apply_to_unknown_languages() {
        let mut es = HashMap::new();
        es.insert("error.generic".to_string(), "Algo salió mal.".to_string());
        let localizer = BuiltinLocalizer::from_config(&LocaleConfig {
            default_language: "es".into(),
            messages: HashMap::from([("es".to_string(), es)]),
        });
        assert_eq!(
            localizer.translate(Some("fr"), MessageKey::GenericError, &[]),
            "Algo salió mal."
        );
    }
}
