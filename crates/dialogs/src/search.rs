//! Free-text lookup for messages that arrive outside any session.

use std::collections::HashMap;

use lorebot_config::SearchConfig;

use crate::{
    error::{Error, Result},
    event::CallbackData,
    i18n::MessageKey,
    reply::{Button, Keyboard, Reply},
    store::{Entry, Stores},
    validate::name_key,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub entry: Entry,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    /// Too short, disabled, or nothing matched. Nothing is sent.
    Nothing,
    Single(SearchHit),
    /// Several matches, with `more` set when the limit cut the list short.
    Many { hits: Vec<SearchHit>, more: bool },
}

/// Look entries up by a folded fragment of their name.
pub async fn search(stores: &Stores, config: &SearchConfig, query: &str) -> Result<SearchResult> {
    let fragment = name_key(query);
    if !config.enabled || fragment.chars().count() < config.min_chars.max(1) {
        return Ok(SearchResult::Nothing);
    }
    let limit = config.max_results.max(1);
    let mut entries = stores
        .entries
        .search_entries(&fragment, limit + 1)
        .await
        .map_err(Error::Persistence)?;
    let more = entries.len() > limit;
    entries.truncate(limit);

    // A single exact key match wins over partial ones.
    let exact: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.name_key == fragment)
        .map(|(i, _)| i)
        .collect();
    if let [only] = exact[..] {
        let entry = entries.swap_remove(only);
        let mut hits = with_topic(stores, vec![entry]).await?;
        return Ok(hits.pop().map_or(SearchResult::Nothing, SearchResult::Single));
    }

    let mut hits = with_topic(stores, entries).await?;
    match hits.len() {
        0 => Ok(SearchResult::Nothing),
        1 => Ok(hits.pop().map_or(SearchResult::Nothing, SearchResult::Single)),
        _ => Ok(SearchResult::Many { hits, more }),
    }
}

async fn with_topic(stores: &Stores, entries: Vec<Entry>) -> Result<Vec<SearchHit>> {
    let mut names: HashMap<_, String> = HashMap::new();
    let mut hits = Vec::with_capacity(entries.len());
    for entry in entries {
        if !names.contains_key(&entry.topic_id) {
            let topic = stores
                .topics
                .get_topic(entry.topic_id)
                .await
                .map_err(Error::Persistence)?;
            names.insert(
                entry.topic_id,
                topic.map(|t| t.name).unwrap_or_default(),
            );
        }
        let topic = names.get(&entry.topic_id).cloned().unwrap_or_default();
        hits.push(SearchHit { entry, topic });
    }
    Ok(hits)
}

/// The list reply for several matches. Each button opens one entry.
pub fn results_reply(query: &str, hits: &[SearchHit], more: bool) -> Vec<Reply> {
    let keyboard = Keyboard::column(hits.iter().map(|hit| {
        Button::new(
            format!("{} · {}", hit.entry.name, hit.topic),
            CallbackData::Entry(hit.entry.id),
        )
    }));
    let mut replies = vec![
        Reply::key(MessageKey::SearchResults)
            .arg("query", query.trim())
            .with_keyboard(keyboard),
    ];
    if more {
        replies.push(Reply::key(MessageKey::SearchTruncated));
    }
    replies
}
