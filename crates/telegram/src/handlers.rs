//! Converts Telegram updates into dialog notifications.

use {
    lorebot_common::{ChatId, UserId},
    lorebot_dialogs::event::{ImageRef, Inbound, InboundPayload, Sender},
    teloxide::{
        prelude::*,
        types::{Chat, MediaKind, MessageKind, User},
    },
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, labels, telegram as tg_metrics};

use crate::{
    access::{self, AccessRequest, AccessRules, ChatKind},
    state::AccountState,
};

/// Telegram re-encodes photos as JPEG.
const PHOTO_MEDIA_TYPE: &str = "image/jpeg";

fn sender_of(user: &User) -> Sender {
    let last = user.last_name.as_deref().unwrap_or("");
    let name = format!("{} {last}", user.first_name).trim().to_string();
    let display_name = if name.is_empty() {
        user.username.clone().unwrap_or_else(|| user.id.0.to_string())
    } else {
        name
    };
    Sender {
        user_id: UserId(user.id.0 as i64),
        display_name,
        username: user.username.clone(),
        language: user.language_code.clone(),
    }
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Dm
    } else {
        ChatKind::Group
    }
}

/// Message payload: the text, or the largest photo size, or an image sent
/// as a file. Anything else is not dialog input.
fn payload_of(msg: &Message) -> Option<InboundPayload> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    match &common.media_kind {
        MediaKind::Text(t) => Some(InboundPayload::Text(t.text.clone())),
        MediaKind::Photo(p) => p.photo.last().map(|size| {
            InboundPayload::Image(ImageRef {
                file_id: size.file.id.clone(),
                media_type: PHOTO_MEDIA_TYPE.into(),
            })
        }),
        MediaKind::Document(d) => d
            .document
            .mime_type
            .as_ref()
            .filter(|m| m.type_() == "image")
            .map(|m| {
                InboundPayload::Image(ImageRef {
                    file_id: d.document.file.id.clone(),
                    media_type: m.essence_str().to_string(),
                })
            }),
        _ => None,
    }
}

pub fn inbound_from_message(msg: &Message) -> Option<Inbound> {
    let sender = msg.from.as_ref().filter(|u| !u.is_bot).map(sender_of)?;
    Some(Inbound {
        sender,
        chat_id: ChatId(msg.chat.id.0),
        payload: payload_of(msg)?,
        message_id: None,
    })
}

pub fn inbound_from_callback(query: &CallbackQuery) -> Option<Inbound> {
    let data = query.data.clone()?;
    let message = query.message.as_ref()?;
    Some(Inbound {
        sender: sender_of(&query.from),
        chat_id: ChatId(message.chat().id.0),
        payload: InboundPayload::Callback(data),
        message_id: Some(message.id().0),
    })
}

fn admitted(state: &AccountState, chat: &Chat, sender: &Sender) -> bool {
    let peer_id = sender.user_id.to_string();
    let group_id = chat.id.0.to_string();
    let kind = chat_kind(chat);
    let request = AccessRequest {
        kind,
        peer_id: &peer_id,
        username: sender.username.as_deref(),
        group_id: (kind == ChatKind::Group).then_some(group_id.as_str()),
    };
    match access::check_access(&AccessRules::from(&state.config), &request) {
        Ok(()) => true,
        Err(reason) => {
            debug!(
                account_id = state.account_id,
                peer_id,
                reason = %reason,
                "access denied"
            );
            #[cfg(feature = "metrics")]
            counter!(
                tg_metrics::ACCESS_CONTROL_DENIALS_TOTAL,
                labels::ACCOUNT_ID => state.account_id.clone(),
                labels::ERROR_TYPE => reason.as_str()
            )
            .increment(1);
            false
        },
    }
}

pub fn handle_message(msg: &Message, state: &AccountState) {
    let Some(inbound) = inbound_from_message(msg) else {
        debug!(
            account_id = state.account_id,
            chat_id = msg.chat.id.0,
            "ignoring message without dialog payload"
        );
        return;
    };
    if admitted(state, &msg.chat, &inbound.sender) {
        state.lanes.submit(inbound);
    }
}

/// Acknowledge the tap so the client stops its spinner, then queue the
/// callback on the sender's lane.
pub async fn handle_callback_query(query: CallbackQuery, state: &AccountState) {
    if let Err(e) = state.bot.answer_callback_query(query.id.clone()).await {
        warn!(account_id = state.account_id, error = %e, "failed to answer callback query");
    }
    let Some(inbound) = inbound_from_callback(&query) else {
        debug!(account_id = state.account_id, "callback without data or message");
        return;
    };
    let Some(chat) = query.message.as_ref().map(|m| m.chat()) else {
        return;
    };
    if admitted(state, chat, &inbound.sender) {
        state.lanes.submit(inbound);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn message(body: serde_json::Value) -> Message {
        let mut value = json!({
            "message_id": 5,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Mira" },
            "from": {
                "id": 42,
                "is_bot": false,
                "first_name": "Mira",
                "last_name": "Vance",
                "username": "mira",
                "language_code": "es"
            }
        });
        for (k, v) in body.as_object().unwrap() {
            value[k] = v.clone();
        }
        serde_json::from_value(value).expect("deserialize message")
    }

    #[test]
    fn text_messages_become_text_payloads() {
        let inbound = inbound_from_message(&message(json!({ "text": "/newentry ranking" })))
            .unwrap();
        assert_eq!(inbound.payload, InboundPayload::Text("/newentry ranking".into()));
        assert_eq!(inbound.chat_id, ChatId(42));
        assert_eq!(inbound.sender.user_id, UserId(42));
        assert_eq!(inbound.sender.display_name, "Mira Vance");
        assert_eq!(inbound.sender.username.as_deref(), Some("mira"));
        assert_eq!(inbound.sender.language.as_deref(), Some("es"));
    }

    #[test]
    fn photos_use_the_largest_size() {
        let inbound = inbound_from_message(&message(json!({
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90 },
                { "file_id": "large", "file_unique_id": "l", "width": 1280, "height": 1280 }
            ]
        })))
        .unwrap();
        assert_eq!(
            inbound.payload,
            InboundPayload::Image(ImageRef {
                file_id: "large".into(),
                media_type: "image/jpeg".into(),
            })
        );
    }

    #[test]
    fn image_documents_keep_their_media_type() {
        let inbound = inbound_from_message(&message(json!({
            "document": {
                "file_id": "doc-1",
                "file_unique_id": "d",
                "file_name": "map.png",
                "mime_type": "image/png"
            }
        })))
        .unwrap();
        assert!(matches!(
            inbound.payload,
            InboundPayload::Image(ImageRef { ref media_type, .. }) if media_type == "image/png"
        ));
    }

    #[test]
    fn non_image_documents_are_ignored() {
        let msg = message(json!({
            "document": {
                "file_id": "doc-2",
                "file_unique_id": "d2",
                "mime_type": "application/pdf"
            }
        }));
        assert!(inbound_from_message(&msg).is_none());
    }

    #[test]
    fn callbacks_carry_data_and_message_id() {
        let query: CallbackQuery = serde_json::from_value(json!({
            "id": "cb-1",
            "from": { "id": 42, "is_bot": false, "first_name": "Mira" },
            "chat_instance": "ci",
            "data": "topic:3",
            "message": {
                "message_id": 9,
                "date": 1,
                "chat": { "id": 42, "type": "private", "first_name": "Mira" },
                "text": "Pick a topic"
            }
        }))
        .unwrap();
        let inbound = inbound_from_callback(&query).unwrap();
        assert_eq!(inbound.payload, InboundPayload::Callback("topic:3".into()));
        assert_eq!(inbound.message_id, Some(9));
        assert_eq!(inbound.sender.display_name, "Mira");
    }
}
