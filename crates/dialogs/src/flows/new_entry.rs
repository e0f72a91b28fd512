use async_trait::async_trait;

use crate::{
    effects::DomainEffect,
    error::{Error, Result},
    event::Event,
    flows::{Flow, Picked, StepContext, StepOutcome, advance, pick_topic, prompt_for_topic},
    i18n::MessageKey,
    reply::Reply,
    session::{Session, Step, TopicRef},
    validate::{ValidationError, is_duplicate, validate_content, validate_name},
};

/// `/newentry [ranking]`: topic, then name, then content.
pub struct NewEntryFlow;

#[async_trait]
impl Flow for NewEntryFlow {
    async fn enter(&self, ctx: &StepContext<'_>, _session: &Session) -> Result<StepOutcome> {
        prompt_for_topic(ctx).await
    }

    async fn step(
        &self,
        ctx: &StepContext<'_>,
        session: &Session,
        event: &Event,
    ) -> Result<StepOutcome> {
        match session.step {
            Step::SelectTopic => match pick_topic(ctx, event).await? {
                Picked::Found(topic) => advance(
                    session,
                    Step::EnterName,
                    session.accumulated.with_topic(TopicRef::from(&topic)),
                    Reply::key(MessageKey::EnterName).arg("topic", &topic.name),
                ),
                Picked::Gone(outcome) => Ok(outcome),
                Picked::NotOffered => Ok(StepOutcome::Ignore),
            },
            Step::EnterName => {
                let Some(raw) = event.text() else {
                    return Ok(StepOutcome::Ignore);
                };
                let name = match validate_name(raw) {
                    Ok(name) => name,
                    Err(error) => return Ok(StepOutcome::reject(error)),
                };
                let topic = session.topic()?;
                let existing = ctx
                    .stores
                    .entries
                    .list_entries(topic.id)
                    .await
                    .map_err(Error::Persistence)?;
                let category = session.accumulated.category;
                let taken = is_duplicate(
                    &name,
                    existing
                        .iter()
                        .filter(|e| e.category == category)
                        .map(|e| e.name_key.as_str()),
                );
                if taken {
                    return Ok(StepOutcome::reject(ValidationError::DuplicateName {
                        name,
                        scope: topic.name.clone(),
                    }));
                }
                advance(
                    session,
                    Step::EnterContent,
                    session.accumulated.with_name(name.clone()),
                    Reply::key(MessageKey::EnterContent).arg("name", &name),
                )
            },
            Step::EnterContent => {
                let Some(raw) = event.text() else {
                    return Ok(StepOutcome::Ignore);
                };
                let content = match validate_content(raw) {
                    Ok(content) => content,
                    Err(error) => return Ok(StepOutcome::reject(error)),
                };
                let topic = session.topic()?.clone();
                let name = session.name()?.to_string();
                Ok(StepOutcome::complete(
                    Reply::key(MessageKey::EntryCreated)
                        .arg("name", &name)
                        .arg("topic", &topic.name),
                    vec![DomainEffect::CreateEntry {
                        topic,
                        name,
                        content,
                        category: session.accumulated.category,
                    }],
                ))
            },
            _ => Ok(StepOutcome::Ignore),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            command::CommandKind,
            event::CallbackData,
            flows::test_support::{Fixture, advanced, first_key, tap, text},
            store::Category,
        },
        lorebot_common::{Role, TopicId},
    };

    #[tokio::test]
    async fn enter_without_topics_finishes_with_notice() {
        let fx = Fixture::new(Role::Editor);
        let session = fx.session(CommandKind::NewEntry);
        match NewEntryFlow.enter(&fx.ctx(), &session).await.unwrap() {
            StepOutcome::Complete { replies, effects } => {
                assert_eq!(first_key(&replies), Some(MessageKey::NoTopics));
                assert!(effects.is_empty());
            },
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn walks_topic_name_content() {
        let fx = Fixture::new(Role::Editor);
        let topic = fx.topic("Ashfall").await;
        let ctx = fx.ctx();
        let session = fx.session(CommandKind::NewEntry);

        let outcome = NewEntryFlow.enter(&ctx, &session).await.unwrap();
        let StepOutcome::Prompt(replies) = outcome else {
            panic!("expected prompt");
        };
        let keyboard = replies[0].keyboard.as_ref().unwrap();
        assert_eq!(keyboard.rows[0][0].data, format!("topic:{}", topic.id));

        let session = advanced(
            NewEntryFlow
                .step(&ctx, &session, &tap(CallbackData::Topic(topic.id)))
                .await
                .unwrap(),
        );
        assert_eq!(session.step, Step::EnterName);

        let session = advanced(NewEntryFlow.step(&ctx, &session, &text(" Aëlin ")).await.unwrap());
        assert_eq!(session.accumulated.name.as_deref(), Some("Aëlin"));

        match NewEntryFlow
            .step(&ctx, &session, &text("Fierce ranger."))
            .await
            .unwrap()
        {
            StepOutcome::Complete { replies, effects } => {
                assert_eq!(first_key(&replies), Some(MessageKey::EntryCreated));
                assert_eq!(effects, vec![DomainEffect::CreateEntry {
                    topic: TopicRef::from(&topic),
                    name: "Aëlin".into(),
                    content: "Fierce ranger.".into(),
                    category: Category::Standard,
                }]);
            },
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn over_long_name_is_rejected_in_place() {
        let fx = Fixture::new(Role::Editor);
        let topic = fx.topic("Ashfall").await;
        let ctx = fx.ctx();
        let session = advanced(
            NewEntryFlow
                .step(&ctx, &fx.session(CommandKind::NewEntry), &tap(CallbackData::Topic(topic.id)))
                .await
                .unwrap(),
        );

        let outcome = NewEntryFlow
            .step(&ctx, &session, &text(&"a".repeat(65)))
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Reject {
            error: ValidationError::NameTooLong { max: 64 },
            ..
        }));
    }

    #[tokio::test]
    async fn accent_folded_duplicate_is_rejected() {
        let fx = Fixture::new(Role::Editor);
        let topic = fx.topic("Ashfall").await;
        fx.entry(&topic, "aelin", Category::Standard).await;
        let ctx = fx.ctx();
        let session = advanced(
            NewEntryFlow
                .step(&ctx, &fx.session(CommandKind::NewEntry), &tap(CallbackData::Topic(topic.id)))
                .await
                .unwrap(),
        );

        let outcome = NewEntryFlow.step(&ctx, &session, &text("Aëlin")).await.unwrap();
        match outcome {
            StepOutcome::Reject {
                error: ValidationError::DuplicateName { name, scope },
                ..
            } => {
                assert_eq!(name, "Aëlin");
                assert_eq!(scope, "Ashfall");
            },
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn same_name_allowed_in_other_category() {
        let fx = Fixture::new(Role::Editor);
        let topic = fx.topic("Ashfall").await;
        fx.entry(&topic, "Aelin", Category::Standard).await;
        let ctx = fx.ctx();
        let mut session = fx.session(CommandKind::NewEntry);
        session.accumulated.category = Category::Ranking;
        let session = advanced(
            NewEntryFlow
                .step(&ctx, &session, &tap(CallbackData::Topic(topic.id)))
                .await
                .unwrap(),
        );

        let outcome = NewEntryFlow.step(&ctx, &session, &text("Aëlin")).await.unwrap();
        assert_eq!(advanced(outcome).step, Step::EnterContent);
    }

    #[tokio::test]
    async fn deleted_topic_fails_and_wrong_kind_is_ignored() {
        let fx = Fixture::new(Role::Editor);
        let ctx = fx.ctx();
        let session = fx.session(CommandKind::NewEntry);

        let gone = NewEntryFlow
            .step(&ctx, &session, &tap(CallbackData::Topic(TopicId(999))))
            .await
            .unwrap();
        assert!(matches!(gone, StepOutcome::Fail {
            error: Error::MissingEntity { .. },
            ..
        }));

        let ignored = NewEntryFlow.step(&ctx, &session, &text("Ashfall")).await.unwrap();
        assert!(matches!(ignored, StepOutcome::Ignore));
    }
}
