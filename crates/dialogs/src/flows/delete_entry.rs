use async_trait::async_trait;

use crate::{
    effects::DomainEffect,
    error::Result,
    event::{CallbackData, Event},
    flows::{
        Flow, Picked, StepContext, StepOutcome, advance, advance_to_entry_selection, pick_entry,
        pick_topic, prompt_for_topic,
    },
    i18n::MessageKey,
    reply::{Button, Keyboard, Reply},
    session::{EntryRef, Session, Step},
};

/// `/deleteentry`: topic, entry, then an explicit confirmation.
pub struct DeleteEntryFlow;

#[async_trait]
impl Flow for DeleteEntryFlow {
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
                Picked::Found(topic) => advance_to_entry_selection(ctx, session, &topic).await,
                Picked::Gone(outcome) => Ok(outcome),
                Picked::NotOffered => Ok(StepOutcome::Ignore),
            },
            Step::SelectEntry => match pick_entry(ctx, session, event).await? {
                Picked::Found(entry) => {
                    let topic = session.topic()?;
                    advance(
                        session,
                        Step::Confirm,
                        session.accumulated.with_entry(EntryRef::from(&entry)),
                        Reply::key(MessageKey::ConfirmDelete)
                            .arg("name", &entry.name)
                            .arg("topic", &topic.name)
                            .with_keyboard(Keyboard::row([
                                Button::new(MessageKey::ButtonDelete, CallbackData::Confirm(true)),
                                Button::new(MessageKey::ButtonKeep, CallbackData::Confirm(false)),
                            ])),
                    )
                },
                Picked::Gone(outcome) => Ok(outcome),
                Picked::NotOffered => Ok(StepOutcome::Ignore),
            },
            Step::Confirm => {
                let entry = session.entry()?.clone();
                match event.callback() {
                    Some(CallbackData::Confirm(true)) => Ok(StepOutcome::complete(
                        Reply::key(MessageKey::EntryDeleted).arg("name", &entry.name),
                        vec![DomainEffect::DeleteEntry { entry }],
                    )),
                    Some(CallbackData::Confirm(false)) => Ok(StepOutcome::notice(
                        Reply::key(MessageKey::DeleteAborted).arg("name", &entry.name),
                    )),
                    _ => Ok(StepOutcome::Ignore),
                }
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
            flows::test_support::{Fixture, advanced, first_key, tap, text},
            store::Category,
        },
        lorebot_common::Role,
    };

    async fn at_confirm(fx: &Fixture) -> (Session, EntryRef) {
        let topic = fx.topic("Ashfall").await;
        let entry = fx.entry(&topic, "Zed", Category::Standard).await;
        let ctx = fx.ctx();
        let s = fx.session(CommandKind::DeleteEntry);
        let s = advanced(DeleteEntryFlow.step(&ctx, &s, &tap(CallbackData::Topic(topic.id))).await.unwrap());
        let s = advanced(DeleteEntryFlow.step(&ctx, &s, &tap(CallbackData::Entry(entry.id))).await.unwrap());
        assert_eq!(s.step, Step::Confirm);
        (s, EntryRef::from(&entry))
    }

    #[tokio::test]
    async fn confirmation_yields_delete_effect() {
        let fx = Fixture::new(Role::Admin);
        let (s, entry) = at_confirm(&fx).await;
        let outcome = DeleteEntryFlow
            .step(&fx.ctx(), &s, &tap(CallbackData::Confirm(true)))
            .await
            .unwrap();
        let StepOutcome::Complete { replies, effects } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(first_key(&replies), Some(MessageKey::EntryDeleted));
        assert_eq!(effects, vec![DomainEffect::DeleteEntry { entry }]);
    }

    #[tokio::test]
    async fn declining_finishes_without_effects() {
        let fx = Fixture::new(Role::Admin);
        let (s, _) = at_confirm(&fx).await;
        let outcome = DeleteEntryFlow
            .step(&fx.ctx(), &s, &tap(CallbackData::Confirm(false)))
            .await
            .unwrap();
        let StepOutcome::Complete { replies, effects } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(first_key(&replies), Some(MessageKey::DeleteAborted));
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn typed_yes_is_not_a_confirmation() {
        let fx = Fixture::new(Role::Admin);
        let (s, _) = at_confirm(&fx).await;
        let outcome = DeleteEntryFlow.step(&fx.ctx(), &s, &text("yes")).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Ignore));
    }
}
