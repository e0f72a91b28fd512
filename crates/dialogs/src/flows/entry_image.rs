use async_trait::async_trait;

use crate::{
    effects::DomainEffect,
    error::Result,
    event::Event,
    flows::{
        Flow, Picked, StepContext, StepOutcome, advance, advance_to_entry_selection, pick_entry,
        pick_topic, prompt_for_topic,
    },
    i18n::MessageKey,
    reply::Reply,
    session::{EntryRef, Session, Step},
};

/// `/entryimage`: topic, entry, then the image.
pub struct EntryImageFlow;

#[async_trait]
impl Flow for EntryImageFlow {
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
                Picked::Found(entry) => advance(
                    session,
                    Step::AttachImage,
                    session.accumulated.with_entry(EntryRef::from(&entry)),
                    Reply::key(MessageKey::SendImage).arg("name", &entry.name),
                ),
                Picked::Gone(outcome) => Ok(outcome),
                Picked::NotOffered => Ok(StepOutcome::Ignore),
            },
            Step::AttachImage => {
                let Event::Image { reference } = event else {
                    return Ok(StepOutcome::Ignore);
                };
                let entry = session.entry()?.clone();
                Ok(StepOutcome::complete(
                    Reply::key(MessageKey::ImageUpdated).arg("name", &entry.name),
                    vec![DomainEffect::SetEntryImage {
                        entry,
                        image: reference.clone(),
                    }],
                ))
            },
            _ => Ok(StepOutcome::Ignore),
        }
    }
}
