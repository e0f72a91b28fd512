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
    validate::validate_content,
};

/// `/editentry`: topic, entry, new content, then an image or skip.
pub struct EditEntryFlow;

#[async_trait]
impl Flow for EditEntryFlow {
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
                    Step::EnterContent,
                    session.accumulated.with_entry(EntryRef::from(&entry)),
                    Reply::key(MessageKey::EnterNewContent).arg("name", &entry.name),
                ),
                Picked::Gone(outcome) => Ok(outcome),
                Picked::NotOffered => Ok(StepOutcome::Ignore),
            },
            Step::EnterContent => {
                let Some(raw) = event.text() else {
                    return Ok(StepOutcome::Ignore);
                };
                let content = match validate_content(raw) {
                    Ok(content) => content,
                    Err(error) => return Ok(StepOutcome::reject(error)),
                };
                let name = &session.entry()?.name;
                advance(
                    session,
                    Step::AttachImage,
                    session.accumulated.with_content(content),
                    Reply::key(MessageKey::SendImageOrSkip)
                        .arg("name", name)
                        .with_keyboard(Keyboard::row([Button::new(
                            MessageKey::ButtonSkip,
                            CallbackData::Skip,
                        )])),
                )
            },
            Step::AttachImage => {
                let collected = match event {
                    Event::Image { reference } => {
                        session.accumulated.with_image(reference.clone())
                    },
                    _ if event.callback() == Some(CallbackData::Skip) => {
                        session.accumulated.clone()
                    },
                    _ => return Ok(StepOutcome::Ignore),
                };
                let entry = session.entry()?.clone();
                Ok(StepOutcome::complete(
                    Reply::key(MessageKey::EntryUpdated).arg("name", &entry.name),
                    vec![DomainEffect::UpdateEntry {
                        entry,
                        content: session.content()?.to_string(),
                        image: collected.image,
                    }],
                ))
            },
            _ => Ok(StepOutcome::Ignore),
        }
    }
}
