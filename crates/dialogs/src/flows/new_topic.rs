use async_trait::async_trait;

use crate::{
    effects::DomainEffect,
    error::{Error, Result},
    event::Event,
    flows::{Flow, StepContext, StepOutcome},
    i18n::MessageKey,
    reply::Reply,
    session::{Session, Step},
    validate::{ValidationError, name_key, validate_name},
};

/// `/newtopic`: a single name step.
pub struct NewTopicFlow;

#[async_trait]
impl Flow for NewTopicFlow {
    async fn enter(&self, _ctx: &StepContext<'_>, _session: &Session) -> Result<StepOutcome> {
        Ok(StepOutcome::Prompt(vec![Reply::key(MessageKey::EnterTopicName)]))
    }

    async fn step(
        &self,
        ctx: &StepContext<'_>,
        session: &Session,
        event: &Event,
    ) -> Result<StepOutcome> {
        if session.step != Step::EnterTopicName {
            return Ok(StepOutcome::Ignore);
        }
        let Some(raw) = event.text() else {
            return Ok(StepOutcome::Ignore);
        };
        let name = match validate_name(raw) {
            Ok(name) => name,
            Err(error) => return Ok(StepOutcome::reject(error)),
        };
        let existing = ctx
            .stores
            .topics
            .find_topic_by_key(&name_key(&name))
            .await
            .map_err(Error::Persistence)?;
        if let Some(existing) = existing {
            return Ok(StepOutcome::reject(ValidationError::DuplicateTopic {
                name: existing.name,
            }));
        }
        Ok(StepOutcome::complete(
            Reply::key(MessageKey::TopicCreated).arg("topic", &name),
            vec![DomainEffect::CreateTopic { name }],
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            command::CommandKind,
            flows::test_support::{Fixture, text},
        },
        lorebot_common::Role,
    };

    #[tokio::test]
    async fn creates_topic() {
        let fx = Fixture::new(Role::Admin);
        let s = fx.session(CommandKind::NewTopic);
        let outcome = NewTopicFlow.step(&fx.ctx(), &s, &text("Ashfall")).await.unwrap();
        let StepOutcome::Complete { effects, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(effects, vec![DomainEffect::CreateTopic {
            name: "Ashfall".into()
        }]);
    }

    #[tokio::test]
    async fn folded_duplicate_reports_stored_spelling() {
        let fx = Fixture::new(Role::Admin);
        fx.topic("Ashfáll").await;
        let s = fx.session(CommandKind::NewTopic);
        let outcome = NewTopicFlow.step(&fx.ctx(), &s, &text("ASHFALL")).await.unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Reject { error: ValidationError::DuplicateTopic { ref name }, .. } if name == "Ashfáll"
        ));
    }
}
