use async_trait::async_trait;

use crate::{
    effects::DomainEffect,
    error::{Error, Result},
    event::Event,
    flows::{Flow, Picked, StepContext, StepOutcome, pick_topic, topic_keyboard},
    i18n::MessageKey,
    reply::Reply,
    session::{Session, Step, TopicRef},
    store::Topic,
};

/// `/subscribe`: choose one of the topics the caller is not subscribed to.
pub struct SubscribeFlow;

/// `/unsubscribe`: choose one of the caller's subscribed topics.
pub struct UnsubscribeFlow;

/// Topics split by whether the caller is subscribed.
async fn partition_topics(ctx: &StepContext<'_>) -> Result<(Vec<Topic>, Vec<Topic>)> {
    let subscribed = ctx
        .stores
        .subscriptions
        .subscribed_topics(ctx.identity.id)
        .await
        .map_err(Error::Persistence)?;
    let topics = ctx
        .stores
        .topics
        .list_topics()
        .await
        .map_err(Error::Persistence)?;
    Ok(topics.into_iter().partition(|t| subscribed.contains(&t.id)))
}

async fn is_subscribed(ctx: &StepContext<'_>, topic: &Topic) -> Result<bool> {
    let subscribed = ctx
        .stores
        .subscriptions
        .subscribed_topics(ctx.identity.id)
        .await
        .map_err(Error::Persistence)?;
    Ok(subscribed.contains(&topic.id))
}

fn choose(topics: &[Topic]) -> StepOutcome {
    StepOutcome::Prompt(vec![
        Reply::key(MessageKey::ChooseTopic).with_keyboard(topic_keyboard(topics)),
    ])
}

#[async_trait]
impl Flow for SubscribeFlow {
    async fn enter(&self, ctx: &StepContext<'_>, _session: &Session) -> Result<StepOutcome> {
        let (subscribed, available) = partition_topics(ctx).await?;
        if !available.is_empty() {
            return Ok(choose(&available));
        }
        let notice = if subscribed.is_empty() {
            MessageKey::NoTopics
        } else {
            MessageKey::AllSubscribed
        };
        Ok(StepOutcome::notice(Reply::key(notice)))
    }

    async fn step(
        &self,
        ctx: &StepContext<'_>,
        session: &Session,
        event: &Event,
    ) -> Result<StepOutcome> {
        if session.step != Step::SelectTopic {
            return Ok(StepOutcome::Ignore);
        }
        let topic = match pick_topic(ctx, event).await? {
            Picked::Found(topic) => topic,
            Picked::Gone(outcome) => return Ok(outcome),
            Picked::NotOffered => return Ok(StepOutcome::Ignore),
        };
        if is_subscribed(ctx, &topic).await? {
            return Ok(StepOutcome::Ignore);
        }
        Ok(StepOutcome::complete(
            Reply::key(MessageKey::Subscribed).arg("topic", &topic.name),
            vec![DomainEffect::Subscribe {
                topic: TopicRef::from(&topic),
            }],
        ))
    }
}

#[async_trait]
impl Flow for UnsubscribeFlow {
    async fn enter(&self, ctx: &StepContext<'_>, _session: &Session) -> Result<StepOutcome> {
        let (subscribed, _) = partition_topics(ctx).await?;
        if subscribed.is_empty() {
            return Ok(StepOutcome::notice(Reply::key(MessageKey::NotSubscribed)));
        }
        Ok(choose(&subscribed))
    }

    async fn step(
        &self,
        ctx: &StepContext<'_>,
        session: &Session,
        event: &Event,
    ) -> Result<StepOutcome> {
        if session.step != Step::SelectTopic {
            return Ok(StepOutcome::Ignore);
        }
        let topic = match pick_topic(ctx, event).await? {
            Picked::Found(topic) => topic,
            Picked::Gone(outcome) => return Ok(outcome),
            Picked::NotOffered => return Ok(StepOutcome::Ignore),
        };
        if !is_subscribed(ctx, &topic).await? {
            return Ok(StepOutcome::Ignore);
        }
        Ok(StepOutcome::complete(
            Reply::key(MessageKey::Unsubscribed).arg("topic", &topic.name),
            vec![DomainEffect::Unsubscribe {
                topic: TopicRef::from(&topic),
            }],
        ))
    }
}
