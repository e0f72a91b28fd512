use {async_trait::async_trait, lorebot_common::Role};

use crate::{
    effects::DomainEffect,
    error::{Error, Result},
    event::{CallbackData, Event},
    flows::{Flow, StepContext, StepOutcome, advance},
    i18n::MessageKey,
    reply::{Button, Keyboard, Reply},
    session::{Session, Step, UserRef},
    store::UserRecord,
    validate::ValidationError,
};

/// `/setrole`: a user id or `@username`, then the role.
pub struct SetRoleFlow;

pub(crate) fn role_label(role: Role) -> MessageKey {
    match role {
        Role::Viewer => MessageKey::RoleViewer,
        Role::Editor => MessageKey::RoleEditor,
        Role::Admin => MessageKey::RoleAdmin,
    }
}

async fn find_user(ctx: &StepContext<'_>, query: &str) -> Result<Option<UserRecord>> {
    let users = &ctx.stores.users;
    let found = match query.strip_prefix('@') {
        Some(username) => users.find_user_by_username(username).await,
        None => match query.parse() {
            Ok(id) => users.get_user(id).await,
            Err(_) => users.find_user_by_username(query).await,
        },
    };
    found.map_err(Error::Persistence)
}

#[async_trait]
impl Flow for SetRoleFlow {
    async fn enter(&self, _ctx: &StepContext<'_>, _session: &Session) -> Result<StepOutcome> {
        Ok(StepOutcome::Prompt(vec![Reply::key(MessageKey::EnterUser)]))
    }

    async fn step(
        &self,
        ctx: &StepContext<'_>,
        session: &Session,
        event: &Event,
    ) -> Result<StepOutcome> {
        match session.step {
            Step::EnterUser => {
                let Some(query) = event.text() else {
                    return Ok(StepOutcome::Ignore);
                };
                let Some(user) = find_user(ctx, query).await? else {
                    return Ok(StepOutcome::reject(ValidationError::UnknownUser {
                        query: query.to_string(),
                    }));
                };
                if user.id == ctx.identity.id {
                    return Ok(StepOutcome::reject(ValidationError::OwnRole));
                }
                let buttons = Role::ALL
                    .iter()
                    .map(|role| Button::new(role_label(*role), CallbackData::Role(*role)));
                advance(
                    session,
                    Step::SelectRole,
                    session.accumulated.with_target_user(UserRef {
                        id: user.id,
                        display_name: user.display_name.clone(),
                    }),
                    Reply::key(MessageKey::ChooseRole)
                        .arg("name", &user.display_name)
                        .with_keyboard(Keyboard::row(buttons)),
                )
            },
            Step::SelectRole => {
                let Some(CallbackData::Role(role)) = event.callback() else {
                    return Ok(StepOutcome::Ignore);
                };
                let target = session.target_user()?;
                Ok(StepOutcome::complete(
                    Reply::key(MessageKey::RoleChanged)
                        .arg("name", &target.display_name)
                        .arg("role", role),
                    vec![DomainEffect::SetRole {
                        user: target.id,
                        role,
                    }],
                ))
            },
            _ => Ok(StepOutcome::Ignore),
        }
    }
}
