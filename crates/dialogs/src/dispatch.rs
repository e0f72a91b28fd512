//! Routes every inbound notification to exactly one handling path.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    lorebot_common::{ChatId, EntryId, UserIdentity},
    lorebot_config::{AccessConfig, SearchConfig},
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, dialogs as dialog_metrics, histogram, labels};

use crate::{
    command::{self, CommandKind, DESCRIPTORS},
    effects::EffectRunner,
    error::{Error, Result},
    event::{CallbackData, Event, Inbound, classify},
    factory::{CommandFactory, StartRejected},
    flows::{StepContext, StepOutcome},
    i18n::{BuiltinLocalizer, Localizer, MessageKey},
    identity::IdentityResolver,
    outbound::{ButtonSpec, ChatOutbound, OutboundMessage},
    policy,
    registry::{Claim, SessionRegistry},
    render::Renderer,
    reply::Reply,
    search::{self, SearchResult},
    session::{Session, Step},
    store::Stores,
};

/// How an inbound notification was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A session was created and its entry prompt sent.
    Started(CommandKind),
    Advanced(CommandKind, Step),
    /// Replies sent, session unchanged.
    Prompted(CommandKind),
    /// Invalid input; the session stays at its step.
    Rejected(CommandKind, &'static str),
    Completed(CommandKind),
    Failed(Option<CommandKind>),
    /// The event did not fit the current step.
    Ignored(CommandKind),
    Conflict(CommandKind),
    Unauthorized(CommandKind),
    UnknownCommand,
    Cancelled(Option<CommandKind>),
    Help,
    /// Free-text lookup listed this many matches.
    Searched(usize),
    /// An entry document was sent outside any session.
    Opened,
    /// Nothing to do and nothing sent.
    Dropped,
}

pub struct Dispatcher {
    registry: SessionRegistry,
    factory: CommandFactory,
    stores: Stores,
    identities: IdentityResolver,
    effects: EffectRunner,
    outbound: Arc<dyn ChatOutbound>,
    localizer: Arc<dyn Localizer>,
    search: SearchConfig,
}

impl Dispatcher {
    pub fn new(
        stores: Stores,
        renderer: Arc<dyn Renderer>,
        outbound: Arc<dyn ChatOutbound>,
    ) -> Self {
        let localizer: Arc<dyn Localizer> = Arc::new(BuiltinLocalizer::default());
        Self {
            registry: SessionRegistry::new(),
            factory: CommandFactory,
            identities: IdentityResolver::new(stores.users.clone(), AccessConfig::default()),
            effects: EffectRunner::new(
                stores.clone(),
                renderer,
                outbound.clone(),
                localizer.clone(),
            ),
            stores,
            outbound,
            localizer,
            search: SearchConfig::default(),
        }
    }

    #[must_use]
    pub fn with_access(mut self, access: AccessConfig) -> Self {
        self.identities = IdentityResolver::new(self.stores.users.clone(), access);
        self
    }

    #[must_use]
    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.effects.set_localizer(localizer.clone());
        self.localizer = localizer;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Handle one inbound notification. Never fails: unexpected errors are
    /// logged and answered with the generic error message.
    pub async fn dispatch(&self, inbound: Inbound) -> Dispatched {
        let event = classify(&inbound.payload);
        let chat = inbound.chat_id;

        #[cfg(feature = "metrics")]
        counter!(dialog_metrics::EVENTS_TOTAL, labels::KIND => event.kind()).increment(1);

        let identity = match self.identities.resolve(&inbound.sender).await {
            Ok(identity) => identity,
            Err(e) => {
                policy::report_failure(&Error::Persistence(e), None, inbound.sender.user_id);
                let language = inbound.sender.language.as_deref();
                self.send(language, chat, vec![policy::generic_error()]).await;
                return Dispatched::Failed(None);
            },
        };
        debug!(user = %identity.id, kind = event.kind(), "inbound event");

        match &event {
            Event::Command { name, args } => self.on_command(&identity, chat, name, args).await,
            _ => match self.registry.lookup(identity.id) {
                Some(session) => {
                    self.run_step(&identity, chat, session, Some(&event), inbound.message_id)
                        .await
                },
                None => self.on_idle_event(&identity, chat, &event).await,
            },
        }
    }

    async fn on_command(
        &self,
        identity: &UserIdentity,
        chat: ChatId,
        name: &str,
        args: &[String],
    ) -> Dispatched {
        let language = identity.language.as_deref();
        match name {
            command::CANCEL => {
                let (kind, reply) = policy::cancel(&self.registry, identity.id);
                if let Some(kind) = kind {
                    info!(user = %identity.id, command = kind.name(), "session cancelled");
                }
                self.send(language, chat, vec![reply]).await;
                return Dispatched::Cancelled(kind);
            },
            command::HELP | command::START => {
                let text = self.help_text(identity, name == command::START);
                self.send(language, chat, vec![Reply::plain(text)]).await;
                return Dispatched::Help;
            },
            _ => {},
        }

        if CommandKind::from_name(name).is_none() {
            let rejection = StartRejected::UnknownCommand {
                name: name.to_string(),
            };
            self.send(language, chat, vec![policy::rejected(&rejection)])
                .await;
            return Dispatched::UnknownCommand;
        }

        let claim = self.registry.claim_or_create(identity.id, || {
            self.factory.create(name, args, identity, chat)
        });
        match claim {
            Ok(Claim::Created(session)) => {
                info!(user = %identity.id, command = session.kind.name(), "session started");
                #[cfg(feature = "metrics")]
                counter!(
                    dialog_metrics::SESSIONS_STARTED_TOTAL,
                    labels::COMMAND => session.kind.name()
                )
                .increment(1);
                self.run_step(identity, chat, session, None, None).await
            },
            Ok(Claim::AlreadyActive(active)) => {
                debug!(user = %identity.id, active = active.name(), requested = name, "command conflict");
                self.send(language, chat, vec![policy::conflict(active)]).await;
                Dispatched::Conflict(active)
            },
            Err(rejection) => {
                self.send(language, chat, vec![policy::rejected(&rejection)])
                    .await;
                match rejection {
                    StartRejected::Unauthorized { kind, required } => {
                        info!(
                            user = %identity.id,
                            command = kind.name(),
                            role = %identity.role,
                            required = %required,
                            "command not permitted"
                        );
                        Dispatched::Unauthorized(kind)
                    },
                    StartRejected::UnknownCommand { .. } => Dispatched::UnknownCommand,
                }
            },
        }
    }

    /// Run the entry transition (`event == None`) or one step of a session.
    async fn run_step(
        &self,
        identity: &UserIdentity,
        chat: ChatId,
        session: Session,
        event: Option<&Event>,
        message_id: Option<i32>,
    ) -> Dispatched {
        let ctx = StepContext {
            stores: &self.stores,
            identity,
        };
        let flow = session.descriptor().flow;
        let started = Instant::now();
        let result = match event {
            None => flow.enter(&ctx, &session).await,
            Some(event) => flow.step(&ctx, &session, event).await,
        };
        let elapsed = started.elapsed();

        #[cfg(feature = "metrics")]
        histogram!(
            dialog_metrics::STEP_DURATION_SECONDS,
            labels::COMMAND => session.kind.name()
        )
        .record(elapsed.as_secs_f64());

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.registry.remove(identity.id);
                policy::report_failure(&e, Some(&session), identity.id);
                self.send(identity.language.as_deref(), chat, vec![policy::generic_error()])
                    .await;
                return Dispatched::Failed(Some(session.kind));
            },
        };
        debug!(
            user = %identity.id,
            command = session.kind.name(),
            step = %session.step,
            outcome = outcome.kind(),
            elapsed_ms = elapsed.as_millis() as u64,
            "step evaluated"
        );

        #[cfg(feature = "metrics")]
        counter!(
            dialog_metrics::OUTCOMES_TOTAL,
            labels::COMMAND => session.kind.name(),
            labels::OUTCOME => outcome.kind()
        )
        .increment(1);

        let consumed_button = matches!(event, Some(Event::Callback { .. }))
            && !matches!(outcome, StepOutcome::Ignore);
        if consumed_button
            && let Some(message_id) = message_id
            && let Err(e) = self.outbound.clear_keyboard(chat, message_id).await
        {
            debug!(chat = %chat, message_id, error = %e, "failed to clear keyboard");
        }

        self.apply_outcome(identity, chat, &session, event.is_none(), outcome)
            .await
    }

    async fn apply_outcome(
        &self,
        identity: &UserIdentity,
        chat: ChatId,
        session: &Session,
        entering: bool,
        outcome: StepOutcome,
    ) -> Dispatched {
        let kind = session.kind;
        let language = identity.language.as_deref();
        match outcome {
            StepOutcome::Prompt(replies) => {
                self.send(language, chat, replies).await;
                if entering {
                    Dispatched::Started(kind)
                } else {
                    Dispatched::Prompted(kind)
                }
            },
            StepOutcome::Advance {
                session: next,
                replies,
            } => {
                let step = next.step;
                if !self.registry.advance(identity.id, session.step, next) {
                    debug!(user = %identity.id, command = kind.name(), "session changed during step");
                    return Dispatched::Dropped;
                }
                self.send(language, chat, replies).await;
                Dispatched::Advanced(kind, step)
            },
            StepOutcome::Complete { replies, effects } => {
                if self.registry.remove(identity.id).is_none() {
                    debug!(user = %identity.id, command = kind.name(), "session ended during step");
                    return Dispatched::Dropped;
                }
                for effect in effects {
                    if let Err(e) = self.effects.apply(identity, chat, effect).await {
                        policy::report_failure(&e, Some(session), identity.id);
                        self.send(language, chat, vec![policy::generic_error()])
                            .await;
                        return Dispatched::Failed(Some(kind));
                    }
                }
                self.send(language, chat, replies).await;
                info!(user = %identity.id, command = kind.name(), "command completed");
                Dispatched::Completed(kind)
            },
            StepOutcome::Reject { error, replies } => {
                self.registry.touch(identity.id);
                debug!(user = %identity.id, command = kind.name(), reason = error.kind(), "input rejected");
                let mut all = vec![error.reply()];
                all.extend(replies);
                self.send(language, chat, all).await;
                Dispatched::Rejected(kind, error.kind())
            },
            StepOutcome::Fail { replies, error } => {
                self.registry.remove(identity.id);
                warn!(
                    user = %identity.id,
                    command = kind.name(),
                    step = %session.step,
                    error = %error,
                    "command aborted"
                );
                let replies = if replies.is_empty() {
                    vec![policy::generic_error()]
                } else {
                    replies
                };
                self.send(language, chat, replies).await;
                Dispatched::Failed(Some(kind))
            },
            StepOutcome::Ignore => {
                debug!(user = %identity.id, command = kind.name(), step = %session.step, "event does not fit step");
                Dispatched::Ignored(kind)
            },
        }
    }

    /// Events that arrive while the user has no session.
    async fn on_idle_event(&self, identity: &UserIdentity, chat: ChatId, event: &Event) -> Dispatched {
        let language = identity.language.as_deref();
        match event {
            Event::Text { value } => {
                #[cfg(feature = "metrics")]
                counter!(dialog_metrics::SEARCHES_TOTAL).increment(1);
                match search::search(&self.stores, &self.search, value).await {
                    Ok(SearchResult::Nothing) => Dispatched::Dropped,
                    Ok(SearchResult::Single(hit)) => {
                        match self.effects.send_entry(chat, &hit.entry, &hit.topic).await {
                            Ok(()) => Dispatched::Searched(1),
                            Err(e) => self.fail_idle(identity, chat, &e).await,
                        }
                    },
                    Ok(SearchResult::Many { hits, more }) => {
                        let count = hits.len();
                        self.send(language, chat, search::results_reply(value, &hits, more))
                            .await;
                        Dispatched::Searched(count)
                    },
                    Err(e) => self.fail_idle(identity, chat, &e).await,
                }
            },
            Event::Callback { .. } => match event.callback() {
                Some(CallbackData::Entry(id)) => match self.open_entry(chat, id).await {
                    Ok(true) => Dispatched::Opened,
                    Ok(false) => {
                        self.send(language, chat, vec![Reply::key(MessageKey::EntryNotFound)])
                            .await;
                        Dispatched::Dropped
                    },
                    Err(e) => self.fail_idle(identity, chat, &e).await,
                },
                _ => {
                    debug!(user = %identity.id, "button from a finished session");
                    Dispatched::Dropped
                },
            },
            _ => Dispatched::Dropped,
        }
    }

    async fn open_entry(&self, chat: ChatId, id: EntryId) -> Result<bool> {
        let Some(entry) = self
            .stores
            .entries
            .get_entry(id)
            .await
            .map_err(Error::Persistence)?
        else {
            return Ok(false);
        };
        let topic = self
            .stores
            .topics
            .get_topic(entry.topic_id)
            .await
            .map_err(Error::Persistence)?
            .map(|t| t.name)
            .unwrap_or_default();
        self.effects.send_entry(chat, &entry, &topic).await?;
        Ok(true)
    }

    async fn fail_idle(&self, identity: &UserIdentity, chat: ChatId, error: &Error) -> Dispatched {
        policy::report_failure(error, None, identity.id);
        self.send(identity.language.as_deref(), chat, vec![policy::generic_error()])
            .await;
        Dispatched::Failed(None)
    }

    /// Remove sessions idle for at least `max_idle` and tell their owners.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let expired = self.registry.evict_idle(max_idle);
        for session in &expired {
            info!(
                user = %session.user_id,
                command = session.kind.name(),
                step = %session.step,
                "session expired"
            );
            #[cfg(feature = "metrics")]
            counter!(
                dialog_metrics::SESSIONS_EXPIRED_TOTAL,
                labels::COMMAND => session.kind.name()
            )
            .increment(1);
            let language = match self.stores.users.get_user(session.user_id).await {
                Ok(record) => record.and_then(|r| r.language),
                Err(_) => None,
            };
            self.send(language.as_deref(), session.chat_id, vec![policy::expired(
                session.kind,
            )])
            .await;
        }
        expired.len()
    }

    /// Run [`Dispatcher::expire_idle`] every `every` until cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        max_idle: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = dispatcher.expire_idle(max_idle).await;
                        if expired > 0 {
                            debug!(expired, "idle sweep");
                        }
                    }
                }
            }
        })
    }

    /// `(command, description)` pairs for the transport's command menu.
    pub fn command_menu(&self, language: Option<&str>) -> Vec<(&'static str, String)> {
        let describe = |key: MessageKey| self.localizer.translate(language, key, &[]);
        let mut menu: Vec<_> = DESCRIPTORS
            .iter()
            .map(|d| (d.name, describe(d.summary)))
            .collect();
        menu.push((command::CANCEL, describe(MessageKey::HelpCancel)));
        menu.push((command::HELP, describe(MessageKey::HelpHelp)));
        menu
    }

    /// Commands the caller may use, one per line.
    fn help_text(&self, identity: &UserIdentity, welcome: bool) -> String {
        let language = identity.language.as_deref();
        let header = if welcome {
            self.localizer.translate(language, MessageKey::Welcome, &[(
                "name",
                identity.display_name.clone(),
            )])
        } else {
            self.localizer.translate(language, MessageKey::HelpHeader, &[])
        };
        let mut lines = vec![header];
        lines.extend(
            DESCRIPTORS
                .iter()
                .filter(|d| identity.role.satisfies(d.required_role))
                .map(|d| {
                    format!(
                        "/{} - {}",
                        d.name,
                        self.localizer.translate(language, d.summary, &[])
                    )
                }),
        );
        for (name, key) in [
            (command::CANCEL, MessageKey::HelpCancel),
            (command::HELP, MessageKey::HelpHelp),
        ] {
            lines.push(format!(
                "/{name} - {}",
                self.localizer.translate(language, key, &[])
            ));
        }
        lines.join("\n")
    }

    fn localize(&self, language: Option<&str>, reply: &Reply) -> OutboundMessage {
        let localizer = self.localizer.as_ref();
        OutboundMessage {
            text: reply.text.localize(localizer, language),
            buttons: reply
                .keyboard
                .iter()
                .flat_map(|k| &k.rows)
                .map(|row| {
                    row.iter()
                        .map(|b| ButtonSpec {
                            label: b.label.localize(localizer, language),
                            data: b.data.clone(),
                        })
                        .collect()
                })
                .collect(),
        }
    }

    /// Deliver replies in order. Delivery failures are logged and skipped.
    async fn send(&self, language: Option<&str>, chat: ChatId, replies: Vec<Reply>) {
        for reply in replies {
            let message = self.localize(language, &reply);
            if let Err(e) = self.outbound.send_text(chat, &message).await {
                warn!(chat = %chat, error = %e, "failed to send reply");
            }
        }
    }
}
