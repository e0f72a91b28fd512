//! At most one active session per user.

use std::time::{Duration, Instant};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    lorebot_common::UserId,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{dialogs as dialog_metrics, gauge};

use crate::{
    command::CommandKind,
    session::{Session, Step},
};

/// Result of [`SessionRegistry::claim_or_create`].
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Created(Session),
    /// The user already has a session; it was left untouched.
    AlreadyActive(CommandKind),
}

/// Concurrent map from user to their single in-progress session.
///
/// Every operation is atomic per user. Shard locks are only held inside these
/// methods, never across an await point.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<UserId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the session built by `create` unless one already exists. The
    /// check and the insert happen under the same entry lock, so two racing
    /// callers cannot both create.
    pub fn claim_or_create<E>(
        &self,
        user: UserId,
        create: impl FnOnce() -> Result<Session, E>,
    ) -> Result<Claim, E> {
        match self.sessions.entry(user) {
            Entry::Occupied(existing) => Ok(Claim::AlreadyActive(existing.get().kind)),
            Entry::Vacant(slot) => {
                let session = create()?;
                slot.insert(session.clone());
                self.record_size();
                Ok(Claim::Created(session))
            },
        }
    }

    /// Snapshot of the user's session.
    pub fn lookup(&self, user: UserId) -> Option<Session> {
        self.sessions.get(&user).map(|s| s.clone())
    }

    /// Swap in `next` if the stored session is still at `from`. Returns
    /// `false` when the session was removed or moved on in the meantime.
    pub fn advance(&self, user: UserId, from: Step, next: Session) -> bool {
        let Some(mut current) = self.sessions.get_mut(&user) else {
            return false;
        };
        if current.step != from || current.kind != next.kind {
            debug!(user = %user, expected = %from, actual = %current.step, "stale session advance");
            return false;
        }
        *current = next;
        true
    }

    /// Refresh the idle clock without changing the step.
    pub fn touch(&self, user: UserId) {
        if let Some(mut current) = self.sessions.get_mut(&user) {
            current.updated_at = Instant::now();
        }
    }

    /// Remove the user's session. Removing an absent session is a no-op.
    pub fn remove(&self, user: UserId) -> Option<Session> {
        let removed = self.sessions.remove(&user).map(|(_, mut session)| {
            session.terminal = true;
            session
        });
        if removed.is_some() {
            self.record_size();
        }
        removed
    }

    /// Remove every session idle for at least `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<Session> {
        let stale: Vec<UserId> = self
            .sessions
            .iter()
            .filter(|s| s.updated_at.elapsed() >= max_idle)
            .map(|s| *s.key())
            .collect();
        let evicted: Vec<Session> = stale
            .into_iter()
            .filter_map(|user| {
                self.sessions
                    .remove_if(&user, |_, s| s.updated_at.elapsed() >= max_idle)
            })
            .map(|(_, mut session)| {
                session.terminal = true;
                session
            })
            .collect();
        if !evicted.is_empty() {
            self.record_size();
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn record_size(&self) {
        #[cfg(feature = "metrics")]
        gauge!(dialog_metrics::SESSIONS_ACTIVE).set(self.sessions.len() as f64);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::session::Accumulated,
        lorebot_common::ChatId,
        std::{convert::Infallible, sync::Arc},
    };

    fn fresh(kind: CommandKind, user: i64) -> Result<Session, Infallible> {
        Ok(Session::start(
            kind,
            UserId(user),
            ChatId(user),
            Accumulated::default(),
        ))
    }

    #[test]
    fn second_claim_reports_existing_kind() {
        let registry = SessionRegistry::new();
        let first = registry
            .claim_or_create(UserId(1), || fresh(CommandKind::NewEntry, 1))
            .unwrap();
        assert!(matches!(first, Claim::Created(_)));

        let second = registry
            .claim_or_create(UserId(1), || fresh(CommandKind::SetRole, 1))
            .unwrap();
        assert_eq!(second, Claim::AlreadyActive(CommandKind::NewEntry));
        assert_eq!(registry.lookup(UserId(1)).unwrap().kind, CommandKind::NewEntry);
    }

    #[test]
    fn failed_factory_inserts_nothing() {
        let registry = SessionRegistry::new();
        let result: Result<Claim, &str> = registry.claim_or_create(UserId(1), || Err("denied"));
        assert_eq!(result, Err("denied"));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry
            .claim_or_create(UserId(1), || fresh(CommandKind::NewTopic, 1))
            .unwrap();
        let removed = registry.remove(UserId(1)).unwrap();
        assert!(removed.terminal);
        assert!(registry.remove(UserId(1)).is_none());
        assert!(registry.lookup(UserId(1)).is_none());
    }

    #[test]
    fn advance_rejects_stale_step() {
        let registry = SessionRegistry::new();
        let Claim::Created(session) = registry
            .claim_or_create(UserId(1), || fresh(CommandKind::NewEntry, 1))
            .unwrap()
        else {
            panic!("expected a new session");
        };
        let next = session
            .advance(Step::EnterName, session.accumulated.clone())
            .unwrap();
        assert!(registry.advance(UserId(1), Step::SelectTopic, next.clone()));
        assert!(!registry.advance(UserId(1), Step::SelectTopic, next.clone()));
        registry.remove(UserId(1));
        assert!(!registry.advance(UserId(1), Step::EnterName, next));
    }

    #[test]
    fn evicts_only_idle_sessions() {
        let registry = SessionRegistry::new();
        registry
            .claim_or_create(UserId(1), || {
                fresh(CommandKind::NewEntry, 1).map(|mut s| {
                    s.updated_at = Instant::now()
                        .checked_sub(Duration::from_secs(120))
                        .unwrap();
                    s
                })
            })
            .unwrap();
        registry
            .claim_or_create(UserId(2), || fresh(CommandKind::NewEntry, 2))
            .unwrap();

        let evicted = registry.evict_idle(Duration::from_secs(60));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].user_id, UserId(1));
        assert!(registry.lookup(UserId(2)).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_create_exactly_one_session() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .claim_or_create(UserId(7), || fresh(CommandKind::Subscribe, 7))
                    .unwrap()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Claim::Created(_)) {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);
    }
}
