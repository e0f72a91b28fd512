//! Per-user ordered dispatch.
//!
//! Each user with pending events gets a lane: an unbounded queue drained by
//! one worker task. A user's events are therefore handled one at a time in
//! receipt order, while different users run concurrently. Idle lanes retire
//! and are recreated on the next event.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    lorebot_common::UserId,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{dialogs as dialog_metrics, gauge};

use crate::{dispatch::Dispatcher, event::Inbound};

type Lanes = DashMap<UserId, mpsc::UnboundedSender<Inbound>>;

pub struct UserLanes {
    dispatcher: Arc<Dispatcher>,
    lanes: Arc<Lanes>,
    idle: Duration,
    cancel: CancellationToken,
    running: Arc<AtomicUsize>,
}

impl UserLanes {
    pub fn new(dispatcher: Arc<Dispatcher>, idle: Duration, cancel: CancellationToken) -> Self {
        Self {
            dispatcher,
            lanes: Arc::new(DashMap::new()),
            idle,
            cancel,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue an event on the sender's lane, creating the lane if needed.
    pub fn submit(&self, inbound: Inbound) {
        if self.cancel.is_cancelled() {
            debug!(user = %inbound.sender.user_id, "dropping event after shutdown");
            return;
        }
        let user = inbound.sender.user_id;
        let mut pending = inbound;
        loop {
            match self.lanes.entry(user) {
                Entry::Occupied(lane) => {
                    let sent = lane.get().send(pending);
                    match sent {
                        Ok(()) => return,
                        Err(mpsc::error::SendError(returned)) => {
                            // Worker is gone; replace the lane.
                            lane.remove();
                            pending = returned;
                        },
                    }
                },
                Entry::Vacant(slot) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    if let Err(mpsc::error::SendError(returned)) = tx.send(pending) {
                        warn!(user = %returned.sender.user_id, "lane closed before first event");
                        return;
                    }
                    slot.insert(tx);
                    self.spawn_worker(user, rx);
                    return;
                },
            }
        }
    }

    /// Number of live lanes.
    pub fn active(&self) -> usize {
        self.lanes.len()
    }

    /// Stop accepting events and wait up to `timeout` for in-flight work.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        self.lanes.clear();
        let deadline = tokio::time::Instant::now() + timeout;
        while self.running.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    running = self.running.load(Ordering::SeqCst),
                    "lanes still busy at shutdown"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn spawn_worker(&self, user: UserId, rx: mpsc::UnboundedReceiver<Inbound>) {
        let worker = LaneWorker {
            dispatcher: Arc::clone(&self.dispatcher),
            lanes: Arc::clone(&self.lanes),
            user,
            idle: self.idle,
            cancel: self.cancel.clone(),
            _running: RunningGuard::new(Arc::clone(&self.running)),
        };
        record_lanes(&self.lanes);
        tokio::spawn(worker.run(rx));
    }
}

struct LaneWorker {
    dispatcher: Arc<Dispatcher>,
    lanes: Arc<Lanes>,
    user: UserId,
    idle: Duration,
    cancel: CancellationToken,
    _running: RunningGuard,
}

impl LaneWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        debug!(user = %self.user, "lane opened");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                next = tokio::time::timeout(self.idle, rx.recv()) => match next {
                    Ok(Some(inbound)) => {
                        let outcome = self.dispatcher.dispatch(inbound).await;
                        debug!(user = %self.user, ?outcome, "event handled");
                    },
                    Ok(None) => break,
                    Err(_) => {
                        // Retire only if nothing was queued while we timed out;
                        // submitters hold the same entry lock when sending.
                        if self.lanes.remove_if(&self.user, |_, _| rx.is_empty()).is_some() {
                            break;
                        }
                    },
                },
            }
        }
        record_lanes(&self.lanes);
        debug!(user = %self.user, "lane closed");
    }
}

struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn record_lanes(lanes: &Lanes) {
    #[cfg(feature = "metrics")]
    gauge!(dialog_metrics::LANES_ACTIVE).set(lanes.len() as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = lanes;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            event::{CallbackData, InboundPayload, Sender},
            memory::MemoryStore,
            session::Step,
            store::{NewTopic, Stores, TopicStore},
            testing::{RecordingOutbound, StubRenderer},
        },
        lorebot_common::{ChatId, Role, TopicId},
        lorebot_config::AccessConfig,
    };

    fn inbound(user: i64, payload: InboundPayload) -> Inbound {
        Inbound {
            sender: Sender {
                user_id: UserId(user),
                display_name: format!("user{user}"),
                username: None,
                language: None,
            },
            chat_id: ChatId(user),
            payload,
            message_id: None,
        }
    }

    fn text(user: i64, value: &str) -> Inbound {
        inbound(user, InboundPayload::Text(value.into()))
    }

    async fn setup(idle: Duration) -> (UserLanes, Arc<Dispatcher>, Arc<RecordingOutbound>, TopicId) {
        let store = Arc::new(MemoryStore::new());
        let topic = store
            .create_topic(NewTopic {
                name: "Ashfall".into(),
                name_key: "ashfall".into(),
            })
            .await
            .unwrap();
        let outbound = Arc::new(RecordingOutbound::default());
        let dispatcher = Arc::new(
            Dispatcher::new(
                Stores::from_backend(store),
                Arc::new(StubRenderer::default()),
                outbound.clone(),
            )
            .with_access(AccessConfig {
                default_role: Role::Editor,
                ..AccessConfig::default()
            }),
        );
        let lanes = UserLanes::new(Arc::clone(&dispatcher), idle, CancellationToken::new());
        (lanes, dispatcher, outbound, topic.id)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_users_events_apply_in_order() {
        let (lanes, dispatcher, outbound, topic) = setup(Duration::from_secs(5)).await;
        lanes.submit(text(1, "/newentry"));
        lanes.submit(inbound(
            1,
            InboundPayload::Callback(CallbackData::Topic(topic).to_string()),
        ));
        lanes.submit(text(1, "Aëlin"));

        wait_for(|| outbound.messages().len() == 3).await;
        let session = dispatcher.registry().lookup(UserId(1)).unwrap();
        assert_eq!(session.step, Step::EnterContent);
        assert_eq!(session.accumulated.name.as_deref(), Some("Aëlin"));
        assert_eq!(lanes.active(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn users_get_independent_lanes() {
        let (lanes, dispatcher, outbound, _) = setup(Duration::from_secs(5)).await;
        for user in 1..=5 {
            lanes.submit(text(user, "/newentry"));
        }
        wait_for(|| outbound.messages().len() == 5).await;
        assert_eq!(dispatcher.registry().len(), 5);
        assert_eq!(lanes.active(), 5);
    }

    #[tokio::test]
    async fn idle_lane_retires_and_reopens() {
        let (lanes, _, outbound, _) = setup(Duration::from_millis(30)).await;
        lanes.submit(text(1, "/help"));
        wait_for(|| outbound.messages().len() == 1).await;
        wait_for(|| lanes.active() == 0).await;

        lanes.submit(text(1, "/help"));
        wait_for(|| outbound.messages().len() == 2).await;
    }

    #[tokio::test]
    async fn shutdown_stops_accepting_events() {
        let (lanes, _, outbound, _) = setup(Duration::from_secs(5)).await;
        lanes.submit(text(1, "/help"));
        wait_for(|| outbound.messages().len() == 1).await;

        lanes.shutdown(Duration::from_secs(1)).await;
        assert_eq!(lanes.active(), 0);
        lanes.submit(text(1, "/help"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(outbound.messages().len(), 1);
    }
}
