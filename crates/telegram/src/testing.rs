//! Local stand-in for the Bot API, served with axum.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::Uri,
        routing::post,
    },
    serde_json::{Value, json},
    tokio::{sync::oneshot, task::JoinHandle},
};

#[derive(Clone, Default)]
struct Recorded {
    calls: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    updates: Arc<Mutex<VecDeque<Value>>>,
}

pub(crate) struct MockTelegramApi {
    addr: std::net::SocketAddr,
    recorded: Recorded,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

fn message_result(chat_id: i64) -> Value {
    json!({
        "message_id": 1,
        "date": 1,
        "chat": { "id": chat_id, "type": "private", "first_name": "Mira" },
        "text": "ok"
    })
}

async fn api_handler(State(recorded): State<Recorded>, uri: Uri, body: Bytes) -> Json<Value> {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let chat_id = payload["chat_id"].as_i64().unwrap_or(42);
    if let Ok(mut calls) = recorded.calls.lock() {
        calls.entry(method.clone()).or_default().push(payload);
    }

    let result = match method.as_str() {
        "GetUpdates" => {
            let next = recorded.updates.lock().ok().and_then(|mut u| u.pop_front());
            match next {
                Some(batch) => batch,
                None => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    json!([])
                },
            }
        },
        "GetFile" => json!({
            "file_id": "photo-1",
            "file_unique_id": "unique-1",
            "file_size": 11,
            "file_path": "photos/file_1.jpg"
        }),
        "SendMessage" | "SendDocument" | "EditMessageReplyMarkup" => message_result(chat_id),
        _ => json!(true),
    };
    Json(json!({ "ok": true, "result": result }))
}

async fn file_handler() -> &'static [u8] {
    b"image-bytes"
}

impl MockTelegramApi {
    pub(crate) async fn start() -> Self {
        let recorded = Recorded::default();
        let app = Router::new()
            .route("/{*path}", post(api_handler).get(file_handler))
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        Self {
            addr,
            recorded,
            shutdown: Some(shutdown_tx),
            server,
        }
    }

    pub(crate) fn bot(&self) -> teloxide::Bot {
        let api_url =
            reqwest::Url::parse(&format!("http://{}/", self.addr)).expect("parse api url");
        teloxide::Bot::new("test-token").set_api_url(api_url)
    }

    /// Queue one getUpdates response.
    pub(crate) fn push_updates(&self, updates: Value) {
        self.recorded
            .updates
            .lock()
            .expect("lock updates")
            .push_back(updates);
    }

    pub(crate) fn calls(&self, method: &str) -> Vec<Value> {
        self.recorded
            .calls
            .lock()
            .expect("lock calls")
            .get(method)
            .cloned()
            .unwrap_or_default()
    }

    /// Poll until `method` has been called at least `count` times.
    pub(crate) async fn wait_for(&self, method: &str, count: usize) -> Vec<Value> {
        for _ in 0..100 {
            let calls = self.calls(method);
            if calls.len() >= count {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {count} {method} call(s)");
    }

    pub(crate) async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.server).await;
    }
}
