#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use murmur_core::{AppAction, AppState, AppUpdate, MurmurApp, Profile, UpdateListener, UserId};
use murmur_memory_storage::{MemoryBackend, MemoryPushHub};
use tempfile::TempDir;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub struct TestListener {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestListener {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl UpdateListener for TestListener {
    fn on_update(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

pub fn user(name: &str) -> UserId {
    UserId::from(format!("{name}@example.com"))
}

/// A shared in-memory backend + push hub with three registered users.
pub struct World {
    pub hub: MemoryPushHub,
    pub backend: Arc<MemoryBackend>,
}

impl World {
    pub fn new() -> Self {
        let hub = MemoryPushHub::new();
        let backend = Arc::new(MemoryBackend::with_push(hub.clone()));
        for (name, display) in [("ana", "Ana"), ("bob", "Bob"), ("carol", "Carol")] {
            backend.register_user(
                user(name),
                Profile {
                    username: Some(display.to_string()),
                    avatar_url: Some(format!("https://cdn.example.com/{name}.png")),
                },
            );
        }
        Self { hub, backend }
    }

    /// A fresh engine instance with its own data dir. Not signed in.
    pub fn app(&self) -> Client {
        let dir = tempfile::tempdir().unwrap();
        let app = MurmurApp::new(
            dir.path().to_str().unwrap(),
            self.backend.clone(),
            Arc::new(self.hub.clone()),
        )
        .unwrap();
        Client { app, _dir: dir }
    }

    /// A fresh engine signed in as `name`, with a live subscription.
    pub fn signed_in(&self, name: &str) -> Client {
        let client = self.app();
        client.sign_in(name);
        client
    }
}

pub struct Client {
    pub app: Arc<MurmurApp>,
    _dir: TempDir,
}

impl Client {
    pub fn state(&self) -> AppState {
        self.app.state()
    }

    pub fn dispatch(&self, action: AppAction) {
        self.app.dispatch(action);
    }

    pub fn sign_in(&self, name: &str) {
        self.dispatch(AppAction::SignIn { user: user(name) });
        wait_until("subscribed", TIMEOUT, || {
            let s = self.state();
            s.signed_in_user() == Some(&user(name)) && s.subscription.is_live()
        });
    }

    pub fn open(&self, name: &str) {
        self.dispatch(AppAction::OpenConversation { peer: user(name) });
        wait_until("history loaded", TIMEOUT, || {
            let s = self.state();
            s.open_peer() == Some(&user(name)) && !s.busy.loading_history
        });
    }

    pub fn send(&self, to: &str, content: &str) {
        self.dispatch(AppAction::SendMessage {
            receiver: user(to),
            content: content.to_string(),
        });
    }

    pub fn contents(&self) -> Vec<String> {
        self.state()
            .current_conversation
            .map(|c| c.messages.iter().map(|m| m.content.clone()).collect())
            .unwrap_or_default()
    }
}
