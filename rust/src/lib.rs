mod actions;
mod core;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use anyhow::Context;
use flume::{Receiver, Sender};
use murmur_remote::{HttpBackend, RealtimeConfig, RealtimeTransport};

pub use actions::AppAction;
pub use crate::core::{load_config, MurmurConfig};
pub use murmur_storage_traits::{
    BackendError, ChannelStatus, Contact, ConversationSummary, Message, MessageBackend, MessageId,
    Profile, PushDirection, PushError, PushEvent, PushSignal, PushTransport, UserId,
};
pub use state::*;
pub use updates::*;

pub trait UpdateListener: Send + Sync + 'static {
    fn on_update(&self, update: AppUpdate);
}

/// Handle to the sync engine. All work happens on a single actor thread;
/// methods never block the caller.
pub struct MurmurApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl MurmurApp {
    /// Engine wired to the given collaborators. Settings come from
    /// `<data_dir>/murmur_config.json` and the environment.
    pub fn new(
        data_dir: &str,
        backend: Arc<dyn MessageBackend>,
        push: Arc<dyn PushTransport>,
    ) -> anyhow::Result<Arc<Self>> {
        let (config, config_error) = crate::core::read_config(data_dir);
        logging::init_logging(data_dir, config.log_to_file());
        if let Some(e) = config_error {
            tracing::warn!(error = %format!("{e:#}"), "invalid config file, using defaults");
        }
        Self::with_config(data_dir, config, backend, push)
    }

    /// Engine wired to the hosted REST API and realtime service named by the
    /// configuration.
    pub fn from_config(data_dir: &str, config: MurmurConfig) -> anyhow::Result<Arc<Self>> {
        let backend = HttpBackend::new(config.api_base_url(), config.http_timeout())
            .context("create http backend")?;
        let realtime_url = config
            .realtime_url
            .clone()
            .context("realtime_url is not configured")?;
        let api_key = config
            .realtime_api_key
            .clone()
            .context("realtime_api_key is not configured")?;
        let push = RealtimeTransport::new(RealtimeConfig {
            url: realtime_url,
            api_key,
            access_token: config.realtime_access_token.clone(),
            heartbeat_interval: config.heartbeat_interval(),
        });
        Self::with_config(data_dir, config, Arc::new(backend), Arc::new(push))
    }

    pub fn with_config(
        data_dir: &str,
        config: MurmurConfig,
        backend: Arc<dyn MessageBackend>,
        push: Arc<dyn PushTransport>,
    ) -> anyhow::Result<Arc<Self>> {
        // No-op when `new` already installed the subscriber.
        logging::init_logging(data_dir, config.log_to_file());
        tracing::info!(data_dir = %data_dir, "MurmurApp::new() starting");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads())
            .thread_name("murmur-io")
            .enable_time()
            .enable_io()
            .build()
            .context("build tokio runtime")?;

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::Builder::new()
            .name("murmur-core".into())
            .spawn(move || {
                let mut core = crate::core::AppCore::new(
                    update_tx,
                    core_tx_for_core,
                    &config,
                    shared_for_core,
                    runtime,
                    backend,
                    push,
                );
                while let Ok(msg) = core_rx.recv() {
                    core.handle_message(msg);
                }
            })
            .context("spawn actor thread")?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        }))
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, listener: Box<dyn UpdateListener>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                listener.on_update(update);
            }
        });
    }
}
