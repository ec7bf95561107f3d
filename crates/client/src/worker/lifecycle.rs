//! Lifecycle Controller.
//!
//! Hosts deliver events through [`ServiceWorker::dispatch`], which routes
//! each event kind to its handler:
//!
//! ```text
//! Install  -> open store, precache, signal skip-waiting
//! Activate -> evict every other store, claim clients
//! Fetch    -> Router (passthrough until clients are claimed)
//! Message  -> SKIP_WAITING | GET_VERSION
//! ```
//!
//! Every handler returns a [`Handled`] whose `lifetime` the host must
//! await before treating the event as complete.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::context::WorkerContext;
use super::lifetime::WaitUntil;
use super::request::Request;
use super::router::{FetchDisposition, Router};
use super::store::{CacheStoreManager, EvictReport, PopulateReport};
use crate::fetch::Network;
use shellcache_core::{AppConfig, CacheDb, Error};

/// Worker lifecycle phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    #[default]
    Parsed,
    Installing,
    /// Installed and waiting for activation.
    Installed,
    Activating,
    Activated,
    /// Install failed; the worker will never control clients.
    Redundant,
}

/// Commands posted to the worker by controlled pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker now ("refresh to update" flows).
    SkipWaiting,
    GetVersion,
}

impl WorkerMessage {
    /// Parse a JSON message such as `{"type":"SKIP_WAITING"}`.
    pub fn parse(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("unrecognized message: {e}")))
    }
}

/// Events delivered by the host environment.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(WorkerMessage),
}

/// Reply to a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageReply {
    SkipWaiting { activated: bool },
    Version { version: String, store_name: String },
}

/// Handler result for one event.
#[derive(Debug, Clone)]
pub enum EventReply {
    Installed { report: PopulateReport, skip_waiting: bool },
    Activated { report: EvictReport, claimed: bool },
    Fetch(FetchDisposition),
    Message(MessageReply),
}

/// A handled event plus the work it still has in flight.
#[derive(Debug)]
pub struct Handled {
    pub reply: EventReply,
    pub lifetime: WaitUntil,
}

/// What [`ServiceWorker::start`] did.
#[derive(Debug, Clone, Default)]
pub struct StartReport {
    pub populate: PopulateReport,
    pub evict: Option<EvictReport>,
}

#[derive(Debug, Default)]
struct WorkerState {
    phase: WorkerPhase,
    skip_waiting: bool,
    controlling: bool,
}

/// The worker: context, store manager and router behind one dispatch entry point.
pub struct ServiceWorker {
    ctx: Arc<WorkerContext>,
    store: CacheStoreManager,
    router: Router,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    pub fn new(ctx: WorkerContext, db: CacheDb, network: Arc<dyn Network>) -> Self {
        let ctx = Arc::new(ctx);
        let store = CacheStoreManager::new(db, ctx.clone(), network.clone());
        let router = Router::new(ctx.clone(), store.clone(), network);
        Self { ctx, store, router, state: RwLock::new(WorkerState::default()) }
    }

    /// Build a worker from loaded configuration.
    pub fn from_config(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        Ok(Self::new(WorkerContext::from_config(config)?, db, network))
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn store(&self) -> &CacheStoreManager {
        &self.store
    }

    pub async fn phase(&self) -> WorkerPhase {
        self.state.read().await.phase
    }

    /// Whether the worker has claimed its clients.
    pub async fn is_controlling(&self) -> bool {
        self.state.read().await.controlling
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<Handled, Error> {
        let lifetime = WaitUntil::new();
        let reply = match event {
            WorkerEvent::Install => self.on_install().await?,
            WorkerEvent::Activate => self.on_activate().await?,
            WorkerEvent::Fetch(request) => EventReply::Fetch(self.on_fetch(&request, &lifetime).await),
            WorkerEvent::Message(message) => EventReply::Message(self.on_message(message).await?),
        };
        Ok(Handled { reply, lifetime })
    }

    /// Host helper: install, then activate at once if skip-waiting was signalled.
    pub async fn start(&self) -> Result<StartReport, Error> {
        let installed = self.dispatch(WorkerEvent::Install).await?;
        let reply = installed.reply;
        installed.lifetime.settled().await;

        let EventReply::Installed { report, skip_waiting } = reply else {
            return Err(Error::WorkerState("install produced no install reply".into()));
        };

        let mut start = StartReport { populate: report, evict: None };
        if skip_waiting {
            let activated = self.dispatch(WorkerEvent::Activate).await?;
            if let EventReply::Activated { report, .. } = activated.reply {
                start.evict = Some(report);
            }
            activated.lifetime.settled().await;
        }

        Ok(start)
    }

    async fn transition(&self, from: &[WorkerPhase], to: WorkerPhase) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if !from.contains(&state.phase) {
            return Err(Error::WorkerState(format!("cannot enter {:?} from {:?}", to, state.phase)));
        }
        state.phase = to;
        Ok(())
    }

    async fn on_install(&self) -> Result<EventReply, Error> {
        self.transition(&[WorkerPhase::Parsed], WorkerPhase::Installing).await?;
        tracing::info!(version = %self.ctx.version, store = %self.ctx.store_name, "installing");

        let report = match self.store.populate(&self.ctx.precache).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "install failed");
                self.state.write().await.phase = WorkerPhase::Redundant;
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        state.phase = WorkerPhase::Installed;
        state.skip_waiting = true;
        tracing::info!(version = %self.ctx.version, "installed, skipping waiting");

        Ok(EventReply::Installed { report, skip_waiting: state.skip_waiting })
    }

    async fn on_activate(&self) -> Result<EventReply, Error> {
        self.transition(&[WorkerPhase::Installed], WorkerPhase::Activating).await?;

        let report = match self.store.evict_all_except(&self.ctx.store_name).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "could not list stores for eviction");
                EvictReport::default()
            }
        };

        let mut state = self.state.write().await;
        state.phase = WorkerPhase::Activated;
        state.controlling = true;
        tracing::info!(
            version = %self.ctx.version,
            evicted = report.deleted.len(),
            "activated and claimed clients"
        );

        Ok(EventReply::Activated { report, claimed: state.controlling })
    }

    async fn on_fetch(&self, request: &Request, lifetime: &WaitUntil) -> FetchDisposition {
        if !self.is_controlling().await {
            tracing::debug!("not controlling yet, passthrough {}", request.url);
            return FetchDisposition::Passthrough;
        }
        self.router.handle(request, lifetime).await
    }

    async fn on_message(&self, message: WorkerMessage) -> Result<MessageReply, Error> {
        match message {
            WorkerMessage::SkipWaiting => {
                let waiting = {
                    let mut state = self.state.write().await;
                    state.skip_waiting = true;
                    state.phase == WorkerPhase::Installed
                };
                if waiting {
                    self.on_activate().await?;
                }
                Ok(MessageReply::SkipWaiting { activated: waiting })
            }
            WorkerMessage::GetVersion => Ok(MessageReply::Version {
                version: self.ctx.version.clone(),
                store_name: self.ctx.store_name.clone(),
            }),
        }
    }
}
