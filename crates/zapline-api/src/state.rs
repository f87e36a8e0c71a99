//! Application state wiring
//!
//! Everything is constructed once at startup and injected; there are no
//! process-wide singletons. The flow engine plugs into the ingest pipeline
//! through the `AutomationHook` seam.

use crate::config::Config;
use sea_orm::DatabaseConnection;
use std::path::PathBuf;
use std::sync::Arc;
use zapline_core::broadcast::BroadcastDispatcher;
use zapline_core::forward::ExternalForwarder;
use zapline_core::ingest::IngestPipeline;
use zapline_core::outbound::{OutboundMessenger, ProviderSender};
use zapline_core::realtime::RealtimeHub;
use zapline_core::scheduler::Scheduler;
use zapline_db::PgStore;
use zapline_flow::{FlowEngine, FlowEngineConfig};
use zapline_whatsapp::CloudApiClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: PgStore,
    pub hub: Arc<RealtimeHub>,
    pub provider: Arc<CloudApiClient>,
    pub outbound: Arc<OutboundMessenger>,
    pub pipeline: Arc<IngestPipeline>,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn build(config: Config, db: Arc<DatabaseConnection>) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let store = PgStore::new(db);
        let store_arc = Arc::new(store.clone());
        let hub = Arc::new(RealtimeHub::new());
        let provider = Arc::new(CloudApiClient::new(config.api_version.clone())?);

        let sender = Arc::new(ProviderSender::new(provider.clone()));
        let outbound = Arc::new(OutboundMessenger::new(
            sender.clone(),
            store_arc.clone(),
            hub.clone(),
        ));

        let engine = Arc::new(FlowEngine::new(
            store_arc.clone(),
            store_arc.clone(),
            store_arc.clone(),
            outbound.clone(),
            provider.clone(),
            store_arc.clone(),
            FlowEngineConfig {
                media_dir: PathBuf::from(&config.media_dir),
                public_base_url: config.public_base_url.clone(),
                ..FlowEngineConfig::default()
            },
        ));

        let pipeline = Arc::new(IngestPipeline::new(
            store_arc.clone(),
            store_arc.clone(),
            store_arc.clone(),
            hub.clone(),
            provider.clone(),
            ExternalForwarder::new(),
            engine,
            config.dev_mode,
        ));

        let dispatcher = Arc::new(BroadcastDispatcher::new(
            store_arc.clone(),
            store_arc.clone(),
            store_arc.clone(),
            sender.clone(),
            hub.clone(),
        ));

        let scheduler = Arc::new(Scheduler::new(
            store_arc.clone(),
            store_arc.clone(),
            store_arc,
            dispatcher.clone(),
            sender,
        ));

        Ok(Self {
            config,
            store,
            hub,
            provider,
            outbound,
            pipeline,
            dispatcher,
            scheduler,
        })
    }
}
