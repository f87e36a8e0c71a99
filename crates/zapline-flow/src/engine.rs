//! The flow interpreter
//!
//! One invocation per inbound event. The engine decides which flow handles
//! the event (or which suspended session resumes), then walks the graph
//! executing node effects until it suspends at an input-awaiting node,
//! exhausts the step cap, or runs off the graph. Session state is persisted
//! at every node boundary, so a crash mid-invocation resumes cleanly.

use crate::exec_integrations as integrations;
use crate::exec_logic as logic;
use crate::exec_messaging as messaging;
use crate::graph::{select_flow, LoadedFlow};
use crate::nodes::NodeConfig;
use crate::session::Session;
use crate::vars::VarValue;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zapline_core::errors::CoreResult;
use zapline_core::ingest::AutomationHook;
use zapline_core::model::{ContactRecord, ConversationRecord, MessageRecord, TenantRecord};
use zapline_core::outbound::OutboundMessenger;
use zapline_core::store::{FlowStore, InboxStore, SessionStore, SqlRunner};
use zapline_whatsapp::{CloudApiClient, InboundMessage};

/// Per-invocation step cap; defends against cyclic edges.
const DEFAULT_STEP_CAP: usize = 30;

/// Upper bound on `delay` nodes so a flow cannot park a worker for minutes.
const MAX_DELAY_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct FlowEngineConfig {
    pub step_cap: usize,
    /// Directory where `media_forward` saves files in `save` mode.
    pub media_dir: PathBuf,
    /// Public base URL prefixed to saved media paths.
    pub public_base_url: String,
    pub max_delay_secs: u64,
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self {
            step_cap: DEFAULT_STEP_CAP,
            media_dir: PathBuf::from("./media"),
            public_base_url: "http://localhost:8080".to_string(),
            max_delay_secs: MAX_DELAY_SECS,
        }
    }
}

/// Everything one invocation knows about its inbound event.
pub(crate) struct ExecCtx<'a> {
    pub tenant: &'a TenantRecord,
    pub contact: &'a ContactRecord,
    pub conversation: &'a ConversationRecord,
    pub inbound: &'a InboundMessage,
    pub record: &'a MessageRecord,
}

/// What executing one node decided.
pub(crate) enum StepOutcome {
    /// Follow the edge with this output handle.
    Next(String),
    /// Persist state and wait for the next inbound event.
    Suspend,
    /// End the session.
    Terminate,
}

impl StepOutcome {
    pub fn next_default() -> Self {
        StepOutcome::Next("default".to_string())
    }
}

pub struct FlowEngine {
    flows: Arc<dyn FlowStore>,
    sessions: Arc<dyn SessionStore>,
    pub(crate) inbox: Arc<dyn InboxStore>,
    pub(crate) outbound: Arc<OutboundMessenger>,
    pub(crate) provider: Arc<CloudApiClient>,
    pub(crate) sql: Arc<dyn SqlRunner>,
    pub(crate) http: reqwest::Client,
    pub(crate) config: FlowEngineConfig,
}

impl FlowEngine {
    pub fn new(
        flows: Arc<dyn FlowStore>,
        sessions: Arc<dyn SessionStore>,
        inbox: Arc<dyn InboxStore>,
        outbound: Arc<OutboundMessenger>,
        provider: Arc<CloudApiClient>,
        sql: Arc<dyn SqlRunner>,
        config: FlowEngineConfig,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("zapline/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            flows,
            sessions,
            inbox,
            outbound,
            provider,
            sql,
            http,
            config,
        }
    }

    pub(crate) fn delay_cap(&self) -> u64 {
        self.config.max_delay_secs
    }

    async fn load_flows(&self, tenant_id: uuid::Uuid) -> CoreResult<Vec<LoadedFlow>> {
        let records = self.flows.enabled_flows(tenant_id).await?;
        let mut flows = Vec::with_capacity(records.len());
        for record in &records {
            match LoadedFlow::from_record(record) {
                Ok(flow) => flows.push(flow),
                Err(err) => {
                    warn!(flow = %record.id, "skipping unparseable flow: {err}");
                }
            }
        }
        Ok(flows)
    }

    /// Entry point for one inbound event.
    async fn dispatch(&self, ctx: &ExecCtx<'_>) -> CoreResult<()> {
        let flows = self.load_flows(ctx.tenant.id).await?;
        if flows.is_empty() {
            return Ok(());
        }
        let text = ctx.inbound.text_body().unwrap_or_default();
        let now = Utc::now();

        if let Some(record) = self
            .sessions
            .find(ctx.tenant.id, ctx.contact.id)
            .await?
        {
            let session = Session::from_record(&record);
            let flow = flows.iter().find(|f| f.id == session.flow_id);

            match flow {
                Some(flow) if !session.is_stale(flow, now) => {
                    // A different flow's trigger keyword resets the session.
                    let switched = flows
                        .iter()
                        .find(|f| f.id != flow.id && f.matches_trigger(&text));
                    if let Some(target) = switched {
                        info!(
                            from = %flow.name,
                            to = %target.name,
                            "trigger keyword switches flow mid-session"
                        );
                        self.sessions.delete(ctx.tenant.id, ctx.contact.id).await?;
                        return self.begin(ctx, target, now).await;
                    }
                    return self.resume(ctx, flow, session).await;
                }
                _ => {
                    // Stale session, or its flow was deleted/disabled.
                    debug!(contact = %ctx.contact.id, "discarding stale session");
                    self.sessions.delete(ctx.tenant.id, ctx.contact.id).await?;
                }
            }
        }

        let Some(flow) = select_flow(&flows, &text) else {
            debug!(tenant = %ctx.tenant.id, "no flow matches, no response");
            return Ok(());
        };
        self.begin(ctx, flow, now).await
    }

    /// Start a fresh session on `flow`, honoring its working-hours gate.
    async fn begin(
        &self,
        ctx: &ExecCtx<'_>,
        flow: &LoadedFlow,
        now: chrono::DateTime<Utc>,
    ) -> CoreResult<()> {
        if !flow.is_open_at(now) {
            info!(flow = %flow.name, "outside working hours, no session created");
            return Ok(());
        }
        let Some(entry) = flow.graph.entry_node() else {
            warn!(flow = %flow.name, "flow has no entry node");
            return Ok(());
        };
        let mut session = Session::start(ctx.tenant.id, ctx.contact.id, flow.id, &entry.id);
        self.inject_system_vars(ctx, &mut session);
        self.run_loop(ctx, flow, &mut session).await
    }

    /// Resume a suspended session with the new inbound event.
    async fn resume(
        &self,
        ctx: &ExecCtx<'_>,
        flow: &LoadedFlow,
        mut session: Session,
    ) -> CoreResult<()> {
        self.inject_system_vars(ctx, &mut session);

        let Some(node) = flow.graph.node(&session.current_node_id) else {
            warn!(
                flow = %flow.name,
                node = %session.current_node_id,
                "session points at a missing node"
            );
            self.sessions.delete(ctx.tenant.id, ctx.contact.id).await?;
            return Ok(());
        };

        let outcome = match &node.config {
            NodeConfig::Button { .. } => {
                messaging::resume_button(self, ctx, &mut session, node).await
            }
            NodeConfig::List { .. } => messaging::resume_list(self, ctx, &mut session, node).await,
            NodeConfig::Flow { .. } => messaging::resume_flow(self, ctx, &mut session, node).await,
            NodeConfig::Wait { .. } => logic::resume_wait(self, ctx, &mut session, node).await,
            // Sessions only suspend on input-awaiting nodes; anything else
            // means the invocation was cut short — re-execute from here.
            _ => {
                session.waiting_on = None;
                return self.run_loop(ctx, flow, &mut session).await;
            }
        };

        match self.settle(ctx, flow, &mut session, &node.id, outcome).await? {
            ControlFlow::Continue => self.run_loop(ctx, flow, &mut session).await,
            ControlFlow::Stop => Ok(()),
        }
    }

    /// Execute nodes starting at the session's current node.
    async fn run_loop(
        &self,
        ctx: &ExecCtx<'_>,
        flow: &LoadedFlow,
        session: &mut Session,
    ) -> CoreResult<()> {
        for _ in 0..self.config.step_cap {
            let Some(node) = flow.graph.node(&session.current_node_id).cloned() else {
                self.sessions.delete(ctx.tenant.id, ctx.contact.id).await?;
                return Ok(());
            };

            debug!(
                flow = %flow.name,
                node = %node.id,
                kind = node.config.type_tag(),
                "executing node"
            );
            let outcome = self.execute_node(ctx, session, &node).await;
            match self.settle(ctx, flow, session, &node.id, outcome).await? {
                ControlFlow::Continue => {}
                ControlFlow::Stop => return Ok(()),
            }
        }

        warn!(
            flow = %flow.name,
            cap = self.config.step_cap,
            "step cap reached, suspending invocation"
        );
        self.sessions.save(&session.to_record()).await?;
        Ok(())
    }

    /// Apply a step outcome: advance, suspend, or terminate. Errors route
    /// through the node's `fail` edge when it has one; otherwise the
    /// invocation ends and the session stays put for a later resume.
    async fn settle(
        &self,
        ctx: &ExecCtx<'_>,
        flow: &LoadedFlow,
        session: &mut Session,
        node_id: &str,
        outcome: CoreResult<StepOutcome>,
    ) -> CoreResult<ControlFlow> {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    tenant = %ctx.tenant.id,
                    flow = %flow.name,
                    node = %node_id,
                    "node failed: {err}"
                );
                if flow.graph.has_fail_edge(node_id) {
                    StepOutcome::Next("fail".to_string())
                } else {
                    self.sessions.save(&session.to_record()).await?;
                    return Ok(ControlFlow::Stop);
                }
            }
        };

        match outcome {
            StepOutcome::Next(handle) => {
                match flow.graph.next_node(node_id, &handle) {
                    Some(next) => {
                        session.current_node_id = next.to_string();
                        session.waiting_on = None;
                        session.touch();
                        self.sessions.save(&session.to_record()).await?;
                        Ok(ControlFlow::Continue)
                    }
                    None => {
                        // No successor: normal termination.
                        self.sessions.delete(ctx.tenant.id, ctx.contact.id).await?;
                        Ok(ControlFlow::Stop)
                    }
                }
            }
            StepOutcome::Suspend => {
                let waiting = flow
                    .graph
                    .node(&session.current_node_id)
                    .and_then(|n| n.config.waiting_kind())
                    .map(str::to_string);
                session.waiting_on = waiting;
                session.touch();
                self.sessions.save(&session.to_record()).await?;
                Ok(ControlFlow::Stop)
            }
            StepOutcome::Terminate => {
                self.sessions.delete(ctx.tenant.id, ctx.contact.id).await?;
                Ok(ControlFlow::Stop)
            }
        }
    }

    /// System variables are injected once per invocation; node effects
    /// override them within the step.
    fn inject_system_vars(&self, ctx: &ExecCtx<'_>, session: &mut Session) {
        let text = ctx.inbound.text_body().unwrap_or_default();
        session
            .bag
            .set("sender_mobile", VarValue::from(ctx.contact.phone.clone()));
        session
            .bag
            .set("sender_name", VarValue::from(ctx.contact.display_name()));
        session.bag.set("last_input", VarValue::from(text.clone()));
        session.bag.set("last_response", VarValue::from(text));
        session.bag.set(
            "last_message_type",
            VarValue::from(ctx.inbound.message_type.clone()),
        );
        if !ctx.inbound.is_text() {
            if let Some(url) = &ctx.record.media_url {
                session.bag.set("last_media_url", VarValue::from(url.clone()));
            }
            if let Some(id) = &ctx.record.media_id {
                session.bag.set("last_media_id", VarValue::from(id.clone()));
            }
        }
    }

    /// Exhaustive dispatch over the node tag.
    async fn execute_node(
        &self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        node: &crate::graph::FlowNode,
    ) -> CoreResult<StepOutcome> {
        match &node.config {
            NodeConfig::StartTrigger { .. } => logic::exec_start_trigger(session, node),
            NodeConfig::Message { .. } => messaging::exec_message(self, ctx, session, node).await,
            NodeConfig::Image { .. }
            | NodeConfig::Video { .. }
            | NodeConfig::Document { .. } => {
                messaging::exec_media(self, ctx, session, node).await
            }
            NodeConfig::Button { .. } => messaging::exec_button(self, ctx, session, node).await,
            NodeConfig::List { .. } => messaging::exec_list(self, ctx, session, node).await,
            NodeConfig::Flow { .. } => messaging::exec_flow(self, ctx, session, node).await,
            NodeConfig::Wait { .. } => Ok(StepOutcome::Suspend),
            NodeConfig::Delay { .. } => logic::exec_delay(self, node).await,
            NodeConfig::Variable { .. } => logic::exec_variable(session, node),
            NodeConfig::ListVariable { .. } => logic::exec_list_variable(session, node),
            NodeConfig::UpdateContact { .. } => {
                logic::exec_update_contact(self, ctx, session, node).await
            }
            NodeConfig::Map { .. } => logic::exec_map(session, node),
            NodeConfig::Condition { .. } => logic::exec_condition(session, node),
            NodeConfig::Router { .. } => logic::exec_router(session, node),
            NodeConfig::KeywordMatch { .. } => logic::exec_keyword_match(session, node),
            NodeConfig::Validator { .. } => logic::exec_validator(ctx, session, node),
            NodeConfig::PhoneParser { .. } => logic::exec_phone_parser(session, node),
            NodeConfig::BusinessHours { .. } => logic::exec_business_hours(node),
            NodeConfig::Api { .. } => integrations::exec_api(self, session, node).await,
            NodeConfig::Sql { .. } => integrations::exec_sql(self, ctx, session, node).await,
            NodeConfig::GoogleSheet { .. } => {
                integrations::exec_google_sheet(self, session, node).await
            }
            NodeConfig::GoogleSheetQuery { .. } => {
                integrations::exec_google_sheet_query(self, session, node).await
            }
            NodeConfig::DriveImageLookup { .. } => {
                integrations::exec_drive_image_lookup(self, ctx, session, node).await
            }
            NodeConfig::MediaForward { .. } => {
                integrations::exec_media_forward(self, ctx, session, node).await
            }
            NodeConfig::Payment { .. } => {
                integrations::exec_payment(self, ctx, session, node).await
            }
            NodeConfig::Shopify { .. } => integrations::exec_shopify(self, session, node).await,
            NodeConfig::Woocommerce { .. } => {
                integrations::exec_woocommerce(self, session, node).await
            }
            NodeConfig::SendExternal { .. } => {
                messaging::exec_send_external(self, ctx, session, node).await
            }
            NodeConfig::Catalogue { .. } => {
                messaging::exec_catalogue(self, ctx, session, node).await
            }
            NodeConfig::GroupImages { .. } => {
                messaging::exec_group_images(self, ctx, session, node).await
            }
            NodeConfig::Loop { .. } => logic::exec_loop(session, node),
            NodeConfig::Agent { .. } => messaging::exec_agent(self, ctx, session, node).await,
            NodeConfig::SessionConfig { .. } => logic::exec_session_config(session, node),
        }
    }
}

enum ControlFlow {
    Continue,
    Stop,
}

#[async_trait]
impl AutomationHook for FlowEngine {
    async fn handle_inbound(
        &self,
        tenant: &TenantRecord,
        contact: &ContactRecord,
        conversation: &ConversationRecord,
        message: &InboundMessage,
        record: &MessageRecord,
    ) -> CoreResult<()> {
        let ctx = ExecCtx {
            tenant,
            contact,
            conversation,
            inbound: message,
            record,
        };
        self.dispatch(&ctx).await
    }
}
