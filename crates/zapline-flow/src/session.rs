//! Live session state
//!
//! The store keeps sessions as `SessionRecord` (JSON variable bag); the
//! engine works on this typed wrapper. Reserved variables (leading `_`)
//! carry interpreter bookkeeping: pending buttons, list pages, loop
//! indexes, the session-level timeout override.

use crate::graph::LoadedFlow;
use crate::vars::{VarValue, VariableBag};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use zapline_core::model::SessionRecord;

/// Reserved variable holding a `session_config` timeout override.
pub const TIMEOUT_OVERRIDE_VAR: &str = "_session_timeout_secs";

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contact_id: Uuid,
    pub flow_id: Uuid,
    pub current_node_id: String,
    pub bag: VariableBag,
    pub waiting_on: Option<String>,
    pub last_interaction_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session positioned at a flow's entry node.
    pub fn start(tenant_id: Uuid, contact_id: Uuid, flow_id: Uuid, entry_node_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            contact_id,
            flow_id,
            current_node_id: entry_node_id.to_string(),
            bag: VariableBag::new(),
            waiting_on: None,
            last_interaction_at: Utc::now(),
        }
    }

    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            contact_id: record.contact_id,
            flow_id: record.flow_id,
            current_node_id: record.current_node_id.clone(),
            bag: VariableBag::from_json(&record.variables),
            waiting_on: record.waiting_on.clone(),
            last_interaction_at: record.last_interaction_at,
        }
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            contact_id: self.contact_id,
            flow_id: self.flow_id,
            current_node_id: self.current_node_id.clone(),
            variables: self.bag.to_json(),
            waiting_on: self.waiting_on.clone(),
            last_interaction_at: self.last_interaction_at,
        }
    }

    /// Effective timeout: the `session_config` override when present, else
    /// the flow's configured timeout.
    pub fn timeout_secs(&self, flow: &LoadedFlow) -> i64 {
        match self.bag.get(TIMEOUT_OVERRIDE_VAR) {
            Some(VarValue::Number(n)) if *n > 0.0 => *n as i64,
            _ => flow.session_timeout_secs,
        }
    }

    /// Whether the session outlived its timeout at `now`.
    pub fn is_stale(&self, flow: &LoadedFlow, now: DateTime<Utc>) -> bool {
        let timeout = self.timeout_secs(flow);
        if timeout <= 0 {
            return false;
        }
        self.last_interaction_at + Duration::seconds(timeout) < now
    }

    pub fn touch(&mut self) {
        self.last_interaction_at = Utc::now();
    }

    /// Reset to a flow's entry: variables cleared, position moved. Used when
    /// a different flow's trigger keyword arrives mid-session.
    pub fn reset_to(&mut self, flow_id: Uuid, entry_node_id: &str) {
        self.flow_id = flow_id;
        self.current_node_id = entry_node_id.to_string();
        self.bag.clear();
        self.waiting_on = None;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zapline_core::model::FlowRecord;

    fn minimal_flow(timeout: i64) -> LoadedFlow {
        LoadedFlow::from_record(&FlowRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "f".to_string(),
            definition: json!({ "nodes": [], "edges": [] }),
            trigger_keyword: None,
            is_default: false,
            enabled: true,
            session_timeout_secs: timeout,
            working_hours: None,
        })
        .unwrap()
    }

    #[test]
    fn staleness_uses_flow_timeout() {
        let flow = minimal_flow(10);
        let mut session = Session::start(Uuid::new_v4(), Uuid::new_v4(), flow.id, "n");
        session.last_interaction_at = Utc::now() - Duration::seconds(15);
        assert!(session.is_stale(&flow, Utc::now()));

        session.last_interaction_at = Utc::now() - Duration::seconds(5);
        assert!(!session.is_stale(&flow, Utc::now()));
    }

    #[test]
    fn session_config_overrides_timeout() {
        let flow = minimal_flow(10);
        let mut session = Session::start(Uuid::new_v4(), Uuid::new_v4(), flow.id, "n");
        session
            .bag
            .set(TIMEOUT_OVERRIDE_VAR, VarValue::Number(3600.0));
        session.last_interaction_at = Utc::now() - Duration::seconds(15);
        assert!(!session.is_stale(&flow, Utc::now()));
        assert_eq!(session.timeout_secs(&flow), 3600);
    }

    #[test]
    fn reset_clears_variables() {
        let flow = minimal_flow(10);
        let mut session = Session::start(Uuid::new_v4(), Uuid::new_v4(), flow.id, "a");
        session.bag.set("x", VarValue::from("1"));
        session.waiting_on = Some("wait".to_string());

        let other_flow = Uuid::new_v4();
        session.reset_to(other_flow, "entry");
        assert_eq!(session.flow_id, other_flow);
        assert_eq!(session.current_node_id, "entry");
        assert!(session.bag.get("x").is_none());
        assert!(session.waiting_on.is_none());
    }

    #[test]
    fn record_round_trip() {
        let mut session = Session::start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "n1");
        session.bag.set("name", VarValue::from("Maria"));
        let restored = Session::from_record(&session.to_record());
        assert_eq!(restored.current_node_id, "n1");
        assert_eq!(
            restored.bag.get("name"),
            Some(&VarValue::String("Maria".to_string()))
        );
    }
}
