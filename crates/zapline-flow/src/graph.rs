//! Flow graph: nodes, edges, entry resolution, working hours
//!
//! Storage is a flat node list plus an edge list; lookups are by node id.
//! Edges optionally carry a `source_handle` selecting among a node's typed
//! outputs (`true`/`false`, `btn_0`, a list row id, ...). Loops are written
//! with explicit `loop` nodes; the engine's step cap defends against cyclic
//! edges regardless.

use crate::nodes::{DayWindow, NodeConfig};
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use zapline_core::model::FlowRecord;

/// Virtual source id an author can wire the entry edge from.
pub const START_NODE_ID: &str = "start";

/// One node in a stored flow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(flatten)]
    pub config: NodeConfig,
}

/// One directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

/// A parsed node-graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl FlowDefinition {
    pub fn parse(definition: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(definition.clone())
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The node execution begins at. Priority: a `start_trigger` node, then
    /// the target of an edge from the virtual `start` id, then any node
    /// without inbound edges.
    pub fn entry_node(&self) -> Option<&FlowNode> {
        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| matches!(n.config, NodeConfig::StartTrigger { .. }))
        {
            return Some(node);
        }
        if let Some(edge) = self.edges.iter().find(|e| e.source == START_NODE_ID) {
            if let Some(node) = self.node(&edge.target) {
                return Some(node);
            }
        }
        self.nodes
            .iter()
            .find(|n| n.id != START_NODE_ID && !self.edges.iter().any(|e| e.target == n.id))
    }

    /// Resolve the successor of `node_id` for a given output handle.
    /// An exact handle match wins; otherwise the node's default edge (no
    /// handle, or the literal `default`) applies.
    pub fn next_node(&self, node_id: &str, handle: &str) -> Option<&str> {
        let exact = self.edges.iter().find(|e| {
            e.source == node_id && e.source_handle.as_deref() == Some(handle)
        });
        if let Some(edge) = exact {
            return Some(&edge.target);
        }
        self.edges
            .iter()
            .find(|e| {
                e.source == node_id
                    && matches!(e.source_handle.as_deref(), None | Some("default"))
            })
            .map(|e| e.target.as_str())
    }

    /// Whether the node declares a `fail` output.
    pub fn has_fail_edge(&self, node_id: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == node_id && e.source_handle.as_deref() == Some("fail"))
    }
}

/// Flow-level working-hours policy: outside the windows, no session is
/// created. Gating applies at entry only, never between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub timezone: String,
    pub schedule: Vec<DayWindow>,
}

impl WorkingHours {
    pub fn parse(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Whether `at` falls inside an enabled window, evaluated in the
    /// configured IANA zone. An unparseable zone fails open.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let Ok(tz) = self.timezone.parse::<Tz>() else {
            return true;
        };
        is_open(&self.schedule, at, tz)
    }
}

/// Shared window check, also used by the `business_hours` node.
pub fn is_open(schedule: &[DayWindow], at: DateTime<Utc>, tz: Tz) -> bool {
    let local = at.with_timezone(&tz);
    // Monday = 0 .. Sunday = 6.
    let weekday = local.weekday().num_days_from_monday() as u8;
    let now = local.time();
    schedule.iter().any(|window| {
        if window.day != weekday || !window.enabled {
            return false;
        }
        let (Some(open), Some(close)) = (parse_hhmm(&window.open), parse_hhmm(&window.close))
        else {
            return false;
        };
        now >= open && now < close
    })
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// A flow record with its graph parsed, ready for the engine.
#[derive(Debug, Clone)]
pub struct LoadedFlow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub trigger_keyword: Option<String>,
    pub is_default: bool,
    pub session_timeout_secs: i64,
    pub working_hours: Option<WorkingHours>,
    pub graph: FlowDefinition,
}

impl LoadedFlow {
    pub fn from_record(record: &FlowRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: record.id,
            tenant_id: record.tenant_id,
            name: record.name.clone(),
            trigger_keyword: record.trigger_keyword.clone(),
            is_default: record.is_default,
            session_timeout_secs: record.session_timeout_secs,
            working_hours: record
                .working_hours
                .as_ref()
                .and_then(WorkingHours::parse),
            graph: FlowDefinition::parse(&record.definition)?,
        })
    }

    /// Exact trigger-keyword match (upper-cased, trimmed).
    pub fn matches_trigger(&self, text: &str) -> bool {
        match &self.trigger_keyword {
            Some(keyword) if keyword != "*" => {
                keyword.trim().to_uppercase() == text.trim().to_uppercase()
            }
            _ => false,
        }
    }

    /// Catch-all trigger (`*`).
    pub fn is_catch_all(&self) -> bool {
        self.trigger_keyword.as_deref() == Some("*")
    }

    /// Whether this flow's `start_trigger` node accepts the inbound text.
    /// Returns the matched keyword index, or `None` when nothing matches;
    /// `Some(None)` means the trigger accepts any input.
    pub fn start_trigger_accepts(&self, text: &str) -> Option<Option<usize>> {
        let trigger = self.graph.nodes.iter().find_map(|n| match &n.config {
            NodeConfig::StartTrigger {
                keywords,
                accept_any,
                partial_match,
                case_sensitive,
            } => Some((keywords, *accept_any, *partial_match, *case_sensitive)),
            _ => None,
        })?;
        let (keywords, accept_any, partial_match, case_sensitive) = trigger;
        if accept_any {
            return Some(None);
        }
        let haystack = if case_sensitive {
            text.trim().to_string()
        } else {
            text.trim().to_uppercase()
        };
        for (index, keyword) in keywords.iter().enumerate() {
            let needle = if case_sensitive {
                keyword.trim().to_string()
            } else {
                keyword.trim().to_uppercase()
            };
            let hit = if partial_match {
                haystack.contains(&needle)
            } else {
                haystack == needle
            };
            if hit {
                return Some(Some(index));
            }
        }
        None
    }

    /// Entry gate: closed only when a working-hours policy says so.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        self.working_hours
            .as_ref()
            .map_or(true, |hours| hours.is_open_at(at))
    }
}

/// Pick the flow for an inbound event with no live session. Priority:
/// exact trigger keyword, catch-all `*`, a `start_trigger` that accepts the
/// text, then the tenant default.
pub fn select_flow<'a>(flows: &'a [LoadedFlow], text: &str) -> Option<&'a LoadedFlow> {
    if let Some(flow) = flows.iter().find(|f| f.matches_trigger(text)) {
        return Some(flow);
    }
    if let Some(flow) = flows.iter().find(|f| f.is_catch_all()) {
        return Some(flow);
    }
    if let Some(flow) = flows
        .iter()
        .find(|f| f.start_trigger_accepts(text).is_some())
    {
        return Some(flow);
    }
    flows.iter().find(|f| f.is_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow_with(definition: Value, trigger: Option<&str>, is_default: bool) -> LoadedFlow {
        LoadedFlow::from_record(&FlowRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "test".to_string(),
            definition,
            trigger_keyword: trigger.map(str::to_string),
            is_default,
            enabled: true,
            session_timeout_secs: 300,
            working_hours: None,
        })
        .unwrap()
    }

    fn greet_definition() -> Value {
        json!({
            "nodes": [
                { "id": "t", "type": "start_trigger", "keywords": ["HI", "HELLO"] },
                { "id": "m", "type": "message", "text": "Hi {{sender_name}}" }
            ],
            "edges": [
                { "source": "t", "target": "m" }
            ]
        })
    }

    #[test]
    fn entry_prefers_start_trigger() {
        let flow = flow_with(greet_definition(), Some("HI"), false);
        assert_eq!(flow.graph.entry_node().unwrap().id, "t");
    }

    #[test]
    fn entry_falls_back_to_virtual_start_edge() {
        let flow = flow_with(
            json!({
                "nodes": [
                    { "id": "a", "type": "message", "text": "a" },
                    { "id": "b", "type": "message", "text": "b" }
                ],
                "edges": [
                    { "source": "start", "target": "b" },
                    { "source": "b", "target": "a" }
                ]
            }),
            None,
            true,
        );
        assert_eq!(flow.graph.entry_node().unwrap().id, "b");
    }

    #[test]
    fn entry_falls_back_to_unreferenced_node() {
        let flow = flow_with(
            json!({
                "nodes": [
                    { "id": "first", "type": "message", "text": "a" },
                    { "id": "second", "type": "message", "text": "b" }
                ],
                "edges": [
                    { "source": "first", "target": "second" }
                ]
            }),
            None,
            true,
        );
        assert_eq!(flow.graph.entry_node().unwrap().id, "first");
    }

    #[test]
    fn next_node_prefers_exact_handle() {
        let flow = flow_with(
            json!({
                "nodes": [
                    { "id": "c", "type": "condition", "left": "{{x}}", "op": "exists" },
                    { "id": "yes", "type": "message", "text": "y" },
                    { "id": "no", "type": "message", "text": "n" }
                ],
                "edges": [
                    { "source": "c", "target": "yes", "source_handle": "true" },
                    { "source": "c", "target": "no", "source_handle": "false" }
                ]
            }),
            None,
            false,
        );
        assert_eq!(flow.graph.next_node("c", "true"), Some("yes"));
        assert_eq!(flow.graph.next_node("c", "false"), Some("no"));
        assert_eq!(flow.graph.next_node("c", "other"), None);
    }

    #[test]
    fn next_node_falls_back_to_default_edge() {
        let flow = flow_with(greet_definition(), Some("HI"), false);
        assert_eq!(flow.graph.next_node("t", "kw_0"), Some("m"));
        assert_eq!(flow.graph.next_node("m", "default"), None);
    }

    #[test]
    fn trigger_matching_is_case_insensitive_exact() {
        let flow = flow_with(greet_definition(), Some("Hi"), false);
        assert!(flow.matches_trigger("  hi "));
        assert!(!flow.matches_trigger("hi there"));
    }

    #[test]
    fn start_trigger_partial_match() {
        let flow = flow_with(
            json!({
                "nodes": [
                    { "id": "t", "type": "start_trigger", "keywords": ["order"], "partial_match": true }
                ],
                "edges": []
            }),
            None,
            false,
        );
        assert_eq!(flow.start_trigger_accepts("my ORDER please"), Some(Some(0)));
        assert_eq!(flow.start_trigger_accepts("hello"), None);
    }

    #[test]
    fn select_flow_priority() {
        let keyword = flow_with(greet_definition(), Some("HI"), false);
        let catch_all = flow_with(greet_definition(), Some("*"), false);
        let default = flow_with(greet_definition(), None, true);
        let flows = vec![default, catch_all, keyword];

        // Exact keyword beats catch-all and default.
        let chosen = select_flow(&flows, "hi").unwrap();
        assert!(chosen.matches_trigger("HI"));

        // Catch-all beats default for unmatched text.
        let chosen = select_flow(&flows, "anything else").unwrap();
        assert!(chosen.is_catch_all());
    }

    #[test]
    fn working_hours_window() {
        let hours = WorkingHours {
            timezone: "Asia/Kolkata".to_string(),
            schedule: vec![DayWindow {
                day: 0,
                enabled: true,
                open: "09:00".to_string(),
                close: "18:00".to_string(),
            }],
        };
        // Monday 2024-04-22 10:00 IST == 04:30 UTC.
        let inside = "2024-04-22T04:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(hours.is_open_at(inside));
        // Monday 20:00 IST.
        let outside = "2024-04-22T14:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(!hours.is_open_at(outside));
        // Tuesday has no window at all.
        let tuesday = "2024-04-23T04:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(!hours.is_open_at(tuesday));
    }
}
