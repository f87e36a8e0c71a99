//! Flow interpreter for Zapline
//!
//! A flow is a directed graph of typed nodes authored per tenant. The
//! engine here executes one invocation per inbound event: it resolves which
//! flow should handle the event, walks the graph executing node effects,
//! suspends at input-awaiting nodes, and resumes when the next matching
//! event arrives. Session state (current node + variable bag) lives behind
//! the `SessionStore` contract from `zapline-core`.

pub mod engine;
pub mod exec_integrations;
pub mod exec_logic;
pub mod exec_messaging;
pub mod graph;
pub mod nodes;
pub mod session;
pub mod vars;

pub use engine::{FlowEngine, FlowEngineConfig};
pub use graph::{FlowDefinition, FlowEdge, FlowNode, LoadedFlow, WorkingHours};
pub use nodes::NodeConfig;
pub use vars::{interpolate, VarValue, VariableBag};
