use crate::status::Status;
use serde::{Deserialize, Serialize};

pub const UNSET_TIME: i64 = -1;

fn unset_time() -> i64 {
    UNSET_TIME
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowData {
    pub flow_id: String,
    #[serde(default)]
    pub exec_id: Option<u64>,
    #[serde(default)]
    pub submit_user: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default = "unset_time")]
    pub start_time: i64,
    #[serde(default = "unset_time")]
    pub end_time: i64,
    #[serde(default = "unset_time")]
    pub update_time: i64,
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub edges: Vec<EdgeData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub id: String,
    /// `"flow"` for embedded flows, otherwise the job type (`command`, `java`, ...).
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default = "unset_time")]
    pub start_time: i64,
    #[serde(default = "unset_time")]
    pub end_time: i64,
    #[serde(default = "unset_time")]
    pub update_time: i64,
    #[serde(default)]
    pub flow_id: Option<String>,
    /// Predecessor ids; an alternative to listing edges explicitly.
    #[serde(rename = "in", default)]
    pub in_nodes: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub edges: Vec<EdgeData>,
    #[serde(default)]
    pub past_attempts: Vec<Attempt>,
}

impl NodeData {
    pub fn is_flow(&self) -> bool {
        self.node_type == "flow"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub attempt: u32,
    #[serde(default = "unset_time")]
    pub start_time: i64,
    #[serde(default = "unset_time")]
    pub end_time: i64,
    pub status: Status,
}

/// Incremental update for a flow or one of its nodes.
///
/// Every field except `id` is optional so a partial document only refines
/// what it names. The top-level document has no `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub update_time: Option<i64>,
    #[serde(default)]
    pub nodes: Vec<StatusUpdate>,
    #[serde(default)]
    pub past_attempts: Vec<Attempt>,
}

impl StatusUpdate {
    pub fn for_node(id: &str, status: Status) -> Self {
        Self {
            id: Some(id.to_string()),
            status: Some(status),
            ..Default::default()
        }
    }
}

pub fn parse_flow(input: &str) -> serde_json::Result<FlowData> {
    serde_json::from_str(input)
}

pub fn parse_update(input: &str) -> serde_json::Result<StatusUpdate> {
    serde_json::from_str(input)
}
