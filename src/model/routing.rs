use serde::{Deserialize, Serialize};

/// One step of a process flow (`b_process_flow_detail`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFlowStep {
    pub flow_code: String,
    /// 1-based position of the step within its flow
    pub idx: i32,
    pub process_from_group: String,
}

/// Work group (`b_work_group`), belongs to one workshop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkGroup {
    pub group_code: String,
    pub wsid: i64,
}

/// Workshop (`b_work_shop`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workshop {
    pub wsid: i64,
    pub ws_code: String,
}

/// Snapshot of the routing tables used to derive a workshop at creation time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub steps: Vec<ProcessFlowStep>,
    pub groups: Vec<WorkGroup>,
    pub workshops: Vec<Workshop>,
}
