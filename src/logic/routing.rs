use crate::model::{non_blank, RoutingTable};

/// Workshop running the first step (`idx == 1`) of `flow_code`.
///
/// Joins step → group → workshop and returns the first match in table
/// order. `None` when the flow is unknown or the chain is broken; callers
/// leave the workshop unset in that case.
pub fn derive_workshop(flow_code: Option<&str>, routing: &RoutingTable) -> Option<String> {
    let flow_code = non_blank(flow_code)?;

    routing
        .steps
        .iter()
        .filter(|step| step.flow_code == flow_code && step.idx == 1)
        .flat_map(|step| {
            routing
                .groups
                .iter()
                .filter(move |g| g.group_code == step.process_from_group)
        })
        .find_map(|group| {
            routing
                .workshops
                .iter()
                .find(|w| w.wsid == group.wsid)
                .map(|w| w.ws_code.clone())
        })
}
