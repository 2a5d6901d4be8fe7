//! Agent registry (spec §4.3): closed `kind -> agents` map, `agent -> endpoint` map.

use crate::classifier::{KIND_ASSIST, KIND_EMERGENCY, KIND_POLICY};

pub const AGENT_AXIS: &str = "Axis";
pub const AGENT_M: &str = "M";
pub const AGENT_DLQ: &str = "DLQ";

/// Agents to fan out to for a given `kind`. Unrecognized kinds (including
/// `unknown`) route to the synthetic `DLQ` agent.
pub fn agents_for(kind: &str) -> Vec<String> {
    match kind {
        KIND_ASSIST => vec![AGENT_AXIS.to_string()],
        KIND_POLICY => vec![AGENT_M.to_string()],
        KIND_EMERGENCY => vec![AGENT_M.to_string(), AGENT_AXIS.to_string()],
        _ => vec![AGENT_DLQ.to_string()],
    }
}

/// Resolve an agent name to its HTTP endpoint. `DLQ` has no endpoint — the
/// agent caller short-circuits before ever consulting this table.
pub fn endpoint(agent: &str, mock_agents_base: &str) -> Option<String> {
    match agent {
        AGENT_AXIS => Some(format!("{mock_agents_base}/agents/axis")),
        AGENT_M => Some(format!("{mock_agents_base}/agents/m")),
        _ => None,
    }
}
