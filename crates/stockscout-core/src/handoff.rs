// ABOUTME: Builds the handoff messages that mark control passing between supervisor and agents.
// ABOUTME: Each handoff is an assistant tool call paired with its tool result.

use serde_json::json;

use crate::message::{Message, ToolCall};

/// Name of the supervisor node in a supervised run.
pub const SUPERVISOR_NAME: &str = "supervisor";

/// Name of the handoff tool that transfers control to `agent`.
pub fn transfer_tool_name(agent: &str) -> String {
    format!("transfer_to_{}", agent)
}

/// Name of the handoff tool that returns control to the supervisor.
pub const TRANSFER_BACK_TOOL: &str = "transfer_back_to_supervisor";

/// Messages emitted by the supervisor when it hands control to `agent`.
pub fn transfer_to(agent: &str) -> Vec<Message> {
    let call = ToolCall::new(transfer_tool_name(agent), json!({}));
    let result = Message::tool_result(
        call.id.clone(),
        call.name.clone(),
        format!("Successfully transferred to {}", agent),
        false,
    );
    vec![
        Message::assistant_with_tool_calls("", vec![call]).named(SUPERVISOR_NAME),
        result,
    ]
}

/// Messages emitted by `agent` when it hands control back to the supervisor.
pub fn transfer_back(agent: &str) -> Vec<Message> {
    let call = ToolCall::new(TRANSFER_BACK_TOOL, json!({}));
    let result = Message::tool_result(
        call.id.clone(),
        call.name.clone(),
        "Successfully transferred back to supervisor",
        false,
    );
    vec![
        Message::assistant_with_tool_calls("Transferring back to supervisor", vec![call])
            .named(agent),
        result,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn transfer_to_pairs_call_with_result() {
        let msgs = transfer_to("market_data_agent");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::Assistant);
        assert_eq!(msgs[0].name.as_deref(), Some(SUPERVISOR_NAME));
        assert_eq!(msgs[0].tool_calls[0].name, "transfer_to_market_data_agent");
        assert_eq!(msgs[1].tool_call_id.as_deref(), Some(msgs[0].tool_calls[0].id.as_str()));
        assert_eq!(msgs[1].text(), "Successfully transferred to market_data_agent");
        assert_eq!(msgs[1].name.as_deref(), Some("transfer_to_market_data_agent"));
    }

    #[test]
    fn transfer_back_is_named_after_agent() {
        let msgs = transfer_back("news_analyst_agent");
        assert_eq!(msgs[0].name.as_deref(), Some("news_analyst_agent"));
        assert_eq!(msgs[0].tool_calls[0].name, TRANSFER_BACK_TOOL);
        assert_eq!(msgs[1].text(), "Successfully transferred back to supervisor");
        assert_eq!(msgs[1].tool_call_id.as_deref(), Some(msgs[0].tool_calls[0].id.as_str()));
        assert_eq!(msgs[1].role, Role::Tool);
    }
}
