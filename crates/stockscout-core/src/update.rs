// ABOUTME: Stream update types emitted while agents and the supervisor run.
// ABOUTME: An update groups per-node message batches under an optional namespace path.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Messages produced by one node (an agent, the supervisor, or a runner
/// stage such as `model` or `tools`) during a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node: String,
    pub messages: Vec<Message>,
}

impl NodeUpdate {
    pub fn new(node: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            node: node.into(),
            messages,
        }
    }
}

/// One incremental update from a run.
///
/// `namespace` is `None` for untagged top-level updates. When nested updates
/// are streamed, every update is tagged: top-level ones carry an empty path
/// and nested ones carry `"<graph>:<task>"` segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub namespace: Option<Vec<String>>,
    pub nodes: Vec<NodeUpdate>,
}

impl Update {
    /// An untagged top-level update with a single node.
    pub fn top_level(node: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            namespace: None,
            nodes: vec![NodeUpdate::new(node, messages)],
        }
    }

    /// A tagged update with a single node.
    pub fn tagged(namespace: Vec<String>, node: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            namespace: Some(namespace),
            nodes: vec![NodeUpdate::new(node, messages)],
        }
    }

    /// Identifier of the nested graph that produced this update: the part of
    /// the last namespace segment before the first `:`.
    pub fn graph_id(&self) -> Option<&str> {
        self.namespace
            .as_ref()
            .and_then(|ns| ns.last())
            .map(|segment| segment.split(':').next().unwrap_or(segment.as_str()))
    }

    pub fn is_nested(&self) -> bool {
        self.namespace.as_ref().is_some_and(|ns| !ns.is_empty())
    }

    /// Messages of the named node, if this update contains it.
    pub fn messages_for(&self, node: &str) -> Option<&[Message]> {
        self.nodes
            .iter()
            .find(|n| n.node == node)
            .map(|n| n.messages.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_id_strips_task_suffix() {
        let update = Update::tagged(
            vec!["market_data_agent:01JB3ZK8X7".to_string()],
            "model",
            vec![Message::assistant("RELIANCE: 2,950 INR")],
        );
        assert_eq!(update.graph_id(), Some("market_data_agent"));
        assert!(update.is_nested());
    }

    #[test]
    fn top_level_updates_are_not_nested() {
        let untagged = Update::top_level("supervisor", vec![]);
        assert_eq!(untagged.graph_id(), None);
        assert!(!untagged.is_nested());

        let tagged = Update::tagged(vec![], "supervisor", vec![]);
        assert!(!tagged.is_nested());
    }

    #[test]
    fn messages_for_finds_node() {
        let update = Update::top_level("news_analyst_agent", vec![Message::assistant("INFY: neutral")]);
        assert_eq!(update.messages_for("news_analyst_agent").map(|m| m.len()), Some(1));
        assert!(update.messages_for("supervisor").is_none());
    }
}
