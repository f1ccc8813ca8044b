// ABOUTME: Renders messages and stream updates as human-readable text for the terminal.
// ABOUTME: Top-level tagged updates are suppressed; nested updates are tab-indented.

use serde_json::Value;

use crate::message::{Message, Role};
use crate::update::Update;

const TITLE_WIDTH: usize = 80;

/// Options controlling how updates are rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Render only the last message of each node update.
    pub last_message: bool,
    /// Wrap message titles in ANSI bold escapes.
    pub bold_titles: bool,
}

fn message_title(role: Role) -> &'static str {
    match role {
        Role::System => "System Message",
        Role::User => "Human Message",
        Role::Assistant => "Ai Message",
        Role::Tool => "Tool Message",
    }
}

/// Centre `title` in an 80-column banner of `=` characters.
fn title_banner(title: &str, bold: bool) -> String {
    let padded = format!(" {} ", title);
    let len = padded.chars().count();
    let sep = "=".repeat(TITLE_WIDTH.saturating_sub(len) / 2);
    let second_sep = if len % 2 == 1 {
        format!("{}=", sep)
    } else {
        sep.clone()
    };
    let padded = if bold {
        format!("\x1b[1m{}\x1b[0m", padded)
    } else {
        padded
    };
    format!("{}{}{}", sep, padded, second_sep)
}

fn format_arg_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_message(message: &Message, bold: bool) -> String {
    let mut out = title_banner(message_title(message.role), bold);
    if let Some(name) = &message.name {
        out.push_str(&format!("\nName: {}", name));
    }
    out.push_str("\n\n");
    out.push_str(&message.text());

    if message.tool_calls.is_empty() {
        return out;
    }

    let mut lines = vec!["Tool Calls:".to_string()];
    for call in &message.tool_calls {
        lines.push(format!("  {} ({})", call.name, call.id));
        lines.push(format!(" Call ID: {}", call.id));
        if let Some(args) = call.args.as_object().filter(|a| !a.is_empty()) {
            lines.push("  Args:".to_string());
            for (key, value) in args {
                lines.push(format!("    {}: {}", key, format_arg_value(value)));
            }
        }
    }

    format!("{}\n{}", out.trim(), lines.join("\n"))
}

/// Render a single message, optionally tab-indenting every line.
pub fn format_message(message: &Message, indent: bool, bold: bool) -> String {
    let rendered = render_message(message, bold);
    if !indent {
        return rendered;
    }
    rendered
        .split('\n')
        .map(|line| format!("\t{}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a stream update. Returns an empty string for tagged top-level
/// updates (namespace present but empty), which are not printed.
pub fn format_update(update: &Update, options: FormatOptions) -> String {
    if update.namespace.as_ref().is_some_and(|ns| ns.is_empty()) {
        return String::new();
    }

    let nested = update.is_nested();
    let mut out = String::new();

    if let Some(graph_id) = update.graph_id() {
        out.push_str(&format!("Update from subgraph {}:\n\n\n", graph_id));
    }

    for node in &update.nodes {
        let indent = if nested { "\t" } else { "" };
        out.push_str(&format!("{}Update from node {}:\n\n\n", indent, node.node));

        let messages = if options.last_message {
            &node.messages[node.messages.len().saturating_sub(1)..]
        } else {
            &node.messages[..]
        };

        for message in messages {
            out.push_str(&format_message(message, nested, options.bold_titles));
            out.push('\n');
        }
        out.push_str("\n\n");
    }

    out
}
