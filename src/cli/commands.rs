// Slash command handling
//
// Exit words (/quit, /exit, ...) belong to the agent loop; these are the
// commands answered locally without involving the model.

use crate::tools::types::ToolDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Tools,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "/help" => Some(Command::Help),
            "/tools" => Some(Command::Tools),
            _ => None,
        }
    }
}

pub fn handle_command(command: Command, tools: &[ToolDefinition]) -> String {
    match command {
        Command::Help => format_help(),
        Command::Tools => format_tools(tools),
    }
}

fn format_help() -> String {
    r#"Available commands:
  /help      - Show this help message
  /tools     - List the tools the agent can call
  /quit      - Exit (also: exit, quit, q)

Ask a question about the data to get started!"#
        .to_string()
}

fn format_tools(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return "No tools available.".to_string();
    }

    let mut output = String::from("Available tools:\n");
    for tool in tools {
        let summary = tool.description.lines().next().unwrap_or("").trim();
        output.push_str(&format!("  {} - {}\n", tool.name, summary));
    }
    output
}
