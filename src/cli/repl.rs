// Interactive console for the agent
//
// A TTY gets a rustyline editor with history; pipes and scripts get plain
// line reads from stdin with minimal decoration.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, IsTerminal};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use super::commands::{handle_command, Command};
use crate::agent::UserConsole;
use crate::tools::types::{ToolDefinition, ToolUse};

const PROMPT: &str = "You: ";

enum Input {
    Editor(DefaultEditor),
    Piped(Lines<BufReader<Stdin>>),
}

pub struct Repl {
    input: Input,
    tools: Vec<ToolDefinition>,
    is_interactive: bool,
}

impl Repl {
    pub fn new(tools: Vec<ToolDefinition>) -> Result<Self> {
        let is_interactive = io::stdin().is_terminal() && io::stdout().is_terminal();

        let input = if is_interactive {
            Input::Editor(DefaultEditor::new().context("Failed to initialise line editor")?)
        } else {
            Input::Piped(BufReader::new(tokio::io::stdin()).lines())
        };

        Ok(Self {
            input,
            tools,
            is_interactive,
        })
    }

    pub fn print_banner(&self) {
        if self.is_interactive {
            println!("Data Analyst Agent ready! (Type 'exit' to quit, /help for commands)");
            println!();
        } else {
            eprintln!("# aas-query v{} - non-interactive mode", env!("CARGO_PKG_VERSION"));
        }
    }

    pub fn print_goodbye(&self) {
        if self.is_interactive {
            println!("Goodbye!");
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        match &mut self.input {
            Input::Editor(editor) => {
                // rustyline blocks on the terminal
                let line = tokio::task::block_in_place(|| editor.readline(PROMPT));
                match line {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = editor.add_history_entry(line.as_str());
                        }
                        Ok(Some(line))
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
                    Err(e) => Err(e).context("Failed to read input"),
                }
            }
            Input::Piped(lines) => lines.next_line().await.context("Failed to read stdin"),
        }
    }
}

#[async_trait(?Send)]
impl UserConsole for Repl {
    async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            let Some(line) = self.next_line().await? else {
                return Ok(None);
            };

            match Command::parse(&line) {
                Some(command) => println!("{}", handle_command(command, &self.tools)),
                None => return Ok(Some(line)),
            }
        }
    }

    fn show_reply(&mut self, text: &str) {
        println!("Agent: {}", text);
        if self.is_interactive {
            println!();
        }
    }

    fn show_error(&mut self, message: &str) {
        eprintln!("Error: {}", message);
    }

    fn show_tool_call(&mut self, call: &ToolUse) {
        if self.is_interactive {
            println!("[Calling {}...]", call.name);
        }
    }
}
