// Agent loop - drives the conversation between the user, the LLM and the tools
//
// One user turn: ask for a completion; if the model requests tools, dispatch
// them one by one in emission order, append each result, then ask again.
// Every requested call is answered before the next completion.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::conversation::Transcript;
use super::prompt::SYSTEM_PROMPT;
use crate::config::constants::{DEFAULT_MAX_TOKENS, EXIT_WORDS};
use crate::config::AgentConfig;
use crate::providers::{LlmProvider, ProviderRequest, ProviderResponse};
use crate::tools::mcp::{McpError, ToolInvoker};
use crate::tools::types::{ToolDefinition, ToolUse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    AwaitingUserInput,
    AwaitingCompletion,
    DispatchingInvocations,
    Terminated,
}

/// What happened with one line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Final assistant text for this turn
    Reply(String),
    /// Blank input, nothing sent
    Skipped,
    /// Exit sentinel; the loop is terminated
    Exit,
    /// The turn could not finish; the loop keeps going
    Failed(String),
}

/// Where the loop reads input and shows output.
///
/// Line editors hold terminal state, so implementations need not be `Send`.
#[async_trait(?Send)]
pub trait UserConsole {
    /// Next line of input, `None` on end of input
    async fn read_line(&mut self) -> Result<Option<String>>;

    fn show_reply(&mut self, text: &str);

    fn show_error(&mut self, message: &str);

    fn show_tool_call(&mut self, _call: &ToolUse) {}
}

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_WORDS.iter().any(|word| word.eq_ignore_ascii_case(input))
}

/// Cap `text` at `max_chars` characters (0 disables the cap)
pub fn truncate_result(text: String, max_chars: usize) -> String {
    if max_chars == 0 {
        return text;
    }
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    format!(
        "{}\n[truncated: showing {} of {} characters]",
        &text[..cut],
        max_chars,
        total
    )
}

fn error_payload(message: impl Into<String>) -> String {
    json!({ "error": message.into() }).to_string()
}

pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolInvoker>,
    tool_defs: Vec<ToolDefinition>,
    transcript: Transcript,
    config: AgentConfig,
    max_tokens: u32,
    temperature: Option<f32>,
    state: AgentState,
}

impl AgentLoop {
    /// Discover the available tools and start a transcript with the system prompt
    pub async fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolInvoker>,
        config: AgentConfig,
    ) -> Result<Self> {
        let tool_defs = tools
            .list_tools()
            .await
            .context("Failed to list tools from MCP server")?;

        tracing::info!(
            "Agent ready with {} tool(s) via {} ({})",
            tool_defs.len(),
            provider.name(),
            provider.default_model()
        );

        Ok(Self {
            provider,
            tools,
            tool_defs,
            transcript: Transcript::with_system_prompt(SYSTEM_PROMPT),
            config,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            state: AgentState::AwaitingUserInput,
        })
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tool_defs
    }

    /// Read input until an exit sentinel or end of input
    pub async fn run(&mut self, console: &mut dyn UserConsole) -> Result<()> {
        while self.state != AgentState::Terminated {
            let Some(line) = console.read_line().await? else {
                tracing::debug!("End of input");
                self.state = AgentState::Terminated;
                break;
            };

            match self.handle_input(&line, console).await? {
                TurnOutcome::Reply(text) => console.show_reply(&text),
                TurnOutcome::Failed(message) => console.show_error(&message),
                TurnOutcome::Skipped | TurnOutcome::Exit => {}
            }
        }
        Ok(())
    }

    /// Process one line of user input.
    ///
    /// Errors are reserved for broken transcript invariants; LLM and tool
    /// failures are reported through the outcome.
    pub async fn handle_input(
        &mut self,
        input: &str,
        console: &mut dyn UserConsole,
    ) -> Result<TurnOutcome> {
        if self.state == AgentState::Terminated {
            return Ok(TurnOutcome::Exit);
        }
        if is_exit_command(input) {
            self.state = AgentState::Terminated;
            return Ok(TurnOutcome::Exit);
        }
        if input.trim().is_empty() {
            return Ok(TurnOutcome::Skipped);
        }

        self.transcript.push_user(input)?;
        let outcome = self.run_turn(console).await;
        self.state = AgentState::AwaitingUserInput;
        outcome
    }

    async fn run_turn(&mut self, console: &mut dyn UserConsole) -> Result<TurnOutcome> {
        let mut rounds = 0;

        loop {
            self.state = AgentState::AwaitingCompletion;
            let response = match self.complete().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Completion request failed: {:#}", e);
                    return Ok(TurnOutcome::Failed(format!("LLM request failed: {:#}", e)));
                }
            };

            if !response.has_tool_calls() {
                let text = response.content.unwrap_or_default();
                self.transcript.push_assistant_text(text.clone())?;
                return Ok(TurnOutcome::Reply(text));
            }

            if rounds >= self.config.max_tool_rounds {
                // Unanswered calls are dropped, not recorded
                tracing::warn!(
                    "Tool round limit ({}) reached, dropping {} requested call(s)",
                    self.config.max_tool_rounds,
                    response.tool_calls.len()
                );
                return Ok(TurnOutcome::Failed(format!(
                    "Stopped after {} tool rounds without a final answer",
                    self.config.max_tool_rounds
                )));
            }
            rounds += 1;

            let calls = response.tool_calls;
            self.transcript
                .push_tool_calls(response.content, calls.clone())?;

            self.state = AgentState::DispatchingInvocations;
            for call in &calls {
                console.show_tool_call(call);
                let content = self.invoke(call).await;
                let content = truncate_result(content, self.config.max_tool_result_chars);
                self.transcript.push_tool_result(&call.id, content)?;
            }
        }
    }

    async fn complete(&self) -> Result<ProviderResponse> {
        self.transcript.ensure_ready_for_completion()?;
        let request = ProviderRequest::new(self.transcript.messages())
            .with_tools(&self.tool_defs)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        self.provider.send_message(&request).await
    }

    /// Run one tool call; every failure becomes an error payload
    async fn invoke(&self, call: &ToolUse) -> String {
        if !self.tool_defs.iter().any(|tool| tool.name == call.name) {
            tracing::warn!("Model requested unknown function '{}'", call.name);
            return error_payload(format!("Unknown function: {}", call.name));
        }

        if let Some(reason) = call.argument_error() {
            tracing::warn!("Model sent unparsable arguments for '{}': {}", call.name, reason);
            return error_payload(format!("Invalid arguments for {}: {}", call.name, reason));
        }

        tracing::info!(tool = %call.name, id = %call.id, "Dispatching tool call");

        match self.tools.call_tool(&call.name, call.input.clone()).await {
            Ok(result) => {
                if result.is_error {
                    tracing::warn!("Tool '{}' reported an error", call.name);
                }
                result.text_content()
            }
            Err(McpError::Rpc { message, .. }) => {
                tracing::warn!("Tool '{}' rejected: {}", call.name, message);
                error_payload(message)
            }
            Err(e) => {
                tracing::error!("Tool call '{}' failed: {}", call.name, e);
                error_payload(format!("Tool call failed: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Message;
    use crate::tools::mcp::CallToolResult;
    use crate::tools::query_tool;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every transcript it was sent
    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<ProviderResponse>>>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<ProviderResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn send_message(&self, request: &ProviderRequest<'_>) -> Result<ProviderResponse> {
            self.requests.lock().unwrap().push(request.messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ProviderResponse::text("(script exhausted)")))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }
    }

    enum Reply {
        Text(String),
        Rpc(String),
        Closed,
    }

    struct FakeTools {
        reply: Reply,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeTools {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ToolInvoker for FakeTools {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
            Ok(vec![query_tool::definition().clone()])
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            match &self.reply {
                Reply::Text(prefix) => Ok(CallToolResult::text(format!(
                    "{}{}",
                    prefix,
                    arguments["query"].as_str().unwrap_or("")
                ))),
                Reply::Rpc(message) => Err(McpError::Rpc {
                    code: -32602,
                    message: message.clone(),
                }),
                Reply::Closed => Err(McpError::ConnectionClosed),
            }
        }
    }

    #[derive(Default)]
    struct RecordingConsole {
        inputs: VecDeque<String>,
        replies: Vec<String>,
        errors: Vec<String>,
        tool_calls: Vec<String>,
    }

    impl RecordingConsole {
        fn with_inputs(inputs: &[&str]) -> Self {
            Self {
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait(?Send)]
    impl UserConsole for RecordingConsole {
        async fn read_line(&mut self) -> Result<Option<String>> {
            Ok(self.inputs.pop_front())
        }

        fn show_reply(&mut self, text: &str) {
            self.replies.push(text.to_string());
        }

        fn show_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }

        fn show_tool_call(&mut self, call: &ToolUse) {
            self.tool_calls.push(call.id.clone());
        }
    }

    fn query_call(id: &str, query: &str) -> ToolUse {
        ToolUse::with_id(
            id,
            query_tool::definition().name.clone(),
            json!({ "query": query }),
        )
    }

    async fn agent(
        provider: Arc<ScriptedProvider>,
        tools: Arc<FakeTools>,
        config: AgentConfig,
    ) -> AgentLoop {
        AgentLoop::new(provider, tools, config).await.unwrap()
    }

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  QUIT "));
        assert!(is_exit_command("q"));
        assert!(is_exit_command("/exit"));
        assert!(!is_exit_command("quit please"));
        assert!(!is_exit_command(""));
    }

    #[test]
    fn test_truncate_result() {
        assert_eq!(truncate_result("short".into(), 10), "short");
        assert_eq!(truncate_result("anything".into(), 0), "anything");

        let text = truncate_result("ééééé".into(), 3);
        assert_eq!(text, "ééé\n[truncated: showing 3 of 5 characters]");
    }

    #[tokio::test]
    async fn test_exit_sentinel_issues_no_completion() {
        let provider = ScriptedProvider::new(vec![]);
        let mut agent = agent(provider.clone(), FakeTools::new(Reply::Closed), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        let outcome = agent.handle_input("Exit", &mut console).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Exit);
        assert_eq!(agent.state(), AgentState::Terminated);
        assert_eq!(provider.request_count(), 0);
        assert_eq!(agent.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_input_is_skipped() {
        let provider = ScriptedProvider::new(vec![]);
        let mut agent = agent(provider.clone(), FakeTools::new(Reply::Closed), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        let outcome = agent.handle_input("   ", &mut console).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Skipped);
        assert_eq!(agent.state(), AgentState::AwaitingUserInput);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let provider = ScriptedProvider::new(vec![Ok(ProviderResponse::text("Hello!"))]);
        let mut agent = agent(provider.clone(), FakeTools::new(Reply::Closed), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        let outcome = agent.handle_input("hi", &mut console).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Reply("Hello!".into()));
        let sent = &provider.requests.lock().unwrap()[0];
        assert_eq!(sent[0].role(), "system");
        assert_eq!(sent[1].text(), Some("hi"));
        assert_eq!(agent.transcript().len(), 3);
    }

    #[tokio::test]
    async fn test_tool_calls_answered_in_order_before_next_completion() {
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse::with_tool_calls(vec![
                query_call("call_1", "EVALUATE 'Product'"),
                query_call("call_2", "EVALUATE 'Customer'"),
            ])),
            Ok(ProviderResponse::text("Here are your results")),
        ]);
        let tools = FakeTools::new(Reply::Text("rows for ".into()));
        let mut agent = agent(provider.clone(), tools.clone(), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        let outcome = agent.handle_input("top products", &mut console).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Reply("Here are your results".into()));
        assert_eq!(console.tool_calls, vec!["call_1", "call_2"]);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        // system, user, assistant(tool calls), tool, tool
        assert_eq!(second.len(), 5);
        match (&second[3], &second[4]) {
            (
                Message::Tool {
                    tool_call_id: first_id,
                    content: first,
                },
                Message::Tool {
                    tool_call_id: second_id,
                    content: second,
                },
            ) => {
                assert_eq!(first_id, "call_1");
                assert_eq!(first, "rows for EVALUATE 'Product'");
                assert_eq!(second_id, "call_2");
                assert_eq!(second, "rows for EVALUATE 'Customer'");
            }
            other => panic!("unexpected messages: {:?}", other),
        }

        assert_eq!(tools.calls.lock().unwrap().len(), 2);
        assert_eq!(agent.transcript().tool_result_count(), 2);
        assert_eq!(agent.state(), AgentState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn test_unknown_function_is_answered_locally() {
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse::with_tool_calls(vec![ToolUse::with_id(
                "call_x",
                "drop_tables",
                json!({}),
            )])),
            Ok(ProviderResponse::text("sorry")),
        ]);
        let tools = FakeTools::new(Reply::Text(String::new()));
        let mut agent = agent(provider, tools.clone(), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        agent.handle_input("do it", &mut console).await.unwrap();

        assert!(tools.calls.lock().unwrap().is_empty());
        let tool_msg = &agent.transcript().messages()[3];
        assert_eq!(tool_msg.text(), Some(r#"{"error":"Unknown function: drop_tables"}"#));
    }

    #[tokio::test]
    async fn test_unparsable_arguments_are_rejected_locally() {
        let raw = r#"{"query": "EVALUATE TOPN(10, 'Product')"#;
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse::with_tool_calls(vec![ToolUse::from_arguments(
                "call_1".into(),
                "query_analysis_services".into(),
                raw,
            )])),
            Ok(ProviderResponse::text("Let me fix that query.")),
        ]);
        let tools = FakeTools::new(Reply::Text("rows for ".into()));
        let mut agent = agent(provider.clone(), tools.clone(), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        agent.handle_input("top 10 products", &mut console).await.unwrap();

        assert!(tools.calls.lock().unwrap().is_empty());

        let requests = provider.requests.lock().unwrap();
        let second = &requests[1];
        match &second[2] {
            Message::Assistant { tool_calls, .. } => {
                assert_eq!(tool_calls[0].arguments_text(), raw);
            }
            other => panic!("expected the assistant tool call, got {:?}", other),
        }
        let payload: Value = serde_json::from_str(second[3].text().unwrap()).unwrap();
        let error = payload["error"].as_str().unwrap();
        assert!(
            error.starts_with("Invalid arguments for query_analysis_services: EOF while parsing"),
            "{}",
            error
        );
    }

    #[tokio::test]
    async fn test_rpc_and_transport_errors_become_payloads() {
        for (reply, expected) in [
            (
                Reply::Rpc("Unknown tool: x".into()),
                r#"{"error":"Unknown tool: x"}"#,
            ),
            (
                Reply::Closed,
                r#"{"error":"Tool call failed: MCP server closed the connection"}"#,
            ),
        ] {
            let provider = ScriptedProvider::new(vec![
                Ok(ProviderResponse::with_tool_calls(vec![query_call("call_1", "EVALUATE 'Product'")])),
                Ok(ProviderResponse::text("done")),
            ]);
            let mut agent = agent(provider, FakeTools::new(reply), AgentConfig::default()).await;
            let mut console = RecordingConsole::default();

            let outcome = agent.handle_input("go", &mut console).await.unwrap();

            assert_eq!(outcome, TurnOutcome::Reply("done".into()));
            assert_eq!(agent.transcript().messages()[3].text(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_loop_alive() {
        let provider = ScriptedProvider::new(vec![
            Err(anyhow::anyhow!("503 service unavailable")),
            Ok(ProviderResponse::text("back again")),
        ]);
        let mut agent = agent(provider, FakeTools::new(Reply::Closed), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        let outcome = agent.handle_input("first", &mut console).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed(ref m) if m.contains("503")));
        assert_eq!(agent.state(), AgentState::AwaitingUserInput);

        let outcome = agent.handle_input("second", &mut console).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Reply("back again".into()));
    }

    #[tokio::test]
    async fn test_round_limit_stops_turn() {
        let looping = || {
            Ok(ProviderResponse::with_tool_calls(vec![ToolUse::new(
                query_tool::definition().name.clone(),
                json!({"query": "EVALUATE 'Product'"}),
            )]))
        };
        let provider = ScriptedProvider::new(vec![looping(), looping(), looping()]);
        let config = AgentConfig {
            max_tool_rounds: 2,
            ..AgentConfig::default()
        };
        let mut agent = agent(provider.clone(), FakeTools::new(Reply::Text("r".into())), config).await;
        let mut console = RecordingConsole::default();

        let outcome = agent.handle_input("loop forever", &mut console).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Failed(_)));
        assert_eq!(provider.request_count(), 3);
        assert_eq!(agent.transcript().tool_result_count(), 2);
        assert!(agent.transcript().pending_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_large_results_are_truncated() {
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse::with_tool_calls(vec![query_call("call_1", &"x".repeat(100))])),
            Ok(ProviderResponse::text("ok")),
        ]);
        let config = AgentConfig {
            max_tool_result_chars: 10,
            ..AgentConfig::default()
        };
        let mut agent = agent(provider, FakeTools::new(Reply::Text(String::new())), config).await;
        let mut console = RecordingConsole::default();

        agent.handle_input("big", &mut console).await.unwrap();

        let text = agent.transcript().messages()[3].text().unwrap();
        assert!(text.starts_with("xxxxxxxxxx\n"));
        assert!(text.ends_with("[truncated: showing 10 of 100 characters]"));
    }

    #[tokio::test]
    async fn test_run_until_exit() {
        let provider = ScriptedProvider::new(vec![Ok(ProviderResponse::text("answer"))]);
        let mut agent = agent(provider.clone(), FakeTools::new(Reply::Closed), AgentConfig::default()).await;
        let mut console = RecordingConsole::with_inputs(&["question", "", "quit", "never read"]);

        agent.run(&mut console).await.unwrap();

        assert_eq!(console.replies, vec!["answer"]);
        assert_eq!(console.inputs.len(), 1);
        assert_eq!(provider.request_count(), 1);
        assert_eq!(agent.state(), AgentState::Terminated);
    }

    #[tokio::test]
    async fn test_run_stops_at_end_of_input() {
        let provider = ScriptedProvider::new(vec![]);
        let mut agent = agent(provider, FakeTools::new(Reply::Closed), AgentConfig::default()).await;
        let mut console = RecordingConsole::default();

        agent.run(&mut console).await.unwrap();
        assert_eq!(agent.state(), AgentState::Terminated);
    }
}
