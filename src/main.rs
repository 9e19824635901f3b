// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! mcp-host entry point - CLI and line-based chat.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::Level;
use uuid::Uuid;

use mcp_host::agent::{Agent, AgentEvent, ChatRequest, ChatResponse, TurnOutcome};
use mcp_host::config::{self, CliOptions, ResolvedConfig};
use mcp_host::providers::create_provider_from_config;
use mcp_host::session::SessionManager;
use mcp_host::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};
use mcp_host::types::Message;
use mcp_host::VERSION;

/// mcp-host - connect an LLM to Model Context Protocol tool servers.
#[derive(Parser)]
#[command(name = "mcp-host")]
#[command(author, version, about = "Connect an LLM to MCP tool servers", long_about = None)]
struct Cli {
    /// Config file to use instead of the workspace file
    #[arg(short, long, env = "MCP_HOST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Model to use
    #[arg(short, long, env = "MCP_HOST_MODEL", global = true)]
    model: Option<String>,

    /// Base URL for the OpenAI-compatible API
    #[arg(long, env = "MCP_HOST_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Show tool calls and a metrics report
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Show trace output (full payloads)
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to every configured server and report its status
    Servers {
        /// Bearer token forwarded to servers that ask for it
        #[arg(long, env = "MCP_HOST_BEARER_TOKEN")]
        token: Option<String>,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the tools visible to a user
    Tools {
        #[arg(short, long, default_value = "local")]
        user: String,
        #[arg(long, env = "MCP_HOST_BEARER_TOKEN")]
        token: Option<String>,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Chat with tools. Reads prompts from stdin when none is given.
    Chat {
        /// Run a single prompt and exit
        #[arg(short = 'P', long)]
        prompt: Option<String>,
        #[arg(short, long, default_value = "local")]
        user: String,
        #[arg(long, env = "MCP_HOST_BEARER_TOKEN")]
        token: Option<String>,
        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Run tool calls one at a time
        #[arg(long)]
        sequential_tools: bool,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List models offered by the configured endpoint
    Models {
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the merged configuration with secrets masked
    Show,
    /// Show which files were loaded
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(&telemetry_config(&cli))?;

    let mut cli_options = CliOptions {
        config_path: cli.config.clone(),
        model: cli.model.clone(),
        base_url: cli.base_url.clone(),
        ..Default::default()
    };
    if let Commands::Chat {
        max_iterations,
        sequential_tools,
        ..
    } = &cli.command
    {
        cli_options.max_iterations = *max_iterations;
        cli_options.sequential_tools = sequential_tools.then_some(true);
    }

    let workspace_root = std::env::current_dir()?;
    let workspace_root = config::find_workspace_root(&workspace_root).unwrap_or(workspace_root);

    let verbose = cli.verbose;
    match cli.command {
        Commands::Version => {
            println!("mcp-host {}", VERSION);
            Ok(())
        }
        Commands::Config { action } => {
            let config = config::load_config(&workspace_root, cli_options)?;
            handle_config_command(&config, action)
        }
        Commands::Servers { token, format } => {
            let config = config::load_config(&workspace_root, cli_options)?;
            handle_servers(&config, token.as_deref(), format).await
        }
        Commands::Tools { user, token, format } => {
            let config = config::load_config(&workspace_root, cli_options)?;
            handle_tools(&config, &user, token.as_deref(), format).await
        }
        Commands::Models { format } => {
            let config = config::load_config(&workspace_root, cli_options)?;
            handle_models(&config, format).await
        }
        Commands::Chat {
            prompt,
            user,
            token,
            stream,
            format,
            ..
        } => {
            let config = config::load_config(&workspace_root, cli_options)?;
            let options = ChatOptions {
                user,
                token,
                stream,
                format,
                verbose,
            };
            handle_chat(&config, prompt, options).await
        }
    }
}

fn telemetry_config(cli: &Cli) -> TelemetryConfig {
    if cli.trace {
        TelemetryConfig::development().with_filter("mcp_host=trace")
    } else if cli.debug {
        TelemetryConfig::development()
    } else if cli.verbose {
        TelemetryConfig::default().with_level(Level::INFO)
    } else {
        TelemetryConfig::default()
    }
}

fn session_manager(config: &ResolvedConfig) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        config.server_descriptors(),
        config.session_settings(),
    ))
}

fn handle_config_command(config: &ResolvedConfig, action: Option<ConfigAction>) -> anyhow::Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
        Some(ConfigAction::Sources) => {
            if config.sources.is_empty() {
                println!("{}", "No config files found; using defaults".dimmed());
            }
            for path in &config.sources {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

async fn handle_servers(
    config: &ResolvedConfig,
    token: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let manager = session_manager(config);
    let statuses = manager.probe_all(token).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Text => {
            if statuses.is_empty() {
                println!("{}", "No servers configured".dimmed());
            }
            for status in &statuses {
                if !status.enabled {
                    println!("{} {} {}", "-".dimmed(), status.name, "(disabled)".dimmed());
                } else if status.is_healthy() {
                    println!("{} {}", "✓".green(), status.name.bright_white());
                } else {
                    let reason = status.error.as_deref().unwrap_or("unreachable");
                    println!("{} {} {}", "✗".red(), status.name.bright_white(), reason.red());
                }
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

async fn handle_tools(
    config: &ResolvedConfig,
    user: &str,
    token: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let manager = session_manager(config);
    let tools = manager.list_tools_for_user(user, token).await;

    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.qualified_name(),
                        "server": t.server,
                        "description": t.tool.description,
                        "inputSchema": t.tool.input_schema,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if tools.is_empty() {
                println!("{}", "No tools available".dimmed());
            }
            for tool in &tools {
                let description = tool.tool.description.as_deref().unwrap_or("");
                println!("{} {}", tool.qualified_name().bright_cyan(), description.dimmed());
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

async fn handle_models(config: &ResolvedConfig, format: OutputFormat) -> anyhow::Result<()> {
    let provider = create_provider_from_config(&config.provider_config())?;
    let models = provider.list_models().await?;

    match format {
        OutputFormat::Json => {
            let ids: Vec<_> = models.iter().map(|m| &m.id).collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        OutputFormat::Text => {
            println!("{}", format!("{} models", provider.name()).bright_blue().bold());
            for model in &models {
                let marker = if model.id == provider.model() { "*" } else { " " };
                println!("{} {}", marker.green(), model.id);
            }
        }
    }
    Ok(())
}

struct ChatOptions {
    user: String,
    token: Option<String>,
    stream: bool,
    format: OutputFormat,
    verbose: bool,
}

async fn handle_chat(
    config: &ResolvedConfig,
    prompt: Option<String>,
    options: ChatOptions,
) -> anyhow::Result<()> {
    let provider = create_provider_from_config(&config.provider_config())?;
    let sessions = session_manager(config);
    sessions.spawn_cleanup_task();
    let agent = Agent::new(provider, Arc::clone(&sessions), config.agent_config());

    let conversation = Uuid::new_v4().to_string();
    let mut history: Vec<Message> = Vec::new();

    let result = match prompt {
        Some(prompt) => run_turn(&agent, &conversation, &mut history, prompt, &options).await,
        None => run_repl(&agent, &conversation, &mut history, &options).await,
    };

    sessions.shutdown().await;

    if options.verbose {
        eprintln!("{}", GLOBAL_METRICS.snapshot().format_report());
    }
    result
}

async fn run_repl(
    agent: &Agent,
    conversation: &str,
    history: &mut Vec<Message>,
    options: &ChatOptions,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/exit" | "/quit") {
            break;
        }
        if let Err(e) = run_turn(agent, conversation, history, line.to_string(), options).await {
            eprintln!("{}", e.to_string().red());
        }
    }
    Ok(())
}

async fn run_turn(
    agent: &Agent,
    conversation: &str,
    history: &mut Vec<Message>,
    prompt: String,
    options: &ChatOptions,
) -> anyhow::Result<()> {
    let mut request = ChatRequest::new(conversation, &options.user, prompt.clone())
        .with_history(history.clone());
    if let Some(token) = &options.token {
        request = request.with_bearer_token(token.clone());
    }

    let response = if options.stream && matches!(options.format, OutputFormat::Text) {
        stream_turn(agent, request, options.verbose).await?
    } else {
        let response = agent.chat(request).await?;
        print_response(&response, options)?;
        response
    };

    history.push(Message::user(prompt));
    history.push(response.message);
    Ok(())
}

async fn stream_turn(agent: &Agent, request: ChatRequest, verbose: bool) -> anyhow::Result<ChatResponse> {
    let mut events = agent.chat_stream(request);
    let mut stdout = tokio::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::ContentDelta(text) => {
                stdout.write_all(text.as_bytes()).await?;
                stdout.flush().await?;
            }
            AgentEvent::ToolStart { server, tool, .. } => {
                if verbose {
                    eprintln!("{} {}:{}", "→".cyan(), server, tool);
                }
            }
            AgentEvent::ToolComplete(execution) => {
                if verbose {
                    let status = if execution.is_error() { "✗".red() } else { "✓".green() };
                    eprintln!(
                        "{} {} ({}ms)",
                        status,
                        execution.qualified_name(),
                        execution.duration_ms
                    );
                }
            }
            AgentEvent::Done(response) => {
                if response.outcome == TurnOutcome::MaxIterationsReached {
                    stdout.write_all(response.content().as_bytes()).await?;
                }
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                return Ok(*response);
            }
            AgentEvent::Error(message) => anyhow::bail!(message),
        }
    }
    anyhow::bail!("turn ended without a response")
}

fn print_response(response: &ChatResponse, options: &ChatOptions) -> anyhow::Result<()> {
    match options.format {
        OutputFormat::Text => {
            if options.verbose {
                for execution in &response.tool_executions {
                    let status = if execution.is_error() { "✗".red() } else { "✓".green() };
                    eprintln!(
                        "{} {} ({}ms)",
                        status,
                        execution.qualified_name(),
                        execution.duration_ms
                    );
                }
            }
            println!("{}", response.content());
        }
        OutputFormat::Json => {
            let body = serde_json::json!({
                "response": response.content(),
                "outcome": response.outcome,
                "iterations": response.iterations,
                "toolExecutions": response.tool_executions,
                "usage": response.usage,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}
