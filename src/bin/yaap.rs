//! Interactive chat with an OpenAI-compatible model.
//!
//! Responses stream as they arrive; `<think>` blocks are hidden behind an
//! animated indicator unless `--show-thinking` is given.
//!
//! # Usage
//!
//! ```bash
//! # Connection settings from LLM_BASE_URL, LLM_MODEL and LLM_API_KEY (or .env)
//! yaap
//!
//! # Connection settings from a YAML file, with a different model
//! yaap --config yaap.yaml --model qwen3:8b
//!
//! # Plain output with thinking shown
//! yaap --no-color --show-thinking
//! ```
//!
//! Without usable connection settings the chat runs offline with canned
//! replies.

use std::sync::Arc;

use arrrg::CommandLine;
use biometrics::Collector;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use yaap::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use yaap::{
    Interrupt, LlmClient, LlmConfig, TracingClientLogger, register_biometrics, terminal_width,
};

fn init_tracing(debug: bool) {
    let level = if debug { "yaap=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the client, or `None` to run offline.
fn connect(config: &ChatConfig) -> Option<LlmClient> {
    let loaded = match &config.config_path {
        Some(path) => LlmConfig::from_file(path),
        None => LlmConfig::from_env(),
    };
    let mut llm = match loaded {
        Ok(llm) => llm,
        Err(err) => {
            warn!(error = %err, "no usable connection settings; running offline");
            return None;
        }
    };
    if let Some(model) = &config.model {
        llm.model = model.clone();
    }
    match LlmClient::new(llm) {
        Ok(client) => Some(
            client
                .with_logger(Arc::new(TracingClientLogger))
                .with_markers(config.markers.clone())
                .with_postprocessing(config.remove_thinking),
        ),
        Err(err) => {
            warn!(error = %err, "could not create client; running offline");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("USAGE: yaap [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    init_tracing(config.debug);
    register_biometrics(Collector::new());

    let use_color = config.use_color;
    let client = connect(&config);
    let mut session = ChatSession::new(client, config);
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || handler.trigger())?;

    println!("> YAAP - Yet Another AI Program");
    println!("Type 'exit' or 'quit' to end the session");
    println!("Type 'help' for available commands");
    println!("{}", "-".repeat(50));
    if session.is_offline() {
        renderer.print_info("No API configured; answering offline.");
    } else {
        debug!(model = %session.model(), "connected");
    }

    loop {
        interrupt.reset();

        let line = match rl.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        if let Some(command) = parse_command(line) {
            match command {
                ChatCommand::Quit => break,
                ChatCommand::Help => println!("{}", help_text()),
                ChatCommand::History => {
                    for line in session.history_lines(terminal_width()) {
                        println!("{line}");
                    }
                }
                ChatCommand::Clear => {
                    session.clear();
                    renderer.print_info("Conversation history cleared.");
                }
                ChatCommand::Stats => println!("{}", session.stats()),
                ChatCommand::Thinking(show) => {
                    session.set_remove_thinking(!show);
                    if show {
                        renderer.print_info("Thinking blocks will be shown.");
                    } else {
                        renderer.print_info("Thinking blocks will be hidden.");
                    }
                }
                ChatCommand::Model(model) => {
                    if session.set_model(&model) {
                        renderer.print_info(&format!("Model changed to: {model}"));
                    } else {
                        renderer.print_error("Cannot change model while offline.");
                    }
                }
                ChatCommand::System(prompt) => {
                    let restored = prompt.is_none();
                    session.set_system_prompt(prompt);
                    if restored {
                        renderer.print_info("System prompt restored to default.");
                    } else {
                        renderer.print_info("System prompt updated.");
                    }
                }
                ChatCommand::Invalid(message) => renderer.print_error(&message),
            }
            continue;
        }

        println!("AI:");
        match session
            .send_streaming(line, &mut renderer, Some(&interrupt))
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_abort() => {}
            Err(err) => renderer.print_error(&err.to_string()),
        }
    }

    println!("\n{}", session.summary());
    Ok(())
}
