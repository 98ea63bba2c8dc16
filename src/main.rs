//! Fellow - chat over a local knowledge base
//!
//! A terminal front end for the conversation engine. Answers stream to stdout;
//! structured logs go to stderr.

mod conversation;
mod knowledge;
mod llm;
mod runtime;
mod system_prompt;
mod tools;

use knowledge::LocalKnowledgeBase;
use llm::{ContentPart, LlmConfig, Message};
use runtime::{ChatService, ShortCircuitPolicy};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tools::ToolRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_KNOWLEDGE_SOURCE: &str = "fellow-blob-knowledge-source";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fellow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let data_dir =
        PathBuf::from(std::env::var("FELLOW_DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    let source_name = std::env::var("FELLOW_KNOWLEDGE_SOURCE")
        .unwrap_or_else(|_| DEFAULT_KNOWLEDGE_SOURCE.to_string());
    let policy = std::env::var("FELLOW_SHORT_CIRCUIT_MARKER")
        .ok()
        .filter(|m| !m.is_empty())
        .map_or_else(ShortCircuitPolicy::default, ShortCircuitPolicy::new);

    let llm = llm::build_service(&LlmConfig::from_env())?;
    let system_prompt = system_prompt::build_system_prompt(
        std::env::var("FELLOW_SYSTEM_PROMPT").ok().as_deref(),
        &data_dir,
    );

    tracing::info!(data_dir = %data_dir.display(), source = %source_name, "Opening knowledge base");
    let knowledge_base = Arc::new(LocalKnowledgeBase::new(&data_dir, &source_name));
    let service = ChatService::new(llm, system_prompt, move || {
        ToolRegistry::knowledge(knowledge_base.clone(), knowledge_base.clone(), &source_name)
    })
    .with_policy(policy);

    println!("Ask a question. /new starts over, /history shows the log, /quit exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/new" => {
                service.start_new_conversation();
                println!("Started conversation {}.", service.conversation_id());
            }
            "/history" => print_history(&service.history()),
            text => run_turn(&service, text).await,
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}

/// Stream one answer to stdout; Ctrl-C cancels it
async fn run_turn(service: &ChatService, text: &str) {
    let mut printer = PartialPrinter::default();
    let cancel = CancellationToken::new();
    let turn = service.send_message(text, |partial: &str| printer.print(partial), &cancel);
    tokio::pin!(turn);

    let result = tokio::select! {
        result = &mut turn => result,
        _ = tokio::signal::ctrl_c() => {
            service.cancel_current();
            turn.await
        }
    };
    println!();

    match result {
        Ok(_) => {}
        Err(e) if e.is_cancelled() => println!("(cancelled)"),
        // Already shown inline after the partial answer
        Err(e) => tracing::debug!(error = %e, "Turn ended with error"),
    }
}

/// Prints only what each partial adds to the previous one
#[derive(Default)]
struct PartialPrinter {
    printed: String,
}

impl PartialPrinter {
    fn print(&mut self, partial: &str) {
        let mut stdout = std::io::stdout();
        let _ = match partial.strip_prefix(self.printed.as_str()) {
            Some(added) => write!(stdout, "{added}"),
            // Replaced wholesale (search result)
            None => write!(stdout, "\n{partial}"),
        };
        let _ = stdout.flush();
        partial.clone_into(&mut self.printed);
    }
}

fn print_history(history: &[Message]) {
    for message in history {
        let role = format!("{:?}", message.role).to_lowercase();
        for part in &message.parts {
            match part {
                ContentPart::Text { text } => println!("[{role}] {text}"),
                ContentPart::FunctionCall { name, arguments, .. } => {
                    let arguments = serde_json::Value::Object(arguments.clone());
                    println!("[{role}] call {name} {arguments}");
                }
                ContentPart::FunctionResult { call_id, result, is_error } => {
                    let marker = if *is_error { "error" } else { "result" };
                    println!("[{role}] {marker} {call_id}: {}", result.join(" "));
                }
            }
        }
    }
}
