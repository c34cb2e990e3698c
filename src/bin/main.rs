use sales_comp_agent::{
    agent::Orchestrator, config::AgentConfig, ConversationHistory, Request, TurnOutcome,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run a single turn from the command line:
/// `agent "What happens to my commission if I go on leave?"`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        eprintln!("usage: agent <request text>");
        std::process::exit(2);
    }

    let config = AgentConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let request = Request::fresh(text);
    info!(conversation_id = %request.conversation_id(), "Running turn");

    let report = orchestrator
        .run_turn(&request, &ConversationHistory::empty())
        .await;

    println!("\n=== TURN RESULT ===");
    println!("Turn ID: {}", report.turn_id);
    match &report.outcome {
        TurnOutcome::Completed(result) => {
            println!("Category: {}", result.category);
            println!("\n{}", result.response_text);
        }
        TurnOutcome::Failed { response_text } => println!("\n{}", response_text),
        TurnOutcome::Rejected { label } => println!("(no response: unknown category {:?})", label),
    }

    println!("\nTrace:");
    for (i, step) in report.trace.iter().enumerate() {
        println!("  {}: {}", i + 1, step);
    }

    Ok(())
}
