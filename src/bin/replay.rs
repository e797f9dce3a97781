//! Replay a scripted reservation conversation and print every turn

use clap::Parser;
use convoflow::config::EngineConfig;
use convoflow::logging::init_tracing;
use convoflow::replay::{run_scenario, Scenario};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convoflow-replay")]
#[command(about = "Replay a scripted conversation through the reservation workflow")]
struct Cli {
    /// Scenario file (JSON)
    scenario: PathBuf,
    /// Print the full report as JSON instead of a transcript
    #[arg(long)]
    json: bool,
    /// Append the collected session fields to every reply
    #[arg(long)]
    debug_context: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut config, warnings) = EngineConfig::from_env_with_warnings();
    if cli.debug_context {
        config.debug_context = true;
    }
    init_tracing(config.log_format)?;
    for warning in &warnings {
        warning.log();
    }

    let scenario = Scenario::load(&cli.scenario)?;
    tracing::info!(
        scenario = scenario.name.as_deref().unwrap_or("unnamed"),
        turns = scenario.turns.len(),
        "Replaying scenario"
    );
    let report = run_scenario(&scenario, config).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (index, turn) in report.turns.iter().enumerate() {
        println!("--- turn {} [{}]", index + 1, turn.step.as_deref().unwrap_or("failed"));
        println!("user: {}", turn.message);
        println!("bot:  {}", turn.reply);
        if let Some(error) = &turn.error {
            println!("error: {error}");
        }
    }
    println!("--- session {}", report.final_session.debug_summary());
    Ok(())
}
