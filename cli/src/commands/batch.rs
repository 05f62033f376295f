use super::load_programs;
use anyhow::Result;
use colored::Colorize;
use goalrt_core::{
    AgentOutcome, AgentRunner, Channel, DebugObject, DebugSession, EventRecorder, GoalrtConfig,
    RecordingEnvironment,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

struct AgentReport {
    name: String,
    outcome: AgentOutcome,
    achieved: Vec<String>,
    performed: Vec<String>,
}

pub async fn execute(
    config: &GoalrtConfig,
    file: &Path,
    max_cycles: Option<u64>,
    format: &str,
) -> Result<()> {
    let programs = load_programs(file)?;

    let mut runtime = config.runtime.clone();
    if let Some(max) = max_cycles {
        runtime.max_cycles = max;
    }

    // nobody steps these agents, so nothing pauses
    let session = DebugSession::new();
    let runner = AgentRunner::new(session.clone(), runtime);
    let environment = RecordingEnvironment::new();

    let mut launched = Vec::new();
    for program in programs {
        let debugger = session.create_debugger(&program.name);
        let recorder = Arc::new(EventRecorder::new());
        debugger.subscribe(recorder.clone(), Channel::GoalAchieved);
        let handle = runner.launch(program, debugger, Some(Box::new(environment.clone())))?;
        launched.push((handle, recorder));
    }

    let mut reports = Vec::new();
    for (handle, recorder) in launched {
        let name = handle.name().to_string();
        let outcome = tokio::task::spawn_blocking(move || handle.join()).await?;
        let achieved = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e.object {
                DebugObject::BaseChange { term, .. } => Some(term.to_string()),
                _ => None,
            })
            .collect();
        let performed = environment
            .performed()
            .into_iter()
            .filter(|(agent, _)| *agent == name)
            .map(|(_, action)| action)
            .collect();
        reports.push(AgentReport {
            name,
            outcome,
            achieved,
            performed,
        });
    }
    session.close();

    match format {
        "json" => print_json(&reports)?,
        _ => print_text(&reports),
    }
    Ok(())
}

fn outcome_fields(outcome: &AgentOutcome) -> (&'static str, Option<u64>, Option<&str>) {
    match outcome {
        AgentOutcome::Finished { cycles } => ("finished", Some(*cycles), None),
        AgentOutcome::Killed { cycles } => ("killed", Some(*cycles), None),
        AgentOutcome::Failed(reason) => ("failed", None, Some(reason.as_str())),
    }
}

fn print_json(reports: &[AgentReport]) -> Result<()> {
    let agents: Vec<_> = reports
        .iter()
        .map(|r| {
            let (status, cycles, error) = outcome_fields(&r.outcome);
            json!({
                "agent": r.name,
                "status": status,
                "cycles": cycles,
                "error": error,
                "achieved": r.achieved,
                "performed": r.performed,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&json!({ "agents": agents }))?);
    Ok(())
}

fn print_text(reports: &[AgentReport]) {
    println!("\n{}", "Agents".green().bold());
    println!("{}", "─".repeat(60).dimmed());
    for report in reports {
        let (status, cycles, error) = outcome_fields(&report.outcome);
        let status = match status {
            "finished" => status.green(),
            "killed" => status.yellow(),
            _ => status.red(),
        };
        let cycles = cycles.map(|c| format!("{} cycles", c)).unwrap_or_default();
        println!("{:<20} {:<10} {}", report.name.bold(), status, cycles);
        if let Some(error) = error {
            println!("  {} {}", "error:".red(), error);
        }
        for goal in &report.achieved {
            println!("  {} {}", "achieved".cyan(), goal);
        }
        for action in &report.performed {
            println!("  {} {}", "performed".dimmed(), action);
        }
    }
}
