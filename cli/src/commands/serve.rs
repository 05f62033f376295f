use super::load_programs;
use anyhow::Result;
use goalrt_core::{
    AgentOutcome, AgentRunner, DebugSession, EntityKind, GoalrtConfig, RecordingEnvironment,
    RuntimeBridge,
};
use std::path::Path;
use tracing::{info, warn};

/// Id under which the shared environment is announced
const ENVIRONMENT_ID: &str = "environment";

pub async fn execute(config: &GoalrtConfig, file: &Path, paused: bool) -> Result<()> {
    let programs = load_programs(file)?;

    let session = DebugSession::with_pause_channels(config.debugger.default_pause_channels.clone());
    let bridge = RuntimeBridge::new(
        session.clone(),
        tokio::io::stdout(),
        config.debugger.reply_timeout(),
    )?;
    let runner = AgentRunner::new(session.clone(), config.runtime.clone());

    let environment = RecordingEnvironment::new();
    let env_debugger = session.create_debugger(ENVIRONMENT_ID);
    session.register(ENVIRONMENT_ID, EntityKind::Environment, env_debugger.clone(), None);
    bridge.attach(ENVIRONMENT_ID, EntityKind::Environment, &env_debugger)?;

    let mut handles = Vec::new();
    for program in programs {
        let debugger = session.create_debugger(&program.name);
        bridge.attach(&program.name, EntityKind::Agent, &debugger)?;
        if paused {
            debugger.pause();
        }
        handles.push(runner.launch(program, debugger, Some(Box::new(environment.clone())))?);
    }

    bridge.serve(tokio::io::stdin()).await?;

    for handle in handles {
        let name = handle.name().to_string();
        match tokio::task::spawn_blocking(move || handle.join()).await? {
            AgentOutcome::Failed(reason) => warn!("Agent {} failed: {}", name, reason),
            outcome => info!("Agent {} ended: {:?}", name, outcome),
        }
    }
    Ok(())
}
