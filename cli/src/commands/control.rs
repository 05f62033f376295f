//! Drives a `goalrt serve` child process through the controller bridge.
//!
//! Script lines:
//!
//! ```text
//! wait ID             wait until ID is registered
//! run ID | pause ID
//! step ID [fine]
//! eval ID CONDITION
//! history ID
//! why ID ACTION | whynot ID ACTION
//! mode ID             last run mode reported for ID
//! sleep MS
//! stop
//! ```

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use goalrt_core::protocol::StepKind;
use goalrt_core::{Command, ControllerBridge, DebugSession, GoalrtConfig, ProxySpawner};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

pub async fn execute(
    config: &GoalrtConfig,
    config_path: Option<&Path>,
    file: &Path,
    script: Option<&Path>,
) -> Result<()> {
    let script = match script {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };

    let mut command = tokio::process::Command::new(std::env::current_exe()?);
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    command
        .arg("serve")
        .arg(file)
        .arg("--paused")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    let mut child = command.spawn().context("Failed to start the runtime")?;
    let input = child.stdout.take().context("runtime stdout not captured")?;
    let output = child.stdin.take().context("runtime stdin not captured")?;

    let session = DebugSession::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let bridge = ControllerBridge::connect(
        input,
        output,
        session.clone(),
        Arc::new(ProxySpawner),
        events_tx,
        &config.debugger,
    );
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_notification(&event);
        }
    });

    for (number, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "stop" {
            break;
        }
        if let Err(e) = execute_line(&bridge, config, line).await {
            eprintln!("{} line {}: {}", "error".red(), number + 1, e);
        }
    }

    bridge.stop().await?;
    let status = child.wait().await?;
    let _ = printer.await;
    if !status.success() {
        bail!("runtime exited with {}", status);
    }
    Ok(())
}

async fn execute_line(bridge: &ControllerBridge, config: &GoalrtConfig, line: &str) -> Result<()> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let verb = parts.next().unwrap_or_default();
    let id = parts.next().map(str::trim).unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    if verb == "sleep" {
        let ms: u64 = id.parse().with_context(|| format!("bad duration {}", id))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        return Ok(());
    }
    if id.is_empty() {
        bail!("{} needs an agent id", verb);
    }

    match verb {
        "wait" => {
            bridge
                .session()
                .wait_for_registration(id, config.debugger.registration_timeout())
                .await?;
        }
        "run" => bridge.run(id)?,
        "pause" => bridge.pause(id)?,
        "step" => {
            let kind = if rest.eq_ignore_ascii_case("fine") {
                StepKind::Fine
            } else {
                StepKind::Coarse
            };
            bridge.step(id, kind)?;
        }
        "eval" => print_reply(id, &bridge.evaluate(id, rest).await?),
        "history" => print_reply(id, &bridge.history_state(id).await?),
        "why" => print_reply(id, &bridge.why_action(id, rest).await?),
        "whynot" => print_reply(id, &bridge.why_not_action(id, rest).await?),
        "mode" => print_reply(id, &bridge.agent_run_mode(id).to_string()),
        other => return Err(anyhow!("unknown command {}", other)),
    }
    Ok(())
}

fn print_reply(id: &str, reply: &str) {
    println!("{} {}", id.bold(), reply);
}

fn print_notification(command: &Command) {
    let name = command.name();
    let label = match command {
        Command::Launched { .. } | Command::EnvCreated { .. } => name.green(),
        Command::Killed { .. } => name.red(),
        Command::RunMode { .. } | Command::SuspendAt { .. } => name.yellow(),
        Command::Delta { .. } => name.cyan(),
        _ => name.normal(),
    };
    let line = command.to_line();
    let rest = line.strip_prefix(name).unwrap_or(&line);
    println!("{}{}", label, rest);
}
