pub mod batch;
pub mod check;
pub mod control;
pub mod serve;

use anyhow::{bail, Result};
use goalrt_core::{AgentFile, AgentProgram};
use std::path::Path;

/// Load and compile every agent of an agent file.
pub fn load_programs(file: &Path) -> Result<Vec<AgentProgram>> {
    let origin = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());
    let agents = AgentFile::load(file)?;
    if agents.agents.is_empty() {
        bail!("{} defines no agents", file.display());
    }
    agents
        .agents
        .iter()
        .map(|a| a.compile(&origin).map_err(Into::into))
        .collect()
}
