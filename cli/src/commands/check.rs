use super::load_programs;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub fn execute(file: &Path) -> Result<()> {
    let programs = load_programs(file)?;

    println!("{} {}", "✓".green(), file.display());
    for program in &programs {
        println!(
            "  {:<20} {} beliefs, {} goals, {} actions, {} specs",
            program.name.bold(),
            program.beliefs.len(),
            program.goals.len(),
            program.actions.len(),
            program.library.specs().len()
        );
    }
    Ok(())
}
