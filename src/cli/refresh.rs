use anyhow::Result;

use crate::config::Config;
use crate::indexer::ImpactEngine;

pub fn run_refresh(project: String, format: String) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let engine = ImpactEngine::open(&project, config)?;

    let stats = engine.refresh_index()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Refreshed index for: {}", project);
        println!("  Files scanned:  {}", stats.files_scanned);
        println!("  Files indexed:  {}", stats.files_indexed);
        println!("  Files skipped:  {}", stats.files_skipped);
        println!("  Files deleted:  {}", stats.files_deleted);
        println!("  Parse errors:   {}", stats.parse_errors);
        println!("  Total symbols:  {}", stats.symbols_total);
        println!("  Total edges:    {}", stats.edges_total);
        println!("  Elapsed:        {}ms", stats.elapsed_ms);
    }

    engine.close();
    Ok(())
}
