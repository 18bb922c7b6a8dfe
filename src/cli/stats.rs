use anyhow::Result;

use crate::config::Config;
use crate::indexer::ImpactEngine;

pub fn show_stats(project: String, format: String) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let engine = ImpactEngine::open(&project, config)?;

    let counts = engine.index_stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("Index statistics for: {}", project);
        println!("  Files:        {}", counts.files);
        println!("  Symbols:      {}", counts.symbols);
        println!("  Imports:      {}", counts.imports);
        println!("  Calls:        {}", counts.calls);
        println!("  Edges:        {}", counts.edges);
        println!("  Parse errors: {}", counts.parse_errors);
    }

    engine.close();
    Ok(())
}
