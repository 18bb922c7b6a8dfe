use anyhow::Result;

use crate::config::Config;
use crate::indexer::ImpactEngine;

pub fn run_impact(
    files: Vec<String>,
    max_depth: Option<usize>,
    project: String,
    format: String,
) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let max_depth = max_depth.unwrap_or(config.query.max_depth);
    let engine = ImpactEngine::open(&project, config)?;

    let report = engine.impact_for_files(&files, max_depth)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        engine.close();
        return Ok(());
    }

    if report.changed_files.is_empty() {
        println!("No known indexed files among the inputs - run `impactgraph refresh` first?");
        engine.close();
        return Ok(());
    }

    println!("Impact of changes to: {}", report.changed_files.join(", "));
    println!(
        "  {} direct, {} transitive (max depth {})",
        report.direct_count, report.transitive_count, report.max_depth
    );

    for entry in &report.impacted {
        println!(
            "  [{}] {} (distance {}, confidence {:.3}, via {})",
            entry.impact_kind.as_str(),
            entry.file_path,
            entry.distance,
            entry.confidence,
            entry.source.as_str()
        );
    }

    if let Some(error) = &report.oracle.error {
        println!("  Oracle unavailable: {}", error);
    } else if report.oracle.enabled && !report.oracle.predicted_files.is_empty() {
        println!("  Oracle predicted: {}", report.oracle.predicted_files.join(", "));
    }

    engine.close();
    Ok(())
}
