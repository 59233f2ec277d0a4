pub mod json;
pub mod junit;
pub mod types;

use crate::store::types::ScenarioId;
use crate::store::SharedRepository;
use anyhow::Result;
use std::path::Path;

/// Generate a history report for one scenario, or for all of them
pub async fn generate_report(
    repo: &SharedRepository,
    scenario_id: Option<ScenarioId>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let ids: Vec<ScenarioId> = match scenario_id {
        Some(id) => vec![id],
        None => repo.list_scenarios().await?.iter().map(|s| s.id).collect(),
    };
    let mut scenarios = Vec::with_capacity(ids.len());
    for id in ids {
        scenarios.push(repo.get_scenario(id).await?);
    }
    let report = types::HistoryReport::new(&scenarios);

    match format {
        "json" => json::generate(&report, output).await,
        "junit" => junit::generate(&report, output).await,
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}
