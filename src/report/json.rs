use super::types::HistoryReport;
use anyhow::Result;
use std::path::Path;

/// Generate JSON report
pub async fn generate(report: &HistoryReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output {
        tokio::fs::write(path, json).await?;
        println!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}
