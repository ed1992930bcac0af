use std::sync::Arc;

use tabled::Tabled;
use transit::{Migrator, ResourceSummary, RunSummary};

use super::OutputFormat;
use crate::config::Config;
use crate::progress::{self, ProgressReporter};
use crate::shutdown;

/// Errors listed under the table before the rest are elided.
const MAX_LISTED_ERRORS: usize = 10;

/// One row of the run summary table.
#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Total")]
    total: usize,
    #[tabled(rename = "Created")]
    created: usize,
    #[tabled(rename = "Existing")]
    existing: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "No Image")]
    missing_assets: usize,
}

impl From<&ResourceSummary> for SummaryRow {
    fn from(summary: &ResourceSummary) -> Self {
        Self {
            resource: summary.resource.clone(),
            model: summary.model.clone(),
            total: summary.total,
            created: summary.created,
            existing: summary.existing,
            skipped: summary.skipped,
            failed: summary.failed,
            missing_assets: summary.missing_assets,
        }
    }
}

fn render_summary(summary: &RunSummary, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(summary),
        OutputFormat::Table => {
            let rows: Vec<SummaryRow> = [&summary.parents, &summary.children]
                .into_iter()
                .map(SummaryRow::from)
                .collect();
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());

            let mut out = table.to_string();
            let errors: Vec<&String> = summary
                .parents
                .errors
                .iter()
                .chain(summary.children.errors.iter())
                .collect();
            if !errors.is_empty() {
                out.push_str("\n\nIssues:\n");
                for error in errors.iter().take(MAX_LISTED_ERRORS) {
                    out.push_str(&format!("  - {}\n", error));
                }
                if errors.len() > MAX_LISTED_ERRORS {
                    out.push_str(&format!(
                        "  ... and {} more\n",
                        errors.len() - MAX_LISTED_ERRORS
                    ));
                }
            }
            out.push_str(&format!(
                "\nFinished in {:.1}s",
                summary.elapsed().num_milliseconds() as f64 / 1000.0
            ));
            Ok(out)
        }
    }
}

/// Handle the run command.
pub(crate) async fn handle_run(
    config: &Config,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let migration = config.migration_config()?;
    let settings = &migration.settings;
    tracing::info!(
        source = %migration.source.url,
        sink = %migration.sink.url,
        source_concurrency = settings.source_concurrency,
        asset_concurrency = settings.asset_concurrency,
        sink_concurrency = settings.sink_concurrency,
        write_mode = ?settings.write_mode,
        source_mode = ?settings.source_mode,
        "Starting migration"
    );

    let reporter = Arc::new(ProgressReporter::new());
    let mut migrator = Migrator::from_config(&migration, Some(progress::as_callback(&reporter)))?;

    let result = tokio::select! {
        result = migrator.run() => result,
        _ = shutdown::requested() => {
            reporter.finish();
            return Err("Migration interrupted; records already written are kept, re-run to resume".into());
        }
    };
    reporter.finish();

    let summary = result?;
    if summary.failed() > 0 {
        tracing::warn!(failed = summary.failed(), "Some records were rejected by the sink");
    }
    println!("{}", render_summary(&summary, output)?);

    Ok(())
}
