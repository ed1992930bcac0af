use tabled::Tabled;
use transit::Migrator;
use transit::migrate::Preflight;

use super::OutputFormat;
use crate::config::Config;

#[derive(Debug, Clone, Tabled)]
struct CountRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Count")]
    count: String,
    #[tabled(rename = "Status")]
    status: String,
}

fn render_preflight(report: &Preflight, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report),
        OutputFormat::Table => {
            let rows: Vec<CountRow> = report
                .counts
                .iter()
                .map(|c| CountRow {
                    resource: c.resource.clone(),
                    count: c.count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                    status: c.error.clone().unwrap_or_else(|| "ok".to_string()),
                })
                .collect();
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            Ok(format!("Authenticated as uid {}\n{}", report.uid, table))
        }
    }
}

/// Handle the check command: log in and count, without writing.
pub(crate) async fn handle_check(
    config: &Config,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let migration = config.migration_config()?;
    let migrator = Migrator::from_config(&migration, None)?;

    let report = migrator.preflight().await?;
    for count in report.counts.iter().filter(|c| c.error.is_some()) {
        tracing::warn!(resource = %count.resource, "Source count unavailable");
    }
    println!("{}", render_preflight(&report, output)?);

    Ok(())
}
