use anyhow::{bail, Result};
use futures::StreamExt;
use readings_service::{config::AppConfig, import::ReadingsCsvFileSource, observability, SpaceStore};
use rental_meters::{ReadingError, ReadingService};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: import_readings <csv_file_path>");
    }
    let file_path = &args[1];

    // Point READINGS_CONFIG at the deployment whose store should receive the rows.
    let cfg = AppConfig::load()?;
    let store = SpaceStore::connect(&cfg.store).await?;
    let service = ReadingService::new(store, cfg.recording.retry_policy());

    let mut rows = ReadingsCsvFileSource::new(file_path).stream();
    let (mut recorded, mut rejected) = (0u64, 0u64);

    // Rows go through the same validation as live submissions, in file order.
    while let Some(item) = rows.next().await {
        let row = match item {
            Ok(row) => row,
            Err(e) if e.is_row_error() => {
                tracing::warn!(error = %e, "skipping unparseable row");
                rejected += 1;
                continue;
            }
            Err(e) => bail!(e),
        };

        match service.record_reading(&row.target, row.reading).await {
            Ok(_) => recorded += 1,
            Err(e @ (ReadingError::Validation(_) | ReadingError::NotFound(_))) => {
                tracing::warn!(line = row.line, series = %row.target, error = %e, "row rejected");
                rejected += 1;
            }
            Err(e) => bail!("line {}: {e}", row.line),
        }
    }

    tracing::info!(recorded, rejected, file = %file_path, "import finished");
    Ok(())
}
