use anyhow::{bail, Result};
use readings_service::{config::AppConfig, observability, SpaceStore};
use rental_meters::{
    aggregation::{PeriodFilter, YearMonth},
    ReadingService,
};
use std::env;

/// Prints the combined electricity and water statement of one billable unit
/// as JSON lines, most recent month first.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: monthly_report <space_id> [room_id] [YYYY-MM]");
    }
    let space_id = &args[1];
    let mut room_id: Option<&str> = None;
    let mut filter = PeriodFilter::default();
    for arg in &args[2..] {
        match arg.parse::<YearMonth>() {
            Ok(ym) => {
                filter = PeriodFilter {
                    year: Some(ym.year),
                    month: Some(ym.month),
                }
            }
            Err(_) => room_id = Some(arg.as_str()),
        }
    }

    let cfg = AppConfig::load()?;
    let store = SpaceStore::connect(&cfg.store).await?;
    let service = ReadingService::new(store, cfg.recording.retry_policy());

    let months = service.monthly_statement(space_id, room_id, &filter).await?;
    for month in &months {
        println!("{}", serde_json::to_string(month)?);
    }

    tracing::info!(
        space_id = %space_id,
        room_id = room_id.unwrap_or("-"),
        months = months.len(),
        "monthly statement printed"
    );
    Ok(())
}
