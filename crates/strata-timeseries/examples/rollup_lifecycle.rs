//! Rollup and retention lifecycle example.
//!
//! This example demonstrates the full lifecycle of a price series:
//! - Appending minute ticks for a trading day
//! - Rolling minutes up into hourly and daily aggregates
//! - Sweeping series that have outlived their retention period
//!
//! Run with: cargo run --example rollup_lifecycle

use chrono::{Days, NaiveDate};
use strata::{Granularity, RawRecord, SeriesKey, SeriesRecord, SeriesStore};
use strata_timeseries::{RetentionSweeper, RollupEngine};
use tempfile::tempdir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Rollup & Retention Lifecycle Example ===\n");

    let dir = tempdir()?;
    let store = SeriesStore::open(dir.path().join("lifecycle.strata"))?;
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).ok_or("invalid date")?;
    let minute_key = SeriesKey::new("btc_price", date, Granularity::Minute)?;

    println!("Step 1: Appending minute ticks\n");

    let mut price = 85_000.0;
    for i in 0..(6 * 60) {
        let hour = 9 + i / 60;
        let minute = i % 60;
        let timestamp = date.and_hms_opt(hour, minute, 0).ok_or("invalid time")?;

        let change_pct = (f64::from(i) * 0.7).sin() * 0.05;
        price *= 1.0 + change_pct / 100.0;

        let tick = RawRecord::new(timestamp, price)
            .with_change_pct(change_pct)
            .with_field("regime", if change_pct > 0.0 { "up" } else { "down" });
        store.append(&minute_key, &tick.into())?;
    }
    println!("Appended {} ticks to {minute_key}\n", store.len(&minute_key)?);

    println!("Step 2: Rolling up\n");

    let engine = RollupEngine::new(store.clone());
    for report in engine.compress_chain("btc_price", date)? {
        println!(
            "  {} -> {}: {} records into {} buckets",
            report.source, report.target, report.source_records, report.buckets_written
        );
    }

    for record in store.read_all(&minute_key.with_granularity(Granularity::Hourly))? {
        if let SeriesRecord::Compressed(bar) = record {
            println!(
                "  {}  open {:>10.2}  high {:>10.2}  low {:>10.2}  close {:>10.2}  n={}",
                bar.timestamp,
                bar.price_open,
                bar.price_max,
                bar.price_min,
                bar.price_close,
                bar.data_points
            );
        }
    }
    println!();

    println!("Step 3: Sweeping 8 days later\n");

    let as_of = date.checked_add_days(Days::new(8)).ok_or("invalid date")?;
    let report = RetentionSweeper::new(store.clone()).cleanup("btc_price", as_of)?;
    for key in &report.deleted {
        println!("  deleted {key}");
    }
    println!("  retained {} series", report.retained);

    Ok(())
}
