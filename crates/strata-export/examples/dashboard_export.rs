//! Dashboard and training export example.
//!
//! This example demonstrates:
//! - Recording a metric snapshot every five minutes
//! - Rendering an hour of snapshots as a dashboard document
//! - Recording trap detections as flattened training samples
//!
//! Run with: cargo run --example dashboard_export

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::json;
use strata::SeriesStore;
use strata_export::{DashboardExporter, FeatureContext, TrainingEvent, TrainingExporter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Dashboard Export Example ===\n");

    let store = SeriesStore::in_memory();
    let day = NaiveDate::from_ymd_opt(2024, 1, 15).ok_or("invalid date")?;
    let start = day.and_hms_opt(12, 0, 0).ok_or("invalid time")?;
    let end = day.and_hms_opt(13, 0, 0).ok_or("invalid time")?;

    println!("Step 1: Recording snapshots\n");

    let dashboard = DashboardExporter::new(store.clone());
    for i in 0..12u32 {
        let at = day.and_hms_opt(12, i * 5, 0).ok_or("invalid time")?;
        let x = f64::from(i);
        let metrics = BTreeMap::from([
            ("trap_count".to_string(), (x / 3.0).floor()),
            ("confidence_avg".to_string(), 0.6 + (x * 0.4).sin() * 0.2),
            ("price_change_avg".to_string(), (x * 0.9).cos() * 0.3),
            ("volatility".to_string(), 1.0 + x * 0.05),
        ]);
        dashboard.record_snapshot(at, &metrics)?;
    }

    let document = dashboard.export_dashboard(start, end)?;
    for panel in &document.panels {
        println!("  {:<18} {} points", panel.metric, panel.values.len());
    }
    println!();

    println!("Step 2: Dashboard JSON\n");
    println!("{}\n", serde_json::to_string_pretty(&document.to_json())?);

    println!("Step 3: Recording training samples\n");

    let training = TrainingExporter::new(store);
    let samples = [
        ("bull_trap", 0.82, json!({"technical": {"rsi": 71.3, "macd": -12.5}, "volume": {"volume_ratio": 2.4}})),
        ("bear_trap", 0.64, json!({"technical": {"rsi": 27.9, "macd": 8.1}, "volume": {"volume_ratio": 1.7}})),
        ("bull_trap", 0.55, json!({"technical": {"rsi": "n/a"}})),
    ];
    for (i, (label, confidence, features)) in samples.into_iter().enumerate() {
        let minute = u32::try_from(i)? * 20;
        let event = TrainingEvent {
            timestamp: day.and_hms_opt(12, minute, 0).ok_or("invalid time")?,
            label: label.to_string(),
            confidence,
        };
        let context = FeatureContext {
            market_regime: "ranging".to_string(),
            features: serde_json::from_value(features)?,
        };
        match training.record_training_sample(&event, &context) {
            Ok(record) => println!("  stored {label} with {} features", record.features.len()),
            Err(e) => println!("  rejected {label}: {e}"),
        }
    }
    println!(
        "\n  {} samples exported since {day}",
        training.export_training_data(day)?.len()
    );

    Ok(())
}
