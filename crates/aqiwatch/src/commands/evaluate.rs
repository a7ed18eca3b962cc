//! `aqiwatch evaluate`: replay recorded readings through the alert engine.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};

use aqiwatch_core::{AlertEngine, Notification, Reading};

use crate::cli::{EvaluateArgs, GlobalOpts};
use crate::commands;
use crate::error::CliError;
use crate::output;

fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    match path {
        Some(p) if p != Path::new("-") => Ok(std::fs::read_to_string(p)?),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Run `readings` in order and collect every notification emitted.
pub fn replay(engine: &mut AlertEngine, readings: &[Reading]) -> Vec<Notification> {
    let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
    let mut emitted = Vec::new();

    for reading in readings {
        let last = latest
            .entry(reading.subject_id.as_str())
            .or_insert(reading.observed_at);
        if reading.observed_at < *last {
            tracing::warn!(
                subject = %reading.subject_id,
                observed_at = %reading.observed_at,
                "reading is older than an earlier one for the same subject"
            );
        } else {
            *last = reading.observed_at;
        }

        if let Some(notification) = engine.evaluate(reading) {
            emitted.push(notification);
        }
    }
    emitted
}

pub fn handle(args: EvaluateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = commands::resolve_config(global)?;
    if let Some(minutes) = args.cooldown_minutes {
        cfg.alerts.cooldown_minutes = minutes;
    }
    if let Some(delta) = args.min_delta {
        cfg.alerts.min_delta = delta;
    }
    let rule = aqiwatch_config::alert_rule(&cfg)?;

    let raw = read_input(args.input.as_deref())?;
    let readings: Vec<Reading> = serde_json::from_str(&raw)?;
    tracing::info!(count = readings.len(), "evaluating readings");

    let mut engine = AlertEngine::new(rule);
    let notifications = replay(&mut engine, &readings);

    let rendered = output::render_list(
        global.output,
        &notifications,
        output::notification_row,
        |n| n.id.clone(),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}
