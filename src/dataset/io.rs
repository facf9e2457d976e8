//! Flat-file tables: users, login events and features
//!
//! All tables are comma separated with a header row. None of the fields can
//! contain a comma, so no quoting is needed.

use crate::dataset::FeatureTable;
use crate::error::{PipelineError, Result};
use crate::storage::write_atomic;
use crate::types::{FeatureRow, LoginEvent, User, FEATURE_NAMES};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

const USERS_HEADER: &str = "user_id,home_country,signup_ts";
const LOGINS_HEADER: &str = "user_id,login_time,device_id,country,ip_address,label";
const LABEL_COLUMN: &str = "label";

/// Outcome of excluding incomplete rows from a feature table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    /// Data rows read, excluding the header and blank lines
    pub total_rows: usize,
    /// Rows excluded for a missing or invalid value
    pub dropped_rows: usize,
}

impl CleaningReport {
    pub fn kept_rows(&self) -> usize {
        self.total_rows - self.dropped_rows
    }
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn write_users(path: &Path, users: &[User]) -> Result<()> {
    let mut out = String::with_capacity(64 * (users.len() + 1));
    let _ = writeln!(out, "{USERS_HEADER}");
    for user in users {
        let _ = writeln!(
            out,
            "{},{},{}",
            user.user_id(),
            user.home_country(),
            timestamp(user.signup_ts())
        );
    }
    write_atomic(path, out.as_bytes())?;
    info!(path = %path.display(), rows = users.len(), "Wrote user table");
    Ok(())
}

pub fn write_logins(path: &Path, events: &[LoginEvent]) -> Result<()> {
    let mut out = String::with_capacity(96 * (events.len() + 1));
    let _ = writeln!(out, "{LOGINS_HEADER}");
    for ev in events {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            ev.user_id(),
            timestamp(ev.login_time()),
            ev.device_id(),
            ev.country(),
            ev.ip_address(),
            ev.label()
        );
    }
    write_atomic(path, out.as_bytes())?;
    info!(path = %path.display(), rows = events.len(), "Wrote login event table");
    Ok(())
}

pub fn write_feature_table(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    let mut out = String::with_capacity(32 * (rows.len() + 1));
    let _ = writeln!(out, "{},{LABEL_COLUMN}", FEATURE_NAMES.join(","));
    for row in rows {
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            row.user_unique_devices_to_date(),
            row.secs_since_prev_login(),
            u8::from(row.is_geo_mismatch()),
            row.logins_last_24h(),
            row.label()
        );
    }
    write_atomic(path, out.as_bytes())?;
    info!(path = %path.display(), rows = rows.len(), "Wrote feature table");
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))
}

/// Data lines with their 1-based line numbers, header checked
fn data_lines<'a>(
    text: &'a str,
    expected_header: &str,
    table: &str,
) -> Result<impl Iterator<Item = (usize, &'a str)>> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header.trim() == expected_header => {}
        other => {
            return Err(PipelineError::DataIntegrity(format!(
                "{table} table header must be {expected_header:?}, got {:?}",
                other.map(|(_, h)| h).unwrap_or("")
            )))
        }
    }
    Ok(lines
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r'))))
}

fn malformed(table: &str, line: usize, detail: impl std::fmt::Display) -> PipelineError {
    PipelineError::DataIntegrity(format!("{table} table line {line}: {detail}"))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn read_users(path: &Path) -> Result<Vec<User>> {
    let text = read_text(path)?;
    let mut users = Vec::new();
    for (line, raw) in data_lines(&text, USERS_HEADER, "user")? {
        let cells: Vec<&str> = raw.split(',').collect();
        let [id, country, signup] = cells.as_slice() else {
            return Err(malformed("user", line, "expected 3 columns"));
        };
        let user_id = Uuid::parse_str(id).map_err(|e| malformed("user", line, e))?;
        let signup_ts =
            parse_timestamp(signup).ok_or_else(|| malformed("user", line, "bad signup_ts"))?;
        users.push(User::new(user_id, *country, signup_ts).map_err(|e| malformed("user", line, e))?);
    }
    Ok(users)
}

pub fn read_logins(path: &Path) -> Result<Vec<LoginEvent>> {
    let text = read_text(path)?;
    let mut events = Vec::new();
    for (line, raw) in data_lines(&text, LOGINS_HEADER, "login")? {
        let cells: Vec<&str> = raw.split(',').collect();
        let [id, time, device, country, ip, label] = cells.as_slice() else {
            return Err(malformed("login", line, "expected 6 columns"));
        };
        let user_id = Uuid::parse_str(id).map_err(|e| malformed("login", line, e))?;
        let login_time =
            parse_timestamp(time).ok_or_else(|| malformed("login", line, "bad login_time"))?;
        let ip_address: Ipv4Addr = ip.parse().map_err(|e| malformed("login", line, e))?;
        let label: u8 = label.parse().map_err(|e| malformed("login", line, e))?;
        events.push(
            LoginEvent::new(user_id, login_time, *device, *country, ip_address, label)
                .map_err(|e| malformed("login", line, e))?,
        );
    }
    Ok(events)
}

/// Read a feature table, excluding rows with missing or invalid values
pub fn read_feature_table(path: &Path) -> Result<(FeatureTable, CleaningReport)> {
    let (table, report) = parse_feature_table(&read_text(path)?)?;
    if report.dropped_rows > 0 {
        warn!(
            path = %path.display(),
            dropped = report.dropped_rows,
            total = report.total_rows,
            "Excluded feature rows with missing values"
        );
    }
    info!(
        path = %path.display(),
        rows = table.len(),
        positives = table.positives(),
        "Loaded feature table"
    );
    Ok((table, report))
}

/// Parse feature CSV text
///
/// The header must name every feature column and `label`; extra columns are
/// ignored. Rows with a blank, `NA`, `NaN`, `null` or out-of-domain cell are
/// counted as dropped rather than repaired.
pub fn parse_feature_table(text: &str) -> Result<(FeatureTable, CleaningReport)> {
    let mut lines = text.lines();
    let header: Vec<&str> = lines
        .next()
        .map(|h| h.trim_end_matches('\r').split(',').map(str::trim).collect())
        .unwrap_or_default();

    let mut positions = [0usize; 5];
    for (slot, name) in FEATURE_NAMES.iter().chain([&LABEL_COLUMN]).enumerate() {
        positions[slot] = header.iter().position(|h| h == name).ok_or_else(|| {
            PipelineError::DataIntegrity(format!("feature table is missing column {name:?}"))
        })?;
    }

    let mut report = CleaningReport::default();
    let mut rows = Vec::new();
    for raw in lines {
        let raw = raw.trim_end_matches('\r');
        if raw.trim().is_empty() {
            continue;
        }
        report.total_rows += 1;
        let cells: Vec<&str> = raw.split(',').map(str::trim).collect();
        match parse_feature_row(&cells, &positions) {
            Some(row) => rows.push(row),
            None => report.dropped_rows += 1,
        }
    }

    Ok((FeatureTable::new(rows), report))
}

fn parse_feature_row(cells: &[&str], positions: &[usize; 5]) -> Option<FeatureRow> {
    let cell = |slot: usize| cells.get(positions[slot]).copied().and_then(parse_number);

    let devices = as_count(cell(0)?)?;
    let secs = cell(1)?;
    let geo = as_flag(cell(2)?)?;
    let velocity = as_count(cell(3)?)?;
    let label = u8::from(as_flag(cell(4)?)?);

    FeatureRow::new(devices, secs, geo, velocity, label).ok()
}

fn parse_number(raw: &str) -> Option<f64> {
    match raw {
        "" | "NA" | "NaN" | "nan" | "null" | "None" => None,
        "true" | "True" => Some(1.0),
        "false" | "False" => Some(0.0),
        other => other.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn as_count(value: f64) -> Option<u32> {
    (value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64).then_some(value as u32)
}

fn as_flag(value: f64) -> Option<bool> {
    if value == 0.0 {
        Some(false)
    } else if value == 1.0 {
        Some(true)
    } else {
        None
    }
}
