//! Remote telemetry collection for VPS Watch
//!
//! Runs one combined `top` invocation on the monitored host and turns its
//! text into a `MetricSample`:
//! - CPU user time from the `%Cpu(s)` line
//! - Memory usage from the `MiB Mem` line, as (total - free) / total
//!
//! Memory "free" is the tool's own free figure; cache and buffers are not
//! subtracted, so the percentage runs high on hosts with a large page cache.

use crate::error::{CollectError, ParseError};
use crate::execution::RemoteShell;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, warn};

pub const DIAGNOSTIC_COMMAND: &str = r"top -bn1 | grep -E 'Cpu\(s\)|MiB Mem'";

const CPU_LABEL: &str = "Cpu(s)";
const MEM_LABEL: &str = "Mem";

/// One status-cycle reading of the remote host
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub sampled_at: DateTime<Local>,
}

/// Parse `top` output holding a CPU line and a memory line
pub fn parse_diagnostics(text: &str) -> Result<MetricSample, ParseError> {
    let cpu_line = text
        .lines()
        .find(|line| line.contains(CPU_LABEL))
        .ok_or(ParseError::MissingLine("cpu"))?;
    let mem_line = text
        .lines()
        .find(|line| line.contains(MEM_LABEL) && !line.contains("Swap"))
        .ok_or(ParseError::MissingLine("memory"))?;

    let cpu_percent = parse_cpu_line(cpu_line)?;
    let memory_percent = parse_memory_line(mem_line)?;

    Ok(MetricSample {
        cpu_percent,
        memory_percent,
        sampled_at: Local::now(),
    })
}

fn parse_cpu_line(line: &str) -> Result<f64, ParseError> {
    // "%Cpu(s):  3.2 us,  1.0 sy, ..."
    let first = line.split(',').next().unwrap_or_default();
    let value = value_after_label(first).ok_or_else(|| ParseError::MissingField {
        field: "cpu user",
        line: line.to_string(),
    })?;

    let cpu = parse_number("cpu user", value, &["%", "us"])?;
    if !(0.0..=100.0).contains(&cpu) {
        return Err(ParseError::OutOfRange {
            field: "cpu user",
            value: cpu,
        });
    }
    Ok(cpu)
}

fn parse_memory_line(line: &str) -> Result<f64, ParseError> {
    // "MiB Mem :   8000.0 total,   2000.0 free,   ..."
    let mut fields = line.split(',');
    let total_field = fields
        .next()
        .and_then(value_after_label)
        .ok_or_else(|| ParseError::MissingField {
            field: "memory total",
            line: line.to_string(),
        })?;
    let free_field = fields.next().ok_or_else(|| ParseError::MissingField {
        field: "memory free",
        line: line.to_string(),
    })?;

    let total = parse_number("memory total", total_field, &["total"])?;
    let free = parse_number("memory free", free_field, &["free"])?;

    if total <= 0.0 {
        return Err(ParseError::OutOfRange {
            field: "memory total",
            value: total,
        });
    }
    if free < 0.0 || free > total {
        return Err(ParseError::OutOfRange {
            field: "memory free",
            value: free,
        });
    }

    Ok((total - free) / total * 100.0)
}

fn value_after_label(field: &str) -> Option<&str> {
    field.split_once(':').map(|(_, value)| value)
}

fn parse_number(field: &'static str, raw: &str, noise: &[&str]) -> Result<f64, ParseError> {
    let mut cleaned = raw.to_string();
    for token in noise {
        cleaned = cleaned.replace(token, "");
    }
    let cleaned = cleaned.trim();

    let value: f64 = cleaned.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: cleaned.to_string(),
    })?;
    if !value.is_finite() {
        return Err(ParseError::InvalidNumber {
            field,
            value: cleaned.to_string(),
        });
    }
    Ok(value)
}

/// Telemetry collector over any remote shell
pub struct TelemetryCollector;

impl TelemetryCollector {
    /// Collect a sample; the session is closed whatever the outcome
    pub async fn collect(shell: &dyn RemoteShell) -> Result<MetricSample, CollectError> {
        debug!("Collecting remote metrics...");

        let mut session = shell.open().await?;
        let result = session.exec(DIAGNOSTIC_COMMAND, None).await;
        session.close().await;

        let output = result?;
        if !output.stderr.trim().is_empty() {
            warn!("Diagnostic command stderr: {}", output.stderr.trim());
        }

        let sample = parse_diagnostics(&output.stdout)?;
        debug!(
            "Remote metrics: cpu={:.2}% mem={:.2}%",
            sample.cpu_percent, sample.memory_percent
        );
        Ok(sample)
    }
}
