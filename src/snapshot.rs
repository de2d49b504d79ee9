// =============================================================================
// Snapshot Store — the enriched table on disk
// =============================================================================
//
// One CSV file, header row first, one row per bar ascending by close time.
// Undefined indicator values are written as empty cells and read back as NaN.
//
// Writes go to a `.tmp` sibling which is then renamed over the target, so a
// reader opening the path sees either the previous table or the new one,
// never a half-written file.
// =============================================================================

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::{EnrichedRow, EnrichedSnapshot};

/// Column order of the snapshot file.
pub const COLUMNS: [&str; 15] = [
    "Close time",
    "close",
    "RSI",
    "CMF",
    "MFI",
    "MACD",
    "MACD Signal",
    "MACD histogram",
    "OBV",
    "A/D Line",
    "Fast Stochastic",
    "Slow Stochastic",
    "EMA",
    "SMA",
    "Aroon",
];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Render a close time the way it appears in the snapshot and the API.
pub fn format_close_time(t: &DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn parse_close_time(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("invalid close time '{s}'"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

// -----------------------------------------------------------------------------
// CSV record
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Close time")]
    close_time: String,
    close: Option<f64>,
    #[serde(rename = "RSI")]
    rsi: Option<f64>,
    #[serde(rename = "CMF")]
    cmf: Option<f64>,
    #[serde(rename = "MFI")]
    mfi: Option<f64>,
    #[serde(rename = "MACD")]
    macd: Option<f64>,
    #[serde(rename = "MACD Signal")]
    macd_signal: Option<f64>,
    #[serde(rename = "MACD histogram")]
    macd_histogram: Option<f64>,
    #[serde(rename = "OBV")]
    obv: Option<f64>,
    #[serde(rename = "A/D Line")]
    ad_line: Option<f64>,
    #[serde(rename = "Fast Stochastic")]
    fast_stochastic: Option<f64>,
    #[serde(rename = "Slow Stochastic")]
    slow_stochastic: Option<f64>,
    #[serde(rename = "EMA")]
    ema: Option<f64>,
    #[serde(rename = "SMA")]
    sma: Option<f64>,
    #[serde(rename = "Aroon")]
    aroon: Option<f64>,
}

fn cell(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn value(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

impl From<&EnrichedRow> for CsvRow {
    fn from(r: &EnrichedRow) -> Self {
        Self {
            close_time: format_close_time(&r.close_time),
            close: cell(r.close),
            rsi: cell(r.rsi),
            cmf: cell(r.cmf),
            mfi: cell(r.mfi),
            macd: cell(r.macd),
            macd_signal: cell(r.macd_signal),
            macd_histogram: cell(r.macd_histogram),
            obv: cell(r.obv),
            ad_line: cell(r.ad_line),
            fast_stochastic: cell(r.fast_stochastic),
            slow_stochastic: cell(r.slow_stochastic),
            ema: cell(r.ema),
            sma: cell(r.sma),
            aroon: cell(r.aroon),
        }
    }
}

impl TryFrom<CsvRow> for EnrichedRow {
    type Error = anyhow::Error;

    fn try_from(r: CsvRow) -> Result<Self> {
        Ok(Self {
            close_time: parse_close_time(&r.close_time)?,
            close: value(r.close),
            rsi: value(r.rsi),
            cmf: value(r.cmf),
            mfi: value(r.mfi),
            macd: value(r.macd),
            macd_signal: value(r.macd_signal),
            macd_histogram: value(r.macd_histogram),
            obv: value(r.obv),
            ad_line: value(r.ad_line),
            fast_stochastic: value(r.fast_stochastic),
            slow_stochastic: value(r.slow_stochastic),
            ema: value(r.ema),
            sma: value(r.sma),
            aroon: value(r.aroon),
        })
    }
}

// -----------------------------------------------------------------------------
// SnapshotStore
// -----------------------------------------------------------------------------

/// Location of the snapshot file plus read/write helpers.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Replace the snapshot on disk with `snapshot`.
    ///
    /// The temporary file is removed again if any step fails.
    pub fn write(&self, snapshot: &EnrichedSnapshot) -> Result<()> {
        let tmp_path = self.tmp_path();

        let written = Self::write_tmp(&tmp_path, snapshot).and_then(|()| {
            std::fs::rename(&tmp_path, &self.path)
                .with_context(|| format!("failed to rename snapshot to {}", self.path.display()))
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        debug!(path = %self.path.display(), rows = snapshot.len(), "snapshot written (atomic)");
        Ok(())
    }

    fn write_tmp(tmp_path: &Path, snapshot: &EnrichedSnapshot) -> Result<()> {
        let file = File::create(tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        writer
            .write_record(COLUMNS)
            .context("failed to write snapshot header")?;
        for row in &snapshot.rows {
            writer
                .serialize(CsvRow::from(row))
                .context("failed to write snapshot row")?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| anyhow!("failed to flush snapshot: {}", e.error()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", tmp_path.display()))
    }

    /// Read the latest snapshot from disk.
    pub fn read(&self) -> Result<EnrichedSnapshot> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .with_context(|| format!("failed to open snapshot {}", self.path.display()))?;

        let mut rows = Vec::new();
        for (idx, record) in reader.deserialize::<CsvRow>().enumerate() {
            let record =
                record.with_context(|| format!("bad snapshot record at line {}", idx + 2))?;
            rows.push(EnrichedRow::try_from(record)?);
        }
        Ok(EnrichedSnapshot::new(rows))
    }
}
