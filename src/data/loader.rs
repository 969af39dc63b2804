//! Loads Parquet history into a market data store

use super::parquet::{CandleRecord, ParquetReader, TickRecord};
use crate::market::{MarketDataStore, Timeframe};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Counts from one import
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub ticks: usize,
    pub candles: usize,
    /// Rows whose symbol has no metadata
    pub skipped_rows: usize,
}

/// List the `.parquet` files under `path`, or `path` itself if it is a file
pub fn parquet_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file = entry.path();
        if file.extension().map_or(false, |ext| ext == "parquet") {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every tick and candle file under `path` into the store
///
/// The schema decides whether a file holds ticks or candles. Symbols must
/// be registered in the store beforehand; rows for anything else are
/// counted and dropped.
pub fn load_into(store: &mut MarketDataStore, path: &Path) -> anyhow::Result<ImportStats> {
    let mut stats = ImportStats::default();
    let mut ticks: BTreeMap<String, Vec<TickRecord>> = BTreeMap::new();
    let mut candles: BTreeMap<(String, Timeframe), Vec<CandleRecord>> = BTreeMap::new();

    for file in parquet_files(path)? {
        let reader = ParquetReader::new(file);
        if reader.is_candle_file()? {
            let records = reader.read_candles()?;
            tracing::info!(path = ?reader.path(), count = records.len(), "Read candle file");
            for record in records {
                candles
                    .entry((record.symbol.clone(), record.timeframe))
                    .or_default()
                    .push(record);
            }
        } else {
            let records = reader.read_ticks()?;
            tracing::info!(path = ?reader.path(), count = records.len(), "Read tick file");
            for record in records {
                ticks.entry(record.symbol.clone()).or_default().push(record);
            }
        }
        stats.files += 1;
    }

    for (symbol, records) in ticks {
        let count = records.len();
        let rows = records.into_iter().map(|r| r.tick).collect();
        match store.insert_ticks(&symbol, rows) {
            Ok(()) => stats.ticks += count,
            Err(e) => {
                tracing::warn!(symbol = %symbol, rows = count, error = %e, "Dropping ticks");
                stats.skipped_rows += count;
            }
        }
    }

    for ((symbol, timeframe), records) in candles {
        let count = records.len();
        let rows = records.into_iter().map(|r| r.candle).collect();
        match store.insert_rates(&symbol, timeframe, rows) {
            Ok(()) => stats.candles += count,
            Err(e) => {
                tracing::warn!(symbol = %symbol, %timeframe, rows = count, error = %e, "Dropping candles");
                stats.skipped_rows += count;
            }
        }
    }

    Ok(stats)
}
