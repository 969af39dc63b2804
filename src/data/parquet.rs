//! Parquet tick and candle files

use crate::market::{Candle, Tick, Timeframe};
use arrow::array::{Array, ArrayRef, StringArray, TimestampMicrosecondArray, UInt32Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

fn timestamp_field() -> Field {
    Field::new(
        "timestamp",
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Tick file schema; decimals are stored as strings for precision
pub fn tick_schema() -> Schema {
    Schema::new(vec![
        timestamp_field(),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("bid", DataType::Utf8, false),
        Field::new("ask", DataType::Utf8, false),
        Field::new("last", DataType::Utf8, false),
        Field::new("volume", DataType::Utf8, false),
    ])
}

/// Candle file schema
pub fn candle_schema() -> Schema {
    Schema::new(vec![
        timestamp_field(),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("timeframe", DataType::Utf8, false),
        Field::new("open", DataType::Utf8, false),
        Field::new("high", DataType::Utf8, false),
        Field::new("low", DataType::Utf8, false),
        Field::new("close", DataType::Utf8, false),
        Field::new("tick_volume", DataType::UInt64, false),
        Field::new("spread", DataType::UInt32, false),
        Field::new("real_volume", DataType::UInt64, false),
    ])
}

/// One row of a tick file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRecord {
    pub symbol: String,
    pub tick: Tick,
}

/// One row of a candle file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle: Candle,
}

fn string_column(values: impl Iterator<Item = String>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<String>>()))
}

fn timestamp_column(values: impl Iterator<Item = DateTime<Utc>>) -> ArrayRef {
    let micros: Vec<i64> = values.map(|t| t.timestamp_micros()).collect();
    Arc::new(TimestampMicrosecondArray::from(micros).with_timezone("UTC"))
}

/// Writes market history to Parquet files
pub struct ParquetWriter {
    output_dir: PathBuf,
}

impl ParquetWriter {
    /// Create a new Parquet writer
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Path of a file named `<prefix>_<name>.parquet` in the output directory
    pub fn file_path(&self, prefix: &str, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}.parquet", prefix, name))
    }

    fn write_batch(&self, path: &Path, batch: RecordBatch) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let file = File::create(path)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Write ticks to a Parquet file
    pub fn write_ticks(&self, path: &Path, ticks: &[TickRecord]) -> anyhow::Result<()> {
        if ticks.is_empty() {
            return Ok(());
        }

        let batch = RecordBatch::try_new(
            Arc::new(tick_schema()),
            vec![
                timestamp_column(ticks.iter().map(|r| r.tick.time)),
                string_column(ticks.iter().map(|r| r.symbol.clone())),
                string_column(ticks.iter().map(|r| r.tick.bid.to_string())),
                string_column(ticks.iter().map(|r| r.tick.ask.to_string())),
                string_column(ticks.iter().map(|r| r.tick.last.to_string())),
                string_column(ticks.iter().map(|r| r.tick.volume.to_string())),
            ],
        )?;
        self.write_batch(path, batch)?;

        tracing::debug!(path = ?path, count = ticks.len(), "Wrote ticks to Parquet");
        Ok(())
    }

    /// Write candles to a Parquet file
    pub fn write_candles(&self, path: &Path, candles: &[CandleRecord]) -> anyhow::Result<()> {
        if candles.is_empty() {
            return Ok(());
        }

        let batch = RecordBatch::try_new(
            Arc::new(candle_schema()),
            vec![
                timestamp_column(candles.iter().map(|r| r.candle.time)),
                string_column(candles.iter().map(|r| r.symbol.clone())),
                string_column(candles.iter().map(|r| r.timeframe.to_string())),
                string_column(candles.iter().map(|r| r.candle.open.to_string())),
                string_column(candles.iter().map(|r| r.candle.high.to_string())),
                string_column(candles.iter().map(|r| r.candle.low.to_string())),
                string_column(candles.iter().map(|r| r.candle.close.to_string())),
                Arc::new(UInt64Array::from_iter_values(
                    candles.iter().map(|r| r.candle.tick_volume),
                )),
                Arc::new(UInt32Array::from_iter_values(
                    candles.iter().map(|r| r.candle.spread),
                )),
                Arc::new(UInt64Array::from_iter_values(
                    candles.iter().map(|r| r.candle.real_volume),
                )),
            ],
        )?;
        self.write_batch(path, batch)?;

        tracing::debug!(path = ?path, count = candles.len(), "Wrote candles to Parquet");
        Ok(())
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
}

fn decimal(array: &StringArray, i: usize) -> anyhow::Result<Decimal> {
    Ok(Decimal::from_str(array.value(i))?)
}

fn timestamp(array: &TimestampMicrosecondArray, i: usize) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(array.value(i)).ok_or_else(|| anyhow::anyhow!("Invalid timestamp"))
}

/// Reader for Parquet files
pub struct ParquetReader {
    path: PathBuf,
}

impl ParquetReader {
    /// Create a new reader for a Parquet file
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn batches(&self) -> anyhow::Result<Vec<RecordBatch>> {
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        Ok(reader.collect::<Result<Vec<_>, _>>()?)
    }

    /// Read ticks from a Parquet file
    pub fn read_ticks(&self) -> anyhow::Result<Vec<TickRecord>> {
        let mut ticks = Vec::new();

        for batch in self.batches()? {
            let timestamps = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
            let symbols = column::<StringArray>(&batch, "symbol")?;
            let bids = column::<StringArray>(&batch, "bid")?;
            let asks = column::<StringArray>(&batch, "ask")?;
            let lasts = column::<StringArray>(&batch, "last")?;
            let volumes = column::<StringArray>(&batch, "volume")?;

            for i in 0..batch.num_rows() {
                ticks.push(TickRecord {
                    symbol: symbols.value(i).to_string(),
                    tick: Tick {
                        time: timestamp(timestamps, i)?,
                        bid: decimal(bids, i)?,
                        ask: decimal(asks, i)?,
                        last: decimal(lasts, i)?,
                        volume: decimal(volumes, i)?,
                    },
                });
            }
        }

        Ok(ticks)
    }

    /// Read candles from a Parquet file
    pub fn read_candles(&self) -> anyhow::Result<Vec<CandleRecord>> {
        let mut candles = Vec::new();

        for batch in self.batches()? {
            let timestamps = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
            let symbols = column::<StringArray>(&batch, "symbol")?;
            let timeframes = column::<StringArray>(&batch, "timeframe")?;
            let opens = column::<StringArray>(&batch, "open")?;
            let highs = column::<StringArray>(&batch, "high")?;
            let lows = column::<StringArray>(&batch, "low")?;
            let closes = column::<StringArray>(&batch, "close")?;
            let tick_volumes = column::<UInt64Array>(&batch, "tick_volume")?;
            let spreads = column::<UInt32Array>(&batch, "spread")?;
            let real_volumes = column::<UInt64Array>(&batch, "real_volume")?;

            for i in 0..batch.num_rows() {
                let timeframe = Timeframe::from_str(timeframes.value(i))
                    .map_err(|e| anyhow::anyhow!(e))?;
                candles.push(CandleRecord {
                    symbol: symbols.value(i).to_string(),
                    timeframe,
                    candle: Candle {
                        time: timestamp(timestamps, i)?,
                        open: decimal(opens, i)?,
                        high: decimal(highs, i)?,
                        low: decimal(lows, i)?,
                        close: decimal(closes, i)?,
                        tick_volume: tick_volumes.value(i),
                        spread: spreads.value(i),
                        real_volume: real_volumes.value(i),
                    },
                });
            }
        }

        Ok(candles)
    }

    /// True if the file carries the candle schema
    pub fn is_candle_file(&self) -> anyhow::Result<bool> {
        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        Ok(builder.schema().field_with_name("timeframe").is_ok())
    }

    /// Get the file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
