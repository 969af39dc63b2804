//! Historical data import
//!
//! Tick and candle history stored as Parquet, loaded into the market data store

mod loader;
mod parquet;

pub use loader::{load_into, parquet_files, ImportStats};
pub use parquet::{
    candle_schema, tick_schema, CandleRecord, ParquetReader, ParquetWriter, TickRecord,
};
