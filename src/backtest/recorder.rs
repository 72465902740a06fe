//! Captures per-tick state so a strategy run can be inspected after the fact.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use npyz::WriterBuilder;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::depth::MarketDepth;

/// One recorded sample: mark-to-market snapshot at the time the strategy asked to record.
#[derive(Clone, Copy, Debug, npyz::Serialize, npyz::Deserialize, npyz::AutoSerialize)]
pub struct Record {
    pub timestamp: i64,
    pub price: f64,
    pub position: f64,
    pub balance: f64,
    pub fee: f64,
    pub num_trades: i64,
    pub trading_volume: f64,
    pub trading_value: f64,
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

/// Something that can capture a sample of the running backtest state. Kept as a trait, not
/// tied to `BacktestRecorder`, so a strategy can swap in its own recorder (e.g. streaming to
/// a metrics sink) without touching the scheduler.
pub trait Recorder {
    type Error;

    fn record<MD: MarketDepth>(
        &mut self,
        timestamp: i64,
        depth: &MD,
        state: &crate::types::StateValues,
    ) -> Result<(), Self::Error>;
}

/// The bundled recorder: accumulates [`Record`] rows and dumps them to CSV or a compressed
/// NPZ archive for offline analysis.
#[derive(Default)]
pub struct BacktestRecorder {
    records: Vec<Record>,
}

impl BacktestRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, "timestamp,price,position,balance,fee,trading_volume,trading_value,num_trades")?;
        for r in &self.records {
            writeln!(
                w,
                "{},{},{},{},{},{},{},{}",
                r.timestamp, r.price, r.position, r.balance, r.fee, r.trading_volume, r.trading_value, r.num_trades
            )?;
        }
        Ok(())
    }

    pub fn to_npz(&self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("records.npy", options)?;
        let mut writer = npyz::WriteOptions::new()
            .default_dtype()
            .shape(&[self.records.len() as u64])
            .writer(&mut zip)
            .begin_nd()
            .map_err(RecorderError::Io)?;
        for r in &self.records {
            writer.push(r).map_err(RecorderError::Io)?;
        }
        writer.finish().map_err(RecorderError::Io)?;
        zip.finish()?;
        Ok(())
    }
}

impl Recorder for BacktestRecorder {
    type Error = RecorderError;

    fn record<MD: MarketDepth>(
        &mut self,
        timestamp: i64,
        depth: &MD,
        state: &crate::types::StateValues,
    ) -> Result<(), Self::Error> {
        self.records.push(Record {
            timestamp,
            price: depth.mid(),
            position: state.position,
            balance: state.balance,
            fee: state.fee,
            num_trades: state.num_trades,
            trading_volume: state.trading_volume,
            trading_value: state.trading_value,
        });
        Ok(())
    }
}
