use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::handshake::Schema;

/// One telemetry record received during a measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    /// Arrival time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Chamber configuration that produced the record.
    pub config: String,
    /// Device observation counter (the first variable).
    pub counter: f32,
    /// Remaining variables in declaration order.
    pub values: Vec<f32>,
}

impl Observation {
    /// Build an observation stamped with the current wall-clock time.
    pub fn now(config: &str, counter: f32, values: Vec<f32>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            timestamp,
            config: config.to_string(),
            counter,
            values,
        }
    }

    /// Render as one CSV row: timestamp, config, counter, values. Decoded
    /// floats are written by [`format_value`].
    pub fn csv_row(&self) -> String {
        let mut row = format!(
            "{:.6},{},{}",
            self.timestamp,
            self.config,
            format_value(self.counter)
        );
        for &value in &self.values {
            row.push(',');
            row.push_str(&format_value(value));
        }
        row
    }
}

/// Text for one decoded value in a CSV row.
///
/// The value is widened to `f64` and written as the shortest text that reads
/// back to that `f64`, so `0.1f32` appears as `0.10000000149011612`. Integral
/// values keep a `.0` suffix. Magnitudes below `1e-4` or from `1e16` up use
/// exponent form with an explicit sign and at least two digits (`1e+20`,
/// `9.5367431640625e-07`). Non-finite values are `inf`, `-inf` and `nan`.
pub fn format_value(value: f32) -> String {
    let value = f64::from(value);
    if value.is_nan() {
        return "nan".to_string();
    }

    let text = format!("{value:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// Destination for observations, fed one record at a time as they arrive.
pub trait ObservationSink {
    /// Called once when the sink is attached to a session.
    fn begin(&mut self, _schema: &Schema) -> io::Result<()> {
        Ok(())
    }

    fn accept(&mut self, observation: &Observation) -> io::Result<()>;
}

impl ObservationSink for Vec<Observation> {
    fn accept(&mut self, observation: &Observation) -> io::Result<()> {
        self.push(observation.clone());
        Ok(())
    }
}

impl<S: ObservationSink + ?Sized> ObservationSink for Box<S> {
    fn begin(&mut self, schema: &Schema) -> io::Result<()> {
        (**self).begin(schema)
    }

    fn accept(&mut self, observation: &Observation) -> io::Result<()> {
        (**self).accept(observation)
    }
}

/// Writes observations as CSV, flushing after every row.
///
/// The header (`timestamp,config,<variables...>`) is written once, when the
/// sink is attached to a session.
pub struct CsvSink<W> {
    out: W,
    header_written: bool,
    rows: u64,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
            rows: 0,
        }
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ObservationSink for CsvSink<W> {
    fn begin(&mut self, schema: &Schema) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.out, "{}", schema.csv_header())?;
            self.out.flush()?;
            self.header_written = true;
        }
        Ok(())
    }

    fn accept(&mut self, observation: &Observation) -> io::Result<()> {
        writeln!(self.out, "{}", observation.csv_row())?;
        self.out.flush()?;
        self.rows += 1;
        Ok(())
    }
}
