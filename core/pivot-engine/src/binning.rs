//! FILENAME: core/pivot-engine/src/binning.rs
//! Numeric binning - turns an observed value range into ordered bins.
//!
//! Three shapes are produced:
//! - a single bin when every value is the same (zero width)
//! - one bin per distinct value when the requested count exceeds what an
//!   integral domain can hold, or when bins would be exactly one unit wide
//! - `bin_count` equal-width bins otherwise
//!
//! Lookup uses `floor((value - min) / width)` clamped to the last bin, so the
//! maximum value lands in the final bin and a value on an inner boundary goes
//! to the bin that starts there.

use serde::{Deserialize, Serialize};

use crate::error::BinningError;

/// A numeric interval. `low == high` is a single-value bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub low: f64,
    pub high: f64,
}

impl Bin {
    pub fn new(low: f64, high: f64) -> Self {
        Bin { low, high }
    }

    pub fn is_single_value(&self) -> bool {
        self.low == self.high
    }
}

/// How the bins were laid out; decides how values are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinningMode {
    /// No values were observed.
    Empty,
    /// All values equal: one `(min, max)` bin.
    SingleValue,
    /// One `(v, v)` bin per distinct value.
    Degenerate,
    /// `bin_count` bins of equal width.
    EqualWidth,
}

/// The full bin set for one numeric group-by column, computed once per load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    pub bins: Vec<Bin>,
    pub min_value: f64,
    pub max_value: f64,
    pub width: f64,
    pub mode: BinningMode,
}

impl Binning {
    /// Bin count used when none is configured: round(sqrt(rows)), at least 1.
    pub fn default_bin_count(row_count: usize) -> usize {
        ((row_count as f64).sqrt().round() as usize).max(1)
    }

    /// Lays out bins over `values`. Non-finite values are ignored.
    pub fn compute(values: &[f64], bin_count: usize, integral: bool) -> Binning {
        let bin_count = bin_count.max(1);
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();

        if finite.is_empty() {
            return Binning {
                bins: Vec::new(),
                min_value: 0.0,
                max_value: 0.0,
                width: 0.0,
                mode: BinningMode::Empty,
            };
        }

        let min_value = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max_value = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = max_value - min_value;
        let width = span / bin_count as f64;

        if width == 0.0 {
            return Binning {
                bins: vec![Bin::new(min_value, max_value)],
                min_value,
                max_value,
                width,
                mode: BinningMode::SingleValue,
            };
        }

        if (integral && bin_count as f64 > span) || width == 1.0 {
            let mut distinct = finite;
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup();
            return Binning {
                bins: distinct.into_iter().map(|v| Bin::new(v, v)).collect(),
                min_value,
                max_value,
                width,
                mode: BinningMode::Degenerate,
            };
        }

        let bins = (0..bin_count)
            .map(|i| {
                Bin::new(
                    min_value + width * i as f64,
                    min_value + width * (i + 1) as f64,
                )
            })
            .collect();

        Binning {
            bins,
            min_value,
            max_value,
            width,
            mode: BinningMode::EqualWidth,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Index of the bin `value` belongs to.
    pub fn locate(&self, value: f64) -> Result<usize, BinningError> {
        let no_match = || BinningError::NoMatchingBin {
            value: value.to_string(),
        };

        if !value.is_finite() {
            return Err(no_match());
        }

        match self.mode {
            BinningMode::Empty => Err(no_match()),
            BinningMode::SingleValue => Ok(0),
            BinningMode::Degenerate => self
                .bins
                .binary_search_by(|bin| bin.low.total_cmp(&value))
                .map_err(|_| no_match()),
            BinningMode::EqualWidth => {
                let index = ((value - self.min_value) / self.width).floor();
                let last = self.bins.len() - 1;
                if index <= 0.0 {
                    Ok(0)
                } else {
                    Ok((index as usize).min(last))
                }
            }
        }
    }
}
