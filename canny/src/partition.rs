//! Row split between the remote accelerator and the host vector unit.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Host share of a stage, in percent.
///
/// Rows `[0, split)` go to the remote agent and `[split, rows)` to the host,
/// so `100` keeps every row on the host and `0` sends every row away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Partition(u8);

impl Partition {
    pub const HOST_ONLY: Self = Self(100);
    pub const REMOTE_ONLY: Self = Self(0);
    pub const EVEN: Self = Self(50);

    pub fn new(percentage: u8) -> Result<Self, ConfigError> {
        if percentage > 100 {
            return Err(ConfigError::PercentageOutOfRange(percentage));
        }
        Ok(Self(percentage))
    }

    pub fn percentage(self) -> u8 {
        self.0
    }

    pub fn split(self, rows: usize) -> RowSplit {
        RowSplit {
            rows,
            split: compute_split(rows, self.0),
        }
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::EVEN
    }
}

impl TryFrom<u8> for Partition {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Partition> for u8 {
    fn from(value: Partition) -> Self {
        value.0
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// First host-owned row for a `rows`-high image.
///
/// Non-increasing in `percentage` and always within `[0, rows]`.
#[inline]
pub fn compute_split(rows: usize, percentage: u8) -> usize {
    assert!(percentage <= 100, "percentage must be within 0..=100");
    rows * (100 - percentage as usize) / 100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSplit {
    pub rows: usize,
    pub split: usize,
}

impl RowSplit {
    pub fn remote_rows(&self) -> Range<usize> {
        0..self.split
    }

    pub fn host_rows(&self) -> Range<usize> {
        self.split..self.rows
    }
}

impl std::fmt::Display for RowSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "remote rows {:?}, host rows {:?}",
            self.remote_rows(),
            self.host_rows()
        )
    }
}
