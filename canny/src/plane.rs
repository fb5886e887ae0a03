//! Row-major image planes.

use std::ops::Range;

use crate::error::SetupError;

/// Shape of every plane in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub rows: usize,
    pub cols: usize,
}

impl Geometry {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Element range covered by `rows`.
    #[inline]
    pub fn row_span(&self, rows: Range<usize>) -> Range<usize> {
        rows.start * self.cols..rows.end * self.cols
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// `rows x cols` matrix stored row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane<T> {
    geometry: Geometry,
    data: Vec<T>,
}

impl<T: Copy + Default> Plane<T> {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            data: vec![T::default(); geometry.len()],
        }
    }

    pub fn filled(geometry: Geometry, value: T) -> Self {
        Self {
            geometry,
            data: vec![value; geometry.len()],
        }
    }
}

impl<T> Plane<T> {
    pub fn from_vec(geometry: Geometry, data: Vec<T>) -> Result<Self, SetupError> {
        if data.len() != geometry.len() {
            return Err(SetupError::PlaneSizeMismatch {
                geometry,
                actual: data.len(),
            });
        }
        Ok(Self { geometry, data })
    }

    /// Wraps data whose length is known to match `geometry`.
    pub(crate) fn from_raw(geometry: Geometry, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), geometry.len());
        Self { geometry, data }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn row(&self, r: usize) -> &[T] {
        &self.data[self.geometry.row_span(r..r + 1)]
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Copy> Plane<T> {
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> T {
        self.data[r * self.geometry.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: T) {
        self.data[r * self.geometry.cols + c] = value;
    }
}
