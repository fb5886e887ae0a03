//! Row-parallel iteration over a horizontal band of an image.
//!
//! The band is a row-major slice holding whole rows that starts at some
//! absolute image row. Chunks are row-aligned and every chunk is tagged with
//! the absolute index of its first row, so kernels that need neighbouring
//! rows can address the full-size input directly.

use rayon::prelude::*;


/// Multiplier for number of chunks relative to CPU threads.
/// 3x threads keeps the pool busy when some chunks finish faster.
const CHUNKS_PER_THREAD: usize = 3;

#[inline]
fn auto_chunk_rows(height: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (height / num_chunks).max(1)
}

#[inline]
fn check_band<T>(band: &[T], width: usize) {
    assert!(width > 0, "width must be > 0");
    assert_eq!(band.len() % width, 0, "band must hold whole rows");
}

/// Splits `band` into row-aligned parallel chunks.
///
/// Yields `(absolute_start_row, chunk)` pairs, where the band itself starts at
/// image row `first_row`.
pub fn par_rows_mut<T: Send>(
    band: &mut [T],
    width: usize,
    first_row: usize,
) -> impl IndexedParallelIterator<Item = (usize, &mut [T])> + '_ {
    check_band(band, width);
    let chunk_rows = auto_chunk_rows(band.len() / width);
    band.par_chunks_mut(width * chunk_rows)
        .enumerate()
        .map(move |(idx, chunk)| (first_row + idx * chunk_rows, chunk))
}

/// Like [`par_rows_mut`] over two bands of identical shape that are written
/// together (e.g. the x and y gradient of the same rows).
pub fn par_rows2_mut<'a, A: Send, B: Send>(
    a: &'a mut [A],
    b: &'a mut [B],
    width: usize,
    first_row: usize,
) -> impl IndexedParallelIterator<Item = (usize, (&'a mut [A], &'a mut [B]))> + 'a {
    assert_eq!(a.len(), b.len(), "Zipped bands must have equal length");
    check_band(a, width);
    let chunk_rows = auto_chunk_rows(a.len() / width);
    let chunk_size = width * chunk_rows;
    a.par_chunks_mut(chunk_size)
        .zip(b.par_chunks_mut(chunk_size))
        .enumerate()
        .map(move |(idx, pair)| (first_row + idx * chunk_rows, pair))
}
