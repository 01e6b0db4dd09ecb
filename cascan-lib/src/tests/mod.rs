//! The statistical test implementations.
//!
//! Every test is a parameter-only value type implementing
//! [StatTest](crate::StatTest). The internal computations return
//! `Result<_, TestError>` and use checked arithmetic; the public `execute`
//! boundary converts failures into error-carrying results so a single bad
//! test never aborts a suite run.

use rayon::prelude::*;

use crate::bitfield::{read_word_at, BitField};
use crate::{TestError, TestResult};

pub mod template_matching;

/// Build the metrics map of a [TestResult].
macro_rules! metrics {
    ($($key:literal => $value:expr),* $(,)?) => {{
        let mut map = std::collections::BTreeMap::<&'static str, f64>::new();
        $(map.insert($key, $value);)*
        map
    }};
}

pub(crate) use metrics;

/// Wrap a single-result computation for the `execute` boundary.
pub(crate) fn into_results(
    name: &'static str,
    outcome: Result<TestResult, TestError>,
) -> Vec<TestResult> {
    match outcome {
        Ok(result) => vec![result],
        Err(error) => vec![TestResult::from_error(name, &error)],
    }
}

/// Wrap a multi-result computation for the `execute` boundary.
pub(crate) fn into_results_multi(
    name: &'static str,
    outcome: Result<Vec<TestResult>, TestError>,
) -> Vec<TestResult> {
    match outcome {
        Ok(results) => results,
        Err(error) => vec![TestResult::from_error(name, &error)],
    }
}

/// Read the `m`-bit pattern starting at bit `start`, wrapping past `n` to
/// the beginning. `m <= 32`.
#[inline]
pub(crate) fn window(words: &[u64], n: usize, start: usize, m: u32) -> usize {
    debug_assert!(m <= 32 && start < n);
    if start + m as usize <= n {
        (read_word_at(words, start) >> (64 - m)) as usize
    } else {
        // wrap-around read, bit by bit
        let mut value = 0_usize;
        for k in 0..m as usize {
            let i = (start + k) % n;
            let bit = (words[i / 64] >> (63 - i % 64)) & 1;
            value = (value << 1) | bit as usize;
        }
        value
    }
}

/// Population count of the `len` bits starting at `start`.
pub(crate) fn count_ones_range(data: &BitField, start: usize, len: usize) -> u64 {
    let words = data.words();
    let end = start + len;
    debug_assert!(end <= data.len());

    let first = start / 64;
    let last = (end - 1) / 64;
    if first == last {
        let word = words[first] << (start % 64);
        return (word >> (64 - len)).count_ones() as u64;
    }

    let mut ones = (words[first] << (start % 64)).count_ones() as u64;
    for &word in &words[first + 1..last] {
        ones += word.count_ones() as u64;
    }
    let tail_bits = end - last * 64;
    ones += (words[last] >> (64 - tail_bits)).count_ones() as u64;
    ones
}

/// Sum the one bits of every word in parallel. Exact thanks to the zero
/// padding behind the payload.
pub(crate) fn parallel_count_ones(data: &BitField) -> u64 {
    data.words()
        .par_iter()
        .map(|word| word.count_ones() as u64)
        .sum()
}
