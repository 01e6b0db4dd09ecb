//! Template matching tests and the machinery they share: the aperiodic
//! template set and the windowed match counter.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use crate::bitfield::read_word_at;
use crate::internals::checked_add;
use crate::TestError;

pub mod non_overlapping;

/// The template length both tests default to.
pub const DEFAULT_TEMPLATE_LENGTH: u32 = 9;

/// The set of aperiodic templates of length `m`, in ascending code order.
///
/// A template is aperiodic if it cannot overlap a shifted copy of itself:
/// for every shift `1 <= k < m` it disagrees with itself somewhere on the
/// overlap. These are exactly the patterns whose occurrences are
/// approximately independent, which the non-overlapping test's reference
/// distribution assumes. The sets are generated once per length and cached
/// (148 templates for the default length 9).
pub(crate) fn aperiodic_templates(m: u32) -> Arc<Vec<u32>> {
    static CACHE: LazyLock<Mutex<HashMap<u32, Arc<Vec<u32>>>>> =
        LazyLock::new(|| Mutex::new(HashMap::new()));

    let mut cache = CACHE.lock().expect("template cache poisoned");
    cache
        .entry(m)
        .or_insert_with(|| {
            Arc::new((0..1_u32 << m).filter(|&code| is_aperiodic(code, m)).collect())
        })
        .clone()
}

/// Whether the pattern can never overlap a shifted copy of itself.
fn is_aperiodic(code: u32, m: u32) -> bool {
    let bit = |j: u32| (code >> (m - 1 - j)) & 1;
    (1..m).all(|shift| (0..m - shift).any(|j| bit(j) != bit(j + shift)))
}

/// Count occurrences of the `m`-bit `template` in the `block_len` bits
/// starting at `block_start`. A hit advances the window by `advance` bits
/// (the template length for non-overlapping counting, 1 for overlapping), a
/// miss always by 1.
pub(crate) fn count_matches(
    words: &[u64],
    block_start: usize,
    block_len: usize,
    template: u32,
    m: u32,
    advance: usize,
) -> Result<usize, TestError> {
    let mut count = 0_usize;
    let mut offset = 0_usize;
    while offset + m as usize <= block_len {
        let window = (read_word_at(words, block_start + offset) >> (64 - m)) as u32;
        if window == template {
            count = checked_add!(count, 1)?;
            offset += advance;
        } else {
            offset += 1;
        }
    }
    Ok(count)
}
