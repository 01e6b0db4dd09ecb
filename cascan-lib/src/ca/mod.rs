//! The cellular-automaton stage: rules, neighborhoods, grid geometry, the
//! per-step kernels and the iterating processor.

use std::fmt;
use std::sync::Arc;

use strum::{Display, EnumString};

use crate::bitfield::BitField;
use crate::CoreError;

pub(crate) mod kernel;
pub(crate) mod lanes;
pub mod processor;

/// A user-supplied next-state predicate. It receives the current buffer and
/// the cell index and computes the next state itself, so it is free to read
/// whatever neighborhood it wants. Runs on the scalar path only.
pub type CustomRule = Arc<dyn Fn(&BitField, usize) -> bool + Send + Sync>;

/// The local rule applied by each automaton step.
///
/// The named rules are the Wolfram codes 30/82/110/150 in one dimension and
/// the adapted live-neighbor predicates on the 2-D grids. [CaRule::Wolfram]
/// is an arbitrary 8-bit truth table over `(left, center, right)` and is
/// therefore only defined for the one-dimensional neighborhood.
#[derive(Clone)]
pub enum CaRule {
    /// Wolfram code 30.
    Rule30,
    /// Wolfram code 82.
    Rule82,
    /// Wolfram code 110.
    Rule110,
    /// Wolfram code 150 (the XOR of both neighbors in one dimension).
    Rule150,
    /// An arbitrary Wolfram truth table. One-dimensional only.
    Wolfram(u8),
    /// A user-supplied predicate, see [CustomRule].
    Custom(CustomRule),
}

impl CaRule {
    /// The 8-bit truth table of this rule in one dimension, if it has one.
    pub fn wolfram_code(&self) -> Option<u8> {
        match self {
            CaRule::Rule30 => Some(30),
            CaRule::Rule82 => Some(82),
            CaRule::Rule110 => Some(110),
            CaRule::Rule150 => Some(150),
            CaRule::Wolfram(code) => Some(*code),
            CaRule::Custom(_) => None,
        }
    }
}

impl fmt::Debug for CaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaRule::Rule30 => f.write_str("Rule30"),
            CaRule::Rule82 => f.write_str("Rule82"),
            CaRule::Rule110 => f.write_str("Rule110"),
            CaRule::Rule150 => f.write_str("Rule150"),
            CaRule::Wolfram(code) => write!(f, "Wolfram({code})"),
            CaRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Neighborhood topology of one automaton step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum CaNeighborhood {
    /// Linear field with toroidal wrap; 2 neighbors.
    #[strum(serialize = "1d")]
    OneDimensional,
    /// Rectangular grid, the 4 cardinal neighbors, zero-padded edges.
    #[strum(serialize = "von-neumann")]
    VonNeumann,
    /// Rectangular grid, all 8 neighbors, zero-padded edges.
    #[strum(serialize = "moore")]
    Moore,
}

/// The vectorization level reported by the CPU-feature detector.
///
/// This is an opaque token from the core's point of view: it is produced by
/// the front end (which performs the actual runtime probe) and passed through
/// configuration to select the kernel dispatch table once per run. Tokens
/// without a distinct compiled path fall back to the nearest narrower one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum VectorTier {
    /// Plain 64-bit words, always available.
    Scalar,
    /// 128-bit x86 vectors.
    Sse2,
    /// 256-bit x86 vectors, integer ops still 128-bit wide.
    Avx,
    /// 256-bit x86 vectors with integer ops.
    Avx2,
    /// 512-bit x86 vectors.
    Avx512f,
    /// 512-bit x86 vectors with VNNI extensions.
    Avx512Vnni,
    /// 128-bit ARM vectors.
    Neon,
}

/// Resolved geometry of one run: bit length plus, for 2-D neighborhoods, the
/// rectangle and the per-word column-edge masks the kernels need.
#[derive(Clone, Debug)]
pub(crate) struct Grid {
    pub(crate) len_bits: usize,
    /// Columns; 0 for the one-dimensional case.
    pub(crate) width: usize,
    /// Rows; 0 for the one-dimensional case.
    pub(crate) height: usize,
    /// Per payload word: bit set where the cell's column is not 0, i.e.
    /// where a west neighbor exists. Empty in the one-dimensional case.
    pub(crate) west_mask: Box<[u64]>,
    /// Per payload word: bit set where the cell's column is not `width - 1`.
    pub(crate) east_mask: Box<[u64]>,
}

impl Grid {
    pub(crate) fn one_dimensional(len_bits: usize) -> Self {
        Self {
            len_bits,
            width: 0,
            height: 0,
            west_mask: Box::default(),
            east_mask: Box::default(),
        }
    }

    /// Lay `len_bits` cells out as a `width x height` rectangle.
    /// `width == 0` selects `floor(sqrt(len_bits))`; `height` is always
    /// `ceil(len_bits / width)`, so `width * height >= len_bits` holds and
    /// the cells past the end are dead padding.
    pub(crate) fn two_dimensional(len_bits: usize, width: usize) -> Result<Self, CoreError> {
        let width = if width == 0 { isqrt(len_bits) } else { width };
        if width == 0 {
            return Err(CoreError::Config(
                "the grid width must be positive".to_owned(),
            ));
        }

        let height = len_bits.div_ceil(width);
        let word_count = len_bits.div_ceil(64);

        // The column-edge masks start all-set; each row start clears its bit
        // in the west mask, each row end its bit in the east mask.
        let mut west_mask = vec![u64::MAX; word_count].into_boxed_slice();
        let mut east_mask = vec![u64::MAX; word_count].into_boxed_slice();
        for row in 0..height {
            let start = row * width;
            west_mask[start / 64] &= !(1_u64 << (63 - start % 64));

            let end = start + width - 1;
            if end / 64 < word_count {
                east_mask[end / 64] &= !(1_u64 << (63 - end % 64));
            }
        }

        Ok(Self {
            len_bits,
            width,
            height,
            west_mask,
            east_mask,
        })
    }
}

/// Integer square root, rounded down.
fn isqrt(value: usize) -> usize {
    if value == 0 {
        return 0;
    }
    let mut root = (value as f64).sqrt() as usize;
    while root.checked_mul(root).is_none_or(|sq| sq > value) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|sq| sq <= value) {
        root += 1;
    }
    root
}
