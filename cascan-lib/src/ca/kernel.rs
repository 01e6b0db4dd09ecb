//! The per-step automaton kernel.
//!
//! Two code paths produce every cell. A per-cell reference path implements
//! the rule predicates directly on bit reads; it covers the words where the
//! toroidal wrap, the grid edges or a partial final word would complicate the
//! bulk math, and it is the baseline the vectorized paths must match
//! bit-exactly. The bulk path evaluates 64 cells per word operation by
//! assembling bit-shifted neighbor streams and applying the rule as pure
//! AND/OR/XOR algebra; it is written once against [BitLane] and instantiated
//! at every supported vector width.
//!
//! 2-D neighbor counts are computed as carry-save adder bit-planes
//! (`c0..c3`), which turns the `k`-of-neighbors predicates into a handful of
//! bitwise combinations of the planes.

use std::ops::Range;

use tinyvec::ArrayVec;

use super::lanes::BitLane;
use super::{CaNeighborhood, CaRule, CustomRule, Grid, VectorTier};
use crate::bitfield::BitField;
use crate::CoreError;

/// The rule/neighborhood combination, pre-resolved for the hot loop.
pub(crate) enum Op {
    /// 1-D truth-table rule (named rules included).
    Wolfram(u8),
    /// 2-D named rule over the live-neighbor count.
    TwoDim { rule: NamedRule, moore: bool },
    /// User predicate; per-cell, any neighborhood.
    Custom(CustomRule),
}

/// The four named rules, as used on the 2-D grids.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum NamedRule {
    R30,
    R82,
    R110,
    R150,
}

/// The compiled vector path actually used, resolved from the detector token.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Tier {
    Scalar,
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Sse2,
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Avx2,
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Avx512,
    #[cfg(target_arch = "aarch64")]
    Neon,
}

impl Tier {
    /// Map the detector token onto the nearest compiled path. Tokens without
    /// their own width (AVX, AVX-512 VNNI) share the path of the width they
    /// imply; anything foreign to the build architecture degrades to scalar.
    pub(crate) fn resolve(requested: VectorTier) -> Tier {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return match requested {
            VectorTier::Avx512Vnni | VectorTier::Avx512f => Tier::Avx512,
            VectorTier::Avx2 => Tier::Avx2,
            VectorTier::Avx | VectorTier::Sse2 => Tier::Sse2,
            _ => Tier::Scalar,
        };

        #[cfg(target_arch = "aarch64")]
        return match requested {
            VectorTier::Neon => Tier::Neon,
            _ => Tier::Scalar,
        };

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
        {
            let _ = requested;
            Tier::Scalar
        }
    }
}

/// One fully resolved automaton step: rule, geometry and vector path chosen
/// once, then applied to disjoint destination word ranges by the workers.
pub(crate) struct Kernel {
    op: Op,
    grid: Grid,
    tier: Tier,
}

impl Kernel {
    /// Resolve the rule against the neighborhood and pick the vector path.
    ///
    /// The caller vouches for `tier`: it must come from an actual CPU-feature
    /// probe, since the selected path is entered without a second check.
    pub(crate) fn new(
        rule: &CaRule,
        neighborhood: CaNeighborhood,
        grid: Grid,
        tier: VectorTier,
    ) -> Result<Self, CoreError> {
        let op = match (rule, neighborhood) {
            (CaRule::Custom(f), _) => Op::Custom(f.clone()),
            (rule, CaNeighborhood::OneDimensional) => {
                // every non-custom rule has a truth table in one dimension
                Op::Wolfram(rule.wolfram_code().expect("custom handled above"))
            }
            (CaRule::Wolfram(code), _) => {
                return Err(CoreError::Config(format!(
                    "rule code {code} is only defined for the 1d neighborhood"
                )));
            }
            (rule, neighborhood) => {
                let named = match rule {
                    CaRule::Rule30 => NamedRule::R30,
                    CaRule::Rule82 => NamedRule::R82,
                    CaRule::Rule110 => NamedRule::R110,
                    CaRule::Rule150 => NamedRule::R150,
                    CaRule::Wolfram(_) | CaRule::Custom(_) => unreachable!(),
                };
                Op::TwoDim {
                    rule: named,
                    moore: neighborhood == CaNeighborhood::Moore,
                }
            }
        };

        Ok(Self {
            op,
            grid,
            tier: Tier::resolve(tier),
        })
    }

    /// Compute the destination words `range` of the next generation into
    /// `dst` (whose index 0 is word `range.start`). Workers call this with
    /// disjoint ranges of the same destination buffer.
    pub(crate) fn step_range(&self, src: &BitField, dst: &mut [u64], range: Range<usize>) {
        debug_assert_eq!(dst.len(), range.len());
        match &self.op {
            Op::Custom(_) => {
                for w in range.clone() {
                    dst[w - range.start] = self.rebuild_word(src, w);
                }
            }
            Op::Wolfram(code) => self.step_range_1d(src, dst, range, *code),
            Op::TwoDim { rule, moore } => self.step_range_2d(src, dst, range, *rule, *moore),
        }
    }

    /// 1-D step: bulk algebra for the interior words, per-cell for the words
    /// touching the toroidal wrap or the partial tail.
    fn step_range_1d(&self, src: &BitField, dst: &mut [u64], range: Range<usize>, code: u8) {
        let n = self.grid.len_bits;
        // words whose cells all have linear neighbors: word 0 holds cell 0
        // (wrapping left), and any word at or past (n - 1) / 64 holds or
        // neighbors the wrapping right edge
        let bulk = if n >= 1 { 1..(n - 1) / 64 } else { 0..0 };

        let lo = range.start.max(bulk.start).min(range.end);
        let hi = range.end.min(bulk.end).max(lo);

        for w in range.start..lo {
            dst[w - range.start] = self.rebuild_word(src, w);
        }
        if lo < hi {
            self.dispatch_1d(src.words(), dst, range.start, lo..hi, code);
        }
        for w in hi.max(range.start)..range.end {
            dst[w - range.start] = self.rebuild_word(src, w);
        }
    }

    /// 2-D step: bulk algebra for every word whose neighbor loads stay
    /// inside the word array, per-cell for the edge margin and the tail.
    fn step_range_2d(
        &self,
        src: &BitField,
        dst: &mut [u64],
        range: Range<usize>,
        rule: NamedRule,
        moore: bool,
    ) {
        let word_count = src.word_count();
        // widest stream offset is width + 1 bits; 8 extra words keep the
        // widest vector's loads in bounds
        let margin = self.grid.width / 64 + 2;
        let bulk_start = margin;
        let bulk_end = word_count.saturating_sub(margin + 8);

        let lo = range.start.max(bulk_start).min(range.end);
        let hi = range.end.min(bulk_end).max(lo);

        for w in range.start..lo {
            dst[w - range.start] = self.rebuild_word(src, w);
        }
        if lo < hi {
            self.dispatch_2d(src.words(), dst, range.start, lo..hi, rule, moore);
        }
        for w in hi.max(range.start)..range.end {
            dst[w - range.start] = self.rebuild_word(src, w);
        }
    }

    fn dispatch_1d(&self, src: &[u64], dst: &mut [u64], base: usize, words: Range<usize>, code: u8) {
        match self.tier {
            // SAFETY: the u64 lane needs no CPU feature.
            Tier::Scalar => unsafe { drive_1d::<u64>(src, dst, base, words, code) },
            // SAFETY (all arms): the tier was resolved from the detector
            // token, so the feature is present on this CPU.
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Tier::Sse2 => unsafe { vector_drivers::drive_1d_sse2(src, dst, base, words, code) },
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Tier::Avx2 => unsafe { vector_drivers::drive_1d_avx2(src, dst, base, words, code) },
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Tier::Avx512 => unsafe { vector_drivers::drive_1d_avx512(src, dst, base, words, code) },
            #[cfg(target_arch = "aarch64")]
            Tier::Neon => unsafe { vector_drivers::drive_1d_neon(src, dst, base, words, code) },
        }
    }

    fn dispatch_2d(
        &self,
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        rule: NamedRule,
        moore: bool,
    ) {
        let grid = &self.grid;
        match self.tier {
            // SAFETY: as in dispatch_1d.
            Tier::Scalar => unsafe { drive_2d::<u64>(src, dst, base, words, rule, moore, grid) },
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Tier::Sse2 => unsafe {
                vector_drivers::drive_2d_sse2(src, dst, base, words, rule, moore, grid)
            },
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Tier::Avx2 => unsafe {
                vector_drivers::drive_2d_avx2(src, dst, base, words, rule, moore, grid)
            },
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Tier::Avx512 => unsafe {
                vector_drivers::drive_2d_avx512(src, dst, base, words, rule, moore, grid)
            },
            #[cfg(target_arch = "aarch64")]
            Tier::Neon => unsafe {
                vector_drivers::drive_2d_neon(src, dst, base, words, rule, moore, grid)
            },
        }
    }

    /// Per-cell rebuild of destination word `w`. Cells at the field length
    /// and beyond come out zero, which maintains the tail invariant.
    fn rebuild_word(&self, src: &BitField, w: usize) -> u64 {
        let n = self.grid.len_bits;
        let mut value = 0_u64;
        for j in 0..64_usize {
            let i = w * 64 + j;
            if i >= n {
                break;
            }
            if self.cell_next(src, i) {
                value |= 1 << (63 - j);
            }
        }
        value
    }

    /// The reference next-state function for a single cell.
    pub(crate) fn cell_next(&self, src: &BitField, i: usize) -> bool {
        let n = self.grid.len_bits;
        match &self.op {
            Op::Custom(f) => f(src, i),
            Op::Wolfram(code) => {
                let left = src.get(if i == 0 { n - 1 } else { i - 1 });
                let center = src.get(i);
                let right = src.get(if i + 1 == n { 0 } else { i + 1 });
                let pattern = ((left as u8) << 2) | ((center as u8) << 1) | (right as u8);
                (code >> pattern) & 1 == 1
            }
            Op::TwoDim { rule, moore } => {
                let width = self.grid.width as isize;
                let height = self.grid.height as isize;
                let (row, col) = ((i / self.grid.width) as isize, (i % self.grid.width) as isize);

                let read = |r: isize, c: isize| -> u32 {
                    if r < 0 || r >= height || c < 0 || c >= width {
                        return 0;
                    }
                    let j = (r * width + c) as usize;
                    if j >= n {
                        0
                    } else {
                        src.get(j) as u32
                    }
                };

                let mut k = read(row - 1, col)
                    + read(row + 1, col)
                    + read(row, col - 1)
                    + read(row, col + 1);
                if *moore {
                    k += read(row - 1, col - 1)
                        + read(row - 1, col + 1)
                        + read(row + 1, col - 1)
                        + read(row + 1, col + 1);
                }

                let a = src.get(i);
                match (rule, moore) {
                    (NamedRule::R30, false) => (a && k < 2) || (!a && k >= 2),
                    (NamedRule::R82, false) => (a && k < 3) || (!a && k == 2),
                    (NamedRule::R110, false) => (a && k != 4) || (!a && k >= 1),
                    (NamedRule::R30, true) => k == 3 || (a && k == 2),
                    (NamedRule::R82, true) => (!a && k == 3) || (a && (k == 2 || k == 3)),
                    (NamedRule::R110, true) => (a && k < 4) || (!a && (k == 3 || k == 6)),
                    (NamedRule::R150, _) => k % 2 == 1,
                }
            }
        }
    }
}

/// Evaluate a truth-table rule on three neighbor streams: OR together the
/// minterms of the set table entries.
#[inline(always)]
unsafe fn wolfram_word<V: BitLane>(l: V, c: V, r: V, code: u8) -> V {
    let mut out = V::zero();
    for pattern in 0..8_u8 {
        if (code >> pattern) & 1 == 0 {
            continue;
        }
        let mut term = if pattern & 0b100 != 0 { l } else { l.not() };
        term = term.and(if pattern & 0b010 != 0 { c } else { c.not() });
        term = term.and(if pattern & 0b001 != 0 { r } else { r.not() });
        out = out.or(term);
    }
    out
}

/// Bulk 1-D driver over destination words `words`. Caller guarantees every
/// word in the range has purely linear neighbors (no wrap, no tail).
#[inline(always)]
unsafe fn drive_1d<V: BitLane>(
    src: &[u64],
    dst: &mut [u64],
    base: usize,
    words: Range<usize>,
    code: u8,
) {
    let mut w = words.start;
    while w + V::WORDS <= words.end {
        let c = V::load(src, w);
        let l = V::load(src, w - 1).shl(63).or(c.shr(1));
        let r = c.shl(1).or(V::load(src, w + 1).shr(63));
        wolfram_word(l, c, r, code).store(dst, w - base);
        w += V::WORDS;
    }
    // leftover words narrower than the vector
    while w < words.end {
        let c = src[w];
        let l = (src[w - 1] << 63) | (c >> 1);
        let r = (c << 1) | (src[w + 1] >> 63);
        dst[w - base] = wolfram_word::<u64>(l, c, r, code);
        w += 1;
    }
}

/// Carry-save adder over bit streams: after up to 8 `add` calls the planes
/// `c0..c3` hold each position's live-neighbor count in binary.
struct Csa<V> {
    c0: V,
    c1: V,
    c2: V,
    c3: V,
}

impl<V: BitLane> Csa<V> {
    #[inline(always)]
    unsafe fn new() -> Self {
        Self {
            c0: V::zero(),
            c1: V::zero(),
            c2: V::zero(),
            c3: V::zero(),
        }
    }

    #[inline(always)]
    unsafe fn add(&mut self, x: V) {
        let carry0 = self.c0.and(x);
        self.c0 = self.c0.xor(x);
        let carry1 = self.c1.and(carry0);
        self.c1 = self.c1.xor(carry0);
        let carry2 = self.c2.and(carry1);
        self.c2 = self.c2.xor(carry1);
        self.c3 = self.c3.or(carry2);
    }
}

/// The named-rule predicates expressed on the count planes.
#[inline(always)]
unsafe fn rule_word_2d<V: BitLane>(a: V, k: &Csa<V>, rule: NamedRule, moore: bool) -> V {
    let (c0, c1, c2, c3) = (k.c0, k.c1, k.c2, k.c3);
    let high = c2.or(c3);
    let k_ge2 = c1.or(high);
    let k_eq2 = c1.and(c0.not()).and(high.not());
    let k_eq3 = c1.and(c0).and(high.not());

    match (rule, moore) {
        (NamedRule::R150, _) => c0,
        (NamedRule::R30, false) => a.and(k_ge2.not()).or(a.not().and(k_ge2)),
        (NamedRule::R82, false) => {
            let k_lt3 = high.not().and(c1.and(c0).not());
            a.and(k_lt3).or(a.not().and(k_eq2))
        }
        (NamedRule::R110, false) => {
            let k_eq4 = c2.and(c0.or(c1).or(c3).not());
            let k_ge1 = c0.or(c1).or(high);
            a.and(k_eq4.not()).or(a.not().and(k_ge1))
        }
        (NamedRule::R30, true) => k_eq3.or(a.and(k_eq2)),
        (NamedRule::R82, true) => a.not().and(k_eq3).or(a.and(k_eq2.or(k_eq3))),
        (NamedRule::R110, true) => {
            let k_lt4 = high.not();
            let k_eq6 = c2.and(c1).and(c0.or(c3).not());
            a.and(k_lt4).or(a.not().and(k_eq3.or(k_eq6)))
        }
    }
}

/// Neighbor stream at signed bit offset `offset` from destination word `w`.
/// Caller guarantees the two loads are in bounds.
#[inline(always)]
unsafe fn stream<V: BitLane>(src: &[u64], w: usize, offset: isize) -> V {
    let q = offset.div_euclid(64);
    let s = offset.rem_euclid(64) as u32;
    let first = (w as isize + q) as usize;
    if s == 0 {
        V::load(src, first)
    } else {
        V::load(src, first).shl(s).or(V::load(src, first + 1).shr(64 - s))
    }
}

/// Which column-edge mask a neighbor stream needs.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
enum EdgeMask {
    #[default]
    None,
    West,
    East,
}

/// The stream offsets of a 2-D neighborhood, widest first is not required -
/// the adder is order-independent.
fn neighbor_offsets(width: isize, moore: bool) -> ArrayVec<[(isize, EdgeMask); 8]> {
    let mut offsets = ArrayVec::new();
    offsets.push((-width, EdgeMask::None));
    offsets.push((width, EdgeMask::None));
    offsets.push((-1, EdgeMask::West));
    offsets.push((1, EdgeMask::East));
    if moore {
        offsets.push((-width - 1, EdgeMask::West));
        offsets.push((-width + 1, EdgeMask::East));
        offsets.push((width - 1, EdgeMask::West));
        offsets.push((width + 1, EdgeMask::East));
    }
    offsets
}

/// Bulk 2-D driver. Caller guarantees every stream load of every word in the
/// range is in bounds (the per-word edge margin).
#[inline(always)]
#[allow(clippy::too_many_arguments)]
unsafe fn drive_2d<V: BitLane>(
    src: &[u64],
    dst: &mut [u64],
    base: usize,
    words: Range<usize>,
    rule: NamedRule,
    moore: bool,
    grid: &Grid,
) {
    let offsets = neighbor_offsets(grid.width as isize, moore);
    let west = &grid.west_mask;
    let east = &grid.east_mask;

    let mut w = words.start;
    while w + V::WORDS <= words.end {
        let a = V::load(src, w);
        let mut counts = Csa::<V>::new();
        for &(offset, mask) in offsets.iter() {
            let mut neighbors = stream::<V>(src, w, offset);
            neighbors = match mask {
                EdgeMask::None => neighbors,
                EdgeMask::West => neighbors.and(V::load(west, w)),
                EdgeMask::East => neighbors.and(V::load(east, w)),
            };
            counts.add(neighbors);
        }
        rule_word_2d(a, &counts, rule, moore).store(dst, w - base);
        w += V::WORDS;
    }
    while w < words.end {
        let a = u64::load(src, w);
        let mut counts = Csa::<u64>::new();
        for &(offset, mask) in offsets.iter() {
            let mut neighbors = stream::<u64>(src, w, offset);
            neighbors = match mask {
                EdgeMask::None => neighbors,
                EdgeMask::West => neighbors & west[w],
                EdgeMask::East => neighbors & east[w],
            };
            counts.add(neighbors);
        }
        dst[w - base] = rule_word_2d(a, &counts, rule, moore);
        w += 1;
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod vector_drivers {
    //! `#[target_feature]` entry points for the x86 vector widths. Each one
    //! only instantiates the generic driver; the attribute makes the
    //! intrinsics inside compile to the advertised width.

    use std::ops::Range;

    use super::super::lanes::{W128, W256, W512};
    use super::{drive_1d, drive_2d, Grid, NamedRule};

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn drive_1d_sse2(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        code: u8,
    ) {
        drive_1d::<W128>(src, dst, base, words, code)
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn drive_1d_avx2(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        code: u8,
    ) {
        drive_1d::<W256>(src, dst, base, words, code)
    }

    #[target_feature(enable = "avx512f")]
    pub(super) unsafe fn drive_1d_avx512(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        code: u8,
    ) {
        drive_1d::<W512>(src, dst, base, words, code)
    }

    #[target_feature(enable = "sse2")]
    #[allow(clippy::too_many_arguments)]
    pub(super) unsafe fn drive_2d_sse2(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        rule: NamedRule,
        moore: bool,
        grid: &Grid,
    ) {
        drive_2d::<W128>(src, dst, base, words, rule, moore, grid)
    }

    #[target_feature(enable = "avx2")]
    #[allow(clippy::too_many_arguments)]
    pub(super) unsafe fn drive_2d_avx2(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        rule: NamedRule,
        moore: bool,
        grid: &Grid,
    ) {
        drive_2d::<W256>(src, dst, base, words, rule, moore, grid)
    }

    #[target_feature(enable = "avx512f")]
    #[allow(clippy::too_many_arguments)]
    pub(super) unsafe fn drive_2d_avx512(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        rule: NamedRule,
        moore: bool,
        grid: &Grid,
    ) {
        drive_2d::<W512>(src, dst, base, words, rule, moore, grid)
    }
}

#[cfg(target_arch = "aarch64")]
mod vector_drivers {
    //! `#[target_feature]` entry points for NEON.

    use std::ops::Range;

    use super::super::lanes::WNeon;
    use super::{drive_1d, drive_2d, Grid, NamedRule};

    #[target_feature(enable = "neon")]
    pub(super) unsafe fn drive_1d_neon(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        code: u8,
    ) {
        drive_1d::<WNeon>(src, dst, base, words, code)
    }

    #[target_feature(enable = "neon")]
    #[allow(clippy::too_many_arguments)]
    pub(super) unsafe fn drive_2d_neon(
        src: &[u64],
        dst: &mut [u64],
        base: usize,
        words: Range<usize>,
        rule: NamedRule,
        moore: bool,
        grid: &Grid,
    ) {
        drive_2d::<WNeon>(src, dst, base, words, rule, moore, grid)
    }
}
