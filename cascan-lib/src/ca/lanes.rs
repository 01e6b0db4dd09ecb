//! Vector-width abstraction for the automaton kernels.
//!
//! The bulk kernel is written once against [BitLane] and instantiated per
//! width. Every operation is a plain bitwise op on packed 64-bit words, so
//! each instantiation computes exactly the same bits; only the number of
//! words per operation changes. Shift counts are per-64-bit-lane and always
//! in `1..=63` (the callers special-case 0).
//!
//! All methods are `unsafe`: the SIMD implementations may only run on a CPU
//! that actually has the feature, which is guaranteed by the caller holding a
//! `#[target_feature]` context selected through the runtime dispatch table.

/// One vector of `WORDS` packed 64-bit words.
pub(crate) trait BitLane: Copy {
    /// Words per vector.
    const WORDS: usize;

    /// Load `WORDS` words starting at `words[idx]` (no alignment required).
    ///
    /// # Safety
    /// `idx + WORDS <= words.len()`, and the CPU must support the lane type.
    unsafe fn load(words: &[u64], idx: usize) -> Self;

    /// Store `WORDS` words starting at `words[idx]`.
    ///
    /// # Safety
    /// As for [BitLane::load].
    unsafe fn store(self, words: &mut [u64], idx: usize);

    /// The all-zero vector.
    ///
    /// # Safety
    /// The CPU must support the lane type.
    unsafe fn zero() -> Self;

    /// Bitwise AND.
    ///
    /// # Safety
    /// The CPU must support the lane type.
    unsafe fn and(self, other: Self) -> Self;

    /// Bitwise OR.
    ///
    /// # Safety
    /// The CPU must support the lane type.
    unsafe fn or(self, other: Self) -> Self;

    /// Bitwise XOR.
    ///
    /// # Safety
    /// The CPU must support the lane type.
    unsafe fn xor(self, other: Self) -> Self;

    /// Bitwise NOT.
    ///
    /// # Safety
    /// The CPU must support the lane type.
    unsafe fn not(self) -> Self;

    /// Shift every 64-bit word left by `n`, `1 <= n <= 63`.
    ///
    /// # Safety
    /// The CPU must support the lane type.
    unsafe fn shl(self, n: u32) -> Self;

    /// Shift every 64-bit word right by `n`, `1 <= n <= 63`.
    ///
    /// # Safety
    /// The CPU must support the lane type.
    unsafe fn shr(self, n: u32) -> Self;
}

impl BitLane for u64 {
    const WORDS: usize = 1;

    #[inline(always)]
    unsafe fn load(words: &[u64], idx: usize) -> Self {
        words[idx]
    }

    #[inline(always)]
    unsafe fn store(self, words: &mut [u64], idx: usize) {
        words[idx] = self;
    }

    #[inline(always)]
    unsafe fn zero() -> Self {
        0
    }

    #[inline(always)]
    unsafe fn and(self, other: Self) -> Self {
        self & other
    }

    #[inline(always)]
    unsafe fn or(self, other: Self) -> Self {
        self | other
    }

    #[inline(always)]
    unsafe fn xor(self, other: Self) -> Self {
        self ^ other
    }

    #[inline(always)]
    unsafe fn not(self) -> Self {
        !self
    }

    #[inline(always)]
    unsafe fn shl(self, n: u32) -> Self {
        self << n
    }

    #[inline(always)]
    unsafe fn shr(self, n: u32) -> Self {
        self >> n
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub(crate) use x86::{W128, W256, W512};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    use super::BitLane;

    /// 128-bit lane (SSE2).
    #[derive(Copy, Clone)]
    pub(crate) struct W128(__m128i);

    impl BitLane for W128 {
        const WORDS: usize = 2;

        #[inline(always)]
        unsafe fn load(words: &[u64], idx: usize) -> Self {
            debug_assert!(idx + Self::WORDS <= words.len());
            Self(_mm_loadu_si128(words.as_ptr().add(idx).cast()))
        }

        #[inline(always)]
        unsafe fn store(self, words: &mut [u64], idx: usize) {
            debug_assert!(idx + Self::WORDS <= words.len());
            _mm_storeu_si128(words.as_mut_ptr().add(idx).cast(), self.0);
        }

        #[inline(always)]
        unsafe fn zero() -> Self {
            Self(_mm_setzero_si128())
        }

        #[inline(always)]
        unsafe fn and(self, other: Self) -> Self {
            Self(_mm_and_si128(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn or(self, other: Self) -> Self {
            Self(_mm_or_si128(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn xor(self, other: Self) -> Self {
            Self(_mm_xor_si128(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn not(self) -> Self {
            Self(_mm_xor_si128(self.0, _mm_set1_epi64x(-1)))
        }

        #[inline(always)]
        unsafe fn shl(self, n: u32) -> Self {
            Self(_mm_sll_epi64(self.0, _mm_cvtsi32_si128(n as i32)))
        }

        #[inline(always)]
        unsafe fn shr(self, n: u32) -> Self {
            Self(_mm_srl_epi64(self.0, _mm_cvtsi32_si128(n as i32)))
        }
    }

    /// 256-bit lane (AVX2).
    #[derive(Copy, Clone)]
    pub(crate) struct W256(__m256i);

    impl BitLane for W256 {
        const WORDS: usize = 4;

        #[inline(always)]
        unsafe fn load(words: &[u64], idx: usize) -> Self {
            debug_assert!(idx + Self::WORDS <= words.len());
            Self(_mm256_loadu_si256(words.as_ptr().add(idx).cast()))
        }

        #[inline(always)]
        unsafe fn store(self, words: &mut [u64], idx: usize) {
            debug_assert!(idx + Self::WORDS <= words.len());
            _mm256_storeu_si256(words.as_mut_ptr().add(idx).cast(), self.0);
        }

        #[inline(always)]
        unsafe fn zero() -> Self {
            Self(_mm256_setzero_si256())
        }

        #[inline(always)]
        unsafe fn and(self, other: Self) -> Self {
            Self(_mm256_and_si256(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn or(self, other: Self) -> Self {
            Self(_mm256_or_si256(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn xor(self, other: Self) -> Self {
            Self(_mm256_xor_si256(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn not(self) -> Self {
            Self(_mm256_xor_si256(self.0, _mm256_set1_epi64x(-1)))
        }

        #[inline(always)]
        unsafe fn shl(self, n: u32) -> Self {
            Self(_mm256_sll_epi64(self.0, _mm_cvtsi32_si128(n as i32)))
        }

        #[inline(always)]
        unsafe fn shr(self, n: u32) -> Self {
            Self(_mm256_srl_epi64(self.0, _mm_cvtsi32_si128(n as i32)))
        }
    }

    /// 512-bit lane (AVX-512F).
    #[derive(Copy, Clone)]
    pub(crate) struct W512(__m512i);

    impl BitLane for W512 {
        const WORDS: usize = 8;

        #[inline(always)]
        unsafe fn load(words: &[u64], idx: usize) -> Self {
            debug_assert!(idx + Self::WORDS <= words.len());
            Self(_mm512_loadu_epi64(words.as_ptr().add(idx).cast()))
        }

        #[inline(always)]
        unsafe fn store(self, words: &mut [u64], idx: usize) {
            debug_assert!(idx + Self::WORDS <= words.len());
            _mm512_storeu_epi64(words.as_mut_ptr().add(idx).cast(), self.0);
        }

        #[inline(always)]
        unsafe fn zero() -> Self {
            Self(_mm512_setzero_si512())
        }

        #[inline(always)]
        unsafe fn and(self, other: Self) -> Self {
            Self(_mm512_and_epi64(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn or(self, other: Self) -> Self {
            Self(_mm512_or_epi64(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn xor(self, other: Self) -> Self {
            Self(_mm512_xor_epi64(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn not(self) -> Self {
            Self(_mm512_xor_epi64(self.0, _mm512_set1_epi64(-1)))
        }

        #[inline(always)]
        unsafe fn shl(self, n: u32) -> Self {
            Self(_mm512_sll_epi64(self.0, _mm_cvtsi32_si128(n as i32)))
        }

        #[inline(always)]
        unsafe fn shr(self, n: u32) -> Self {
            Self(_mm512_srl_epi64(self.0, _mm_cvtsi32_si128(n as i32)))
        }
    }
}

#[cfg(target_arch = "aarch64")]
pub(crate) use aarch64::WNeon;

#[cfg(target_arch = "aarch64")]
mod aarch64 {
    use std::arch::aarch64::*;

    use super::BitLane;

    /// 128-bit lane (NEON).
    #[derive(Copy, Clone)]
    pub(crate) struct WNeon(uint64x2_t);

    impl BitLane for WNeon {
        const WORDS: usize = 2;

        #[inline(always)]
        unsafe fn load(words: &[u64], idx: usize) -> Self {
            debug_assert!(idx + Self::WORDS <= words.len());
            Self(vld1q_u64(words.as_ptr().add(idx)))
        }

        #[inline(always)]
        unsafe fn store(self, words: &mut [u64], idx: usize) {
            debug_assert!(idx + Self::WORDS <= words.len());
            vst1q_u64(words.as_mut_ptr().add(idx), self.0);
        }

        #[inline(always)]
        unsafe fn zero() -> Self {
            Self(vdupq_n_u64(0))
        }

        #[inline(always)]
        unsafe fn and(self, other: Self) -> Self {
            Self(vandq_u64(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn or(self, other: Self) -> Self {
            Self(vorrq_u64(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn xor(self, other: Self) -> Self {
            Self(veorq_u64(self.0, other.0))
        }

        #[inline(always)]
        unsafe fn not(self) -> Self {
            Self(veorq_u64(self.0, vdupq_n_u64(u64::MAX)))
        }

        #[inline(always)]
        unsafe fn shl(self, n: u32) -> Self {
            Self(vshlq_u64(self.0, vdupq_n_s64(n as i64)))
        }

        #[inline(always)]
        unsafe fn shr(self, n: u32) -> Self {
            Self(vshlq_u64(self.0, vdupq_n_s64(-(n as i64))))
        }
    }
}
