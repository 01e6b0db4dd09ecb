//! Runtime CPU-feature detection. The core never probes the CPU itself; it
//! receives the tier token detected here through its configuration.

use cascan_lib::ca::VectorTier;

/// The widest vector tier this machine supports.
pub fn vector_tier() -> VectorTier {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx512vnni") {
            VectorTier::Avx512Vnni
        } else if is_x86_feature_detected!("avx512f") {
            VectorTier::Avx512f
        } else if is_x86_feature_detected!("avx2") {
            VectorTier::Avx2
        } else if is_x86_feature_detected!("avx") {
            VectorTier::Avx
        } else if is_x86_feature_detected!("sse2") {
            VectorTier::Sse2
        } else {
            VectorTier::Scalar
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            VectorTier::Neon
        } else {
            VectorTier::Scalar
        }
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    {
        VectorTier::Scalar
    }
}
