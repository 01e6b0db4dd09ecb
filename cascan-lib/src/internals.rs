//! Internal helpers shared by the test implementations - can be changed anytime

use crate::TestError;

/// Checked addition of two values of the same type, mapping an overflow to
/// [TestError::Overflow] with a message naming the operands.
macro_rules! checked_add {
    ($a:expr, $b:expr) => {{
        let (a, b) = ($a, $b);
        a.checked_add(b)
            .ok_or_else(|| crate::TestError::Overflow(format!("adding {a} and {b}")))
    }};
}

/// Checked multiplication, mapping an overflow to [TestError::Overflow].
macro_rules! checked_mul {
    ($a:expr, $b:expr) => {{
        let (a, b) = ($a, $b);
        a.checked_mul(b)
            .ok_or_else(|| crate::TestError::Overflow(format!("multiplying {a} by {b}")))
    }};
}

pub(crate) use checked_add;
pub(crate) use checked_mul;

/// Checks the f64 value for NaN and Infinite, returns an error if this is the
/// case. This function should be used as a guard.
pub(crate) fn check_f64(value: f64) -> Result<(), TestError> {
    if value.is_nan() {
        Err(TestError::NaN)
    } else if value.is_infinite() {
        Err(TestError::Infinite)
    } else {
        Ok(())
    }
}
