//! The special functions every p-value computation is built on: the error
//! function pair and the regularized incomplete gamma function.
//!
//! All chi-square tail probabilities go through [igamc]:
//! `P(X > t | df = k) = igamc(k / 2, t / 2)`. The error functions are derived
//! from the same core via `erfc(x) = igamc(1/2, x^2)`, so there is exactly one
//! numerical kernel to validate. The kernel uses the series expansion of the
//! lower function for `x < a + 1` and a continued fraction (evaluated with
//! Lentz's method) for `x >= a + 1`, both driven to f64 convergence.

use thiserror::Error;

/// Errors of the special function implementations.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SpecialFnError {
    /// The incomplete gamma function is only defined for `a > 0`, `x >= 0`.
    #[error("igamc is undefined for a = {a}, x = {x}")]
    OutsideDomain {
        /// The shape parameter that was passed.
        a: f64,
        /// The point that was passed.
        x: f64,
    },
    /// Neither the series nor the continued fraction converged. Does not
    /// happen for the parameter ranges the statistical tests produce.
    #[error("igamc(a = {a}, x = {x}) did not converge")]
    NoConvergence {
        /// The shape parameter that was passed.
        a: f64,
        /// The point that was passed.
        x: f64,
    },
}

/// Iteration cap for the series and the continued fraction. The fraction
/// needs on the order of `sqrt(a)` iterations; the largest shape parameter in
/// the suite is 2^14 (serial test with the maximum block length), so this cap
/// leaves a wide margin.
const MAX_ITERATIONS: usize = 20_000;

/// Convergence threshold relative to the accumulated value.
const EPSILON: f64 = f64::EPSILON;

/// Natural logarithm of the gamma function for `x > 0`, by the Lanczos
/// approximation (g = 7, 9 coefficients). Absolute error is below 1e-13 over
/// the range the tests use.
pub fn ln_gamma(x: f64) -> f64 {
    // Lanczos coefficients for g = 7
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection formula, ln(pi / sin(pi x)) - ln_gamma(1 - x)
        let sin_term = f64::sin(std::f64::consts::PI * x);
        f64::ln(std::f64::consts::PI / sin_term) - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut acc = COEFFICIENTS[0];
        for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
            acc += c / (x + i as f64);
        }
        let t = x + 7.5;
        0.5 * f64::ln(2.0 * std::f64::consts::PI) + (x + 0.5) * f64::ln(t) - t + f64::ln(acc)
    }
}

/// The upper regularized incomplete gamma function `Q(a, x)`, the tail of the
/// gamma (and thus chi-square) distribution.
///
/// `Q(a, 0) = 1` exactly; `Q(a, x) -> 0` for `x -> inf`.
pub fn igamc(a: f64, x: f64) -> Result<f64, SpecialFnError> {
    if !(a > 0.0) || !(x >= 0.0) {
        return Err(SpecialFnError::OutsideDomain { a, x });
    }
    if x == 0.0 {
        return Ok(1.0);
    }

    if x < a + 1.0 {
        // the series for the lower function converges quickly here
        lower_series(a, x).map(|p| 1.0 - p)
    } else {
        upper_continued_fraction(a, x)
    }
}

/// The lower regularized incomplete gamma function `P(a, x) = 1 - Q(a, x)`.
pub fn igam(a: f64, x: f64) -> Result<f64, SpecialFnError> {
    if !(a > 0.0) || !(x >= 0.0) {
        return Err(SpecialFnError::OutsideDomain { a, x });
    }
    if x == 0.0 {
        return Ok(0.0);
    }

    if x < a + 1.0 {
        lower_series(a, x)
    } else {
        upper_continued_fraction(a, x).map(|q| 1.0 - q)
    }
}

/// The error function. Odd; `erf(0) = 0`, `erf(x) -> 1` for `x -> inf`.
pub fn erf(x: f64) -> f64 {
    if x < 0.0 {
        -erf(-x)
    } else if x == 0.0 {
        0.0
    } else {
        // P(1/2, x^2); evaluated through the series branch for small x, so no
        // cancellation against 1 happens where erf itself is small
        match igam(0.5, x * x) {
            Ok(p) => p,
            Err(_) => f64::NAN,
        }
    }
}

/// The complementary error function `erfc(x) = 1 - erf(x)`.
///
/// Computed as `igamc(1/2, x^2)` for non-negative arguments and by the
/// reflection `erfc(-x) = 2 - erfc(x)` otherwise, so the tail keeps full
/// relative accuracy. A NaN result only appears for NaN input.
pub fn erfc(x: f64) -> f64 {
    if x < 0.0 {
        2.0 - erfc(-x)
    } else {
        match igamc(0.5, x * x) {
            Ok(q) => q,
            Err(_) => f64::NAN,
        }
    }
}

/// The standard normal cumulative distribution function.
pub fn phi(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Series expansion of `P(a, x)`, for `x < a + 1`.
fn lower_series(a: f64, x: f64) -> Result<f64, SpecialFnError> {
    let mut denominator = a;
    let mut sum = 1.0 / a;
    let mut term = sum;

    for _ in 0..MAX_ITERATIONS {
        denominator += 1.0;
        term *= x / denominator;
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            let scale = f64::exp(-x + a * f64::ln(x) - ln_gamma(a));
            return Ok(sum * scale);
        }
    }

    Err(SpecialFnError::NoConvergence { a, x })
}

/// Continued fraction for `Q(a, x)`, for `x >= a + 1`, evaluated bottom-up
/// with Lentz's method.
fn upper_continued_fraction(a: f64, x: f64) -> Result<f64, SpecialFnError> {
    // smallest representable magnitude that keeps the recurrences away from 0
    const TINY: f64 = 1e-300;

    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;

    for i in 1..=MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            let scale = f64::exp(-x + a * f64::ln(x) - ln_gamma(a));
            return Ok(scale * h);
        }
    }

    Err(SpecialFnError::NoConvergence { a, x })
}
