#![doc = include_str!("../README.md")]

use std::collections::BTreeMap;

use thiserror::Error;

// internal usage only
pub(crate) mod internals;

// public exports
pub mod bitfield;
pub mod ca;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod special;
pub mod tests;

/// How many bits a byte has
pub(crate) const BYTE_SIZE: usize = 8;

/// The default significance level. A test passes iff its p-value is at least
/// the significance level.
pub const DEFAULT_ALPHA: f64 = 0.01;

/// The result of one statistical test (or of one sub-result of a
/// multi-valued test, e.g. the forward direction of the cumulative sums
/// test).
///
/// A result either carries a defined p-value, in which case `passed` is the
/// comparison against the significance level the test ran under, or it
/// describes why no p-value could be produced, in which case `passed` is
/// `false` and the `"error"` metric is set (1 = input precondition violated,
/// 2 = numeric failure).
#[derive(Clone, Debug)]
pub struct TestResult {
    test_name: String,
    p_value: f64,
    passed: bool,
    metrics: BTreeMap<&'static str, f64>,
}

impl TestResult {
    /// A result from a defined p-value, judged against `alpha`.
    pub(crate) fn from_p_value(
        test_name: impl Into<String>,
        p_value: f64,
        alpha: f64,
        metrics: BTreeMap<&'static str, f64>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            p_value,
            passed: p_value >= alpha,
            metrics,
        }
    }

    /// A result for a test that could not run on the given input
    /// (precondition such as a minimum length was violated).
    pub(crate) fn precondition_failure(
        test_name: impl Into<String>,
        mut metrics: BTreeMap<&'static str, f64>,
    ) -> Self {
        metrics.insert("error", 1.0);
        Self {
            test_name: test_name.into(),
            p_value: 0.0,
            passed: false,
            metrics,
        }
    }

    /// A result for a test whose computation failed numerically.
    pub(crate) fn from_error(test_name: impl Into<String>, error: &TestError) -> Self {
        let mut metrics = BTreeMap::new();
        match error {
            TestError::TooShort { need, got } => {
                metrics.insert("error", 1.0);
                metrics.insert("min_bits", *need as f64);
                metrics.insert("bits", *got as f64);
            }
            TestError::InvalidParameter(_) => {
                metrics.insert("error", 1.0);
            }
            TestError::Overflow(_)
            | TestError::NaN
            | TestError::Infinite
            | TestError::Special(_) => {
                metrics.insert("error", 2.0);
            }
        }
        Self {
            test_name: test_name.into(),
            p_value: 0.0,
            passed: false,
            metrics,
        }
    }

    /// The registry name of the test that produced this result, possibly
    /// suffixed for multi-valued tests (e.g. `"cumulative-sums.forward"`).
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// The p-value. Always in `[0, 1]`; 0 if the test could not run.
    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    /// Whether the test passed under the significance level it ran with.
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Diagnostic numbers sufficient to reconstruct the verdict: counts,
    /// chi-square statistics, the block parameters actually used, and the
    /// `"error"` marker for results without a defined p-value.
    pub fn metrics(&self) -> &BTreeMap<&'static str, f64> {
        &self.metrics
    }

    /// True if this result describes a failure to run rather than a verdict.
    pub fn is_error(&self) -> bool {
        self.metrics.contains_key("error")
    }
}

/// One statistical test. Implementations are value types: they hold their
/// parameters, never state that mutates across invocations, and are safe to
/// call from multiple threads on distinct inputs.
pub trait StatTest: Send + Sync {
    /// The stable registry name, e.g. `"frequency.monobit"`.
    fn name(&self) -> &'static str;

    /// Run the test on `data` under significance level `alpha`.
    ///
    /// Most tests return exactly one result; the serial, cumulative sums and
    /// random excursion tests return one per computed p-value, and the
    /// non-overlapping template test one per template. Failures to run are
    /// reported inside the results, never as panics.
    fn execute(&self, data: &bitfield::BitField, alpha: f64) -> Vec<TestResult>;
}

/// The internal error type of the test implementations. Converted into an
/// error-carrying [TestResult] at the public boundary.
#[derive(Error, Debug)]
pub(crate) enum TestError {
    #[error("input of {got} bits is shorter than the required {need} bits")]
    TooShort { need: usize, got: usize },
    #[error("overflow in {0}")]
    Overflow(String),
    #[error("result is not a number")]
    NaN,
    #[error("result is infinite")]
    Infinite,
    #[error(transparent)]
    Special(#[from] special::SpecialFnError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Errors that abort a run. Per-test numeric and precondition failures are
/// data inside [TestResult] and never surface here.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration: bad significance level, unknown rule or test
    /// name, zero-length input, rule/neighborhood mismatch.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A worker thread terminated abnormally. The current run is aborted.
    #[error("worker thread failed: {0}")]
    WorkerFailed(String),
    /// Cooperative cancellation was observed. Carries everything produced
    /// before the cancellation point.
    #[error("run cancelled")]
    Cancelled {
        /// Results of the tests that completed before cancellation.
        partial: Vec<TestResult>,
    },
}

/// Cooperative cancellation handle. Cloned freely; `cancel` makes every
/// holder observe the cancellation at the next check point (between CA
/// iterations, between tests).
#[derive(Clone, Debug, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}
