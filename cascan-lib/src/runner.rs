//! Runs a selection of statistical tests over one bit field.

use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::bitfield::BitField;
use crate::progress::{NullSink, ProgressSink};
use crate::registry::{TestParams, TestRegistry};
use crate::{CancelToken, CoreError, StatTest, TestResult, DEFAULT_ALPHA};

/// The progress task name the runner reports under.
const TASK_NAME: &str = "statistical-tests";

/// Configuration of a suite run.
#[derive(Copy, Clone, Debug)]
pub struct RunnerConfig {
    /// The significance level, applied uniformly to every test.
    /// Must be in the open interval (0, 1).
    pub alpha: f64,
    /// Worker count for the tests' internal parallelism; defaults to the
    /// hardware parallelism.
    pub threads: Option<NonZeroUsize>,
    /// Per-test parameters.
    pub params: TestParams,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            threads: None,
            params: TestParams::default(),
        }
    }
}

/// Drives a selected subset of the registered tests sequentially, letting
/// each parallelize internally on the runner's pool, and aggregates the
/// results in selection order.
pub struct TestRunner {
    registry: TestRegistry,
    config: RunnerConfig,
    pool: rayon::ThreadPool,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl TestRunner {
    /// Build a runner, validating the configuration.
    pub fn new(registry: TestRegistry, config: RunnerConfig) -> Result<Self, CoreError> {
        if !(config.alpha > 0.0 && config.alpha < 1.0) {
            return Err(CoreError::Config(format!(
                "the significance level must be strictly between 0 and 1, got {}",
                config.alpha
            )));
        }

        let threads = config
            .threads
            .map(NonZeroUsize::get)
            .unwrap_or_else(num_cpus::get);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| CoreError::Config(format!("could not build the worker pool: {e}")))?;

        Ok(Self {
            registry,
            config,
            pool,
            sink: Arc::new(NullSink),
            cancel: CancelToken::new(),
        })
    }

    /// Attach a progress sink. One event is emitted per completed test.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attach a cancellation token, checked between tests.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the named tests over `data`, never mutating it, and return their
    /// results in selection order (multi-valued tests contribute several
    /// consecutive results).
    ///
    /// Unknown names fail the whole run with [CoreError::Config] before any
    /// test executes. Per-test precondition and numeric failures are
    /// reported inside the results.
    pub fn run(&self, data: &BitField, selection: &[&str]) -> Result<Vec<TestResult>, CoreError> {
        // resolve the whole selection up front
        let tests = selection
            .iter()
            .map(|&name| {
                self.registry
                    .construct(name, &self.config.params)
                    .ok_or_else(|| CoreError::Config(format!("unknown test name \"{name}\"")))
            })
            .collect::<Result<Vec<Box<dyn StatTest>>, _>>()?;

        let total = tests.len() as u64;
        let mut results = Vec::new();

        for (index, test) in tests.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled { partial: results });
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.pool
                    .install(|| test.execute(data, self.config.alpha))
            }));
            match outcome {
                Ok(mut batch) => results.append(&mut batch),
                Err(payload) => {
                    return Err(CoreError::WorkerFailed(format!(
                        "test \"{}\" panicked: {}",
                        test.name(),
                        panic_text(payload)
                    )));
                }
            }

            self.sink.update(TASK_NAME, (index + 1) as u64, total);
        }

        self.sink.complete(TASK_NAME);
        Ok(results)
    }
}

/// Best-effort extraction of a panic message.
fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "worker panicked".to_owned()
    }
}
