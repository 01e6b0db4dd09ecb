//! The double-buffered, multi-threaded automaton driver.

use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rayon::prelude::*;

use super::kernel::Kernel;
use super::{CaNeighborhood, CaRule, Grid, VectorTier};
use crate::bitfield::BitField;
use crate::progress::{NullSink, ProgressSink};
use crate::{CancelToken, CoreError};

/// The progress task name the processor reports under.
const TASK_NAME: &str = "ca-transform";

/// Configuration of one automaton run.
#[derive(Clone, Debug)]
pub struct CaConfig {
    /// The local rule.
    pub rule: CaRule,
    /// The neighborhood topology.
    pub neighborhood: CaNeighborhood,
    /// How many steps to apply. 0 is valid and leaves the input unchanged.
    pub iterations: u32,
    /// Grid width for the 2-D neighborhoods; 0 picks `floor(sqrt(n))`.
    /// Ignored in one dimension.
    pub width: u32,
    /// Worker count; defaults to the hardware parallelism.
    pub threads: Option<NonZeroUsize>,
    /// The vectorization token from the CPU-feature detector. The processor
    /// trusts it - it must describe the machine it runs on.
    pub tier: VectorTier,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            rule: CaRule::Rule30,
            neighborhood: CaNeighborhood::OneDimensional,
            iterations: 1,
            width: 0,
            threads: None,
            tier: VectorTier::Scalar,
        }
    }
}

/// Applies a rule to a bit field for a configured number of generations.
///
/// The processor owns both generation buffers and a worker pool sized from
/// its configuration. Each iteration partitions the destination words into
/// one contiguous chunk per worker, runs the kernel on all chunks, joins,
/// swaps the buffers and reports progress. Consumed by [CaProcessor::run]:
/// one processor drives one run.
pub struct CaProcessor {
    config: CaConfig,
    pool: rayon::ThreadPool,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl CaProcessor {
    /// Build a processor, validating the configuration and spinning up the
    /// worker pool.
    pub fn new(config: CaConfig) -> Result<Self, CoreError> {
        let threads = config
            .threads
            .map(NonZeroUsize::get)
            .unwrap_or_else(num_cpus::get);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| CoreError::Config(format!("could not build the worker pool: {e}")))?;

        Ok(Self {
            config,
            pool,
            sink: Arc::new(NullSink),
            cancel: CancelToken::new(),
        })
    }

    /// Attach a progress sink. One event is emitted per completed iteration.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attach a cancellation token, checked between iterations.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the configured number of steps over `input` and return the final
    /// generation.
    ///
    /// A worker panic aborts the run with [CoreError::WorkerFailed]; a
    /// cancellation observed between iterations returns
    /// [CoreError::Cancelled]. There are no retries.
    pub fn run(self, input: BitField) -> Result<BitField, CoreError> {
        let iterations = self.config.iterations;
        if iterations == 0 || input.is_empty() {
            return Ok(input);
        }

        let grid = match self.config.neighborhood {
            CaNeighborhood::OneDimensional => Grid::one_dimensional(input.len()),
            CaNeighborhood::VonNeumann | CaNeighborhood::Moore => {
                Grid::two_dimensional(input.len(), self.config.width as usize)?
            }
        };
        let kernel = Kernel::new(
            &self.config.rule,
            self.config.neighborhood,
            grid,
            self.config.tier,
        )?;

        let threads = self.pool.current_num_threads().max(1);
        let mut current = input;
        let mut next = BitField::zeroed(current.len());

        for iteration in 0..iterations {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled {
                    partial: Vec::new(),
                });
            }

            let word_count = current.word_count();
            let chunk_len = word_count.div_ceil(threads).max(1);

            {
                let kernel = &kernel;
                let src = &current;
                let dst_words = next.words_mut();

                // Every worker writes only its own chunk; the join at the
                // end of the scope orders all writes before the swap below.
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    self.pool.install(|| {
                        dst_words
                            .par_chunks_mut(chunk_len)
                            .enumerate()
                            .for_each(|(chunk_idx, chunk)| {
                                let start = chunk_idx * chunk_len;
                                kernel.step_range(src, chunk, start..start + chunk.len());
                            });
                    });
                }));

                if let Err(payload) = outcome {
                    return Err(CoreError::WorkerFailed(panic_text(payload)));
                }
            }

            std::mem::swap(&mut current, &mut next);
            self.sink
                .update(TASK_NAME, (iteration + 1) as u64, iterations as u64);
        }

        self.sink.complete(TASK_NAME);
        Ok(current)
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
