//! Non-overlapping template matching test.
//!
//! Slides an m-bit window over each block and counts occurrences of each
//! aperiodic template, restarting the window behind a hit. Too many
//! occurrences of any single pattern betray a generator that favors it. One
//! result is produced per template in the set.

use rayon::prelude::*;

use crate::bitfield::BitField;
use crate::internals::check_f64;
use crate::special::igamc;
use crate::tests::{into_results_multi, metrics};
use crate::{StatTest, TestError, TestResult};

use super::{aperiodic_templates, count_matches, DEFAULT_TEMPLATE_LENGTH};

/// Registry name.
pub const NAME: &str = "template.non-overlapping";

/// The block count recommended by the reference distribution.
pub const DEFAULT_BLOCK_COUNT: usize = 8;

/// Non-overlapping template matching test - No. 7.
///
/// Parameters: the template length `m` (2 to 16) and the number of blocks
/// `N` (1 to 99) the sequence is cut into.
#[derive(Copy, Clone, Debug)]
pub struct NonOverlappingTemplateTest {
    template_len: u32,
    block_count: usize,
}

impl NonOverlappingTemplateTest {
    /// A test instance, if the parameters are within bounds.
    pub fn new(template_len: u32, block_count: usize) -> Option<Self> {
        if (2..=16).contains(&template_len) && (1..100).contains(&block_count) {
            Some(Self {
                template_len,
                block_count,
            })
        } else {
            None
        }
    }
}

impl Default for NonOverlappingTemplateTest {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_LENGTH, DEFAULT_BLOCK_COUNT)
            .expect("the default parameters are within bounds")
    }
}

impl StatTest for NonOverlappingTemplateTest {
    fn name(&self) -> &'static str {
        NAME
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        into_results_multi(NAME, run(data, self.template_len, self.block_count, alpha))
    }
}

fn run(
    data: &BitField,
    template_len: u32,
    block_count: usize,
    alpha: f64,
) -> Result<Vec<TestResult>, TestError> {
    let n = data.len();
    let block_len = n / block_count;
    if block_len < template_len as usize {
        return Err(TestError::InvalidParameter(format!(
            "the block length {block_len} is smaller than the template length {template_len}"
        )));
    }

    // theoretical mean and variance of the per-block hit count
    let pow2_m = f64::powi(2.0, template_len as i32);
    let mean = (block_len - template_len as usize + 1) as f64 / pow2_m;
    let variance = block_len as f64
        * (1.0 / pow2_m - (2.0 * template_len as f64 - 1.0) / (pow2_m * pow2_m));

    let words = data.words();
    let templates = aperiodic_templates(template_len);

    // one chi^2 and p-value per template
    templates
        .par_iter()
        .map(|&template| {
            let mut chi_square = 0.0;
            for block in 0..block_count {
                let hits = count_matches(
                    words,
                    block * block_len,
                    block_len,
                    template,
                    template_len,
                    template_len as usize,
                )?;
                chi_square += (hits as f64 - mean) * (hits as f64 - mean) / variance;
            }
            check_f64(chi_square)?;

            let p_value = igamc(block_count as f64 / 2.0, chi_square / 2.0)?;
            check_f64(p_value)?;

            Ok(TestResult::from_p_value(
                format!("{NAME}.{template:0width$b}", width = template_len as usize),
                p_value,
                alpha,
                metrics! {
                    "template" => template as f64,
                    "block_size" => block_len as f64,
                    "blocks" => block_count as f64,
                    "mean" => mean,
                    "chi_square" => chi_square,
                },
            ))
        })
        .collect()
}
