//! The registry of named statistical tests.

use std::collections::BTreeMap;

use crate::tests::approximate_entropy::ApproximateEntropyTest;
use crate::tests::cumulative_sums::CumulativeSumsTest;
use crate::tests::frequency::FrequencyTest;
use crate::tests::frequency_block::BlockFrequencyTest;
use crate::tests::linear_complexity::LinearComplexityTest;
use crate::tests::longest_run::LongestRunTest;
use crate::tests::matrix_rank::MatrixRankTest;
use crate::tests::random_excursions::RandomExcursionsTest;
use crate::tests::random_excursions_variant::RandomExcursionsVariantTest;
use crate::tests::runs::RunsTest;
use crate::tests::serial::SerialTest;
use crate::tests::spectral::SpectralTest;
use crate::tests::template_matching::non_overlapping::NonOverlappingTemplateTest;
use crate::tests::template_matching::overlapping::OverlappingTemplateTest;
use crate::tests::universal::UniversalTest;
use crate::tests::{
    approximate_entropy, cumulative_sums, frequency, frequency_block, linear_complexity,
    longest_run, matrix_rank, random_excursions, random_excursions_variant, runs, serial,
    spectral, template_matching, universal,
};
use crate::StatTest;

/// Every registered test name, in canonical suite order. This is what a
/// selection of `all` expands to.
pub const ALL_TESTS: [&str; 15] = [
    frequency::NAME,
    frequency_block::NAME,
    runs::NAME,
    longest_run::NAME,
    matrix_rank::NAME,
    spectral::NAME,
    template_matching::non_overlapping::NAME,
    template_matching::overlapping::NAME,
    universal::NAME,
    linear_complexity::NAME,
    serial::NAME,
    approximate_entropy::NAME,
    cumulative_sums::NAME,
    random_excursions::NAME,
    random_excursions_variant::NAME,
];

/// The tunable parameters of the suite, prefilled with the recommended
/// defaults. Tests without parameters have no entry here.
///
/// ```
/// use cascan_lib::registry::TestParams;
/// use cascan_lib::tests::serial::SerialTest;
/// let params = TestParams {
///     serial: SerialTest::new(10).unwrap(),
///     ..Default::default()
/// };
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct TestParams {
    /// Block length of the block frequency test.
    pub block_frequency: BlockFrequencyTest,
    /// Template length and block count of the non-overlapping template test.
    pub non_overlapping: NonOverlappingTemplateTest,
    /// Template and block length of the overlapping template test.
    pub overlapping: OverlappingTemplateTest,
    /// Block length of the linear complexity test.
    pub linear_complexity: LinearComplexityTest,
    /// Pattern length of the serial test.
    pub serial: SerialTest,
    /// Pattern length of the approximate entropy test.
    pub approximate_entropy: ApproximateEntropyTest,
}

/// Builds a configured test object from the shared parameters.
type Constructor = fn(&TestParams) -> Box<dyn StatTest>;

/// Maps stable test names to constructors. Populated once at program start
/// and immutable afterwards; the constructed tests are value types safe to
/// invoke concurrently on distinct inputs.
pub struct TestRegistry {
    entries: BTreeMap<&'static str, Constructor>,
}

impl TestRegistry {
    /// The registry holding the canonical suite.
    pub fn standard() -> Self {
        let mut entries = BTreeMap::<&'static str, Constructor>::new();
        entries.insert(frequency::NAME, |_| Box::new(FrequencyTest));
        entries.insert(frequency_block::NAME, |p| Box::new(p.block_frequency));
        entries.insert(runs::NAME, |_| Box::new(RunsTest));
        entries.insert(longest_run::NAME, |_| Box::new(LongestRunTest));
        entries.insert(matrix_rank::NAME, |_| Box::new(MatrixRankTest));
        entries.insert(spectral::NAME, |_| Box::new(SpectralTest));
        entries.insert(template_matching::non_overlapping::NAME, |p| {
            Box::new(p.non_overlapping)
        });
        entries.insert(template_matching::overlapping::NAME, |p| {
            Box::new(p.overlapping)
        });
        entries.insert(universal::NAME, |_| Box::new(UniversalTest));
        entries.insert(linear_complexity::NAME, |p| Box::new(p.linear_complexity));
        entries.insert(serial::NAME, |p| Box::new(p.serial));
        entries.insert(approximate_entropy::NAME, |p| {
            Box::new(p.approximate_entropy)
        });
        entries.insert(cumulative_sums::NAME, |_| Box::new(CumulativeSumsTest));
        entries.insert(random_excursions::NAME, |_| Box::new(RandomExcursionsTest));
        entries.insert(random_excursions_variant::NAME, |_| {
            Box::new(RandomExcursionsVariantTest)
        });
        Self { entries }
    }

    /// Whether a test of that name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Construct the named test with the given parameters.
    pub fn construct(&self, name: &str, params: &TestParams) -> Option<Box<dyn StatTest>> {
        self.entries.get(name).map(|constructor| constructor(params))
    }

    /// The registered names, in canonical suite order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        ALL_TESTS.into_iter()
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
