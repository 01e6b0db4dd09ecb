//! Automaton kernel and processor tests: rule semantics, vector-tier
//! equivalence and the processor's execution contract.

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::bitfield::BitField;
use crate::ca::kernel::Kernel;
use crate::ca::processor::{CaConfig, CaProcessor};
use crate::ca::{CaNeighborhood, CaRule, Grid, VectorTier};
use crate::{CancelToken, CoreError};

/// Apply one step through the full kernel (bulk paths included) at the
/// given tier, single-chunk.
fn step_with_tier(
    data: &BitField,
    rule: &CaRule,
    neighborhood: CaNeighborhood,
    width: u32,
    tier: VectorTier,
) -> BitField {
    let grid = match neighborhood {
        CaNeighborhood::OneDimensional => Grid::one_dimensional(data.len()),
        _ => Grid::two_dimensional(data.len(), width as usize).unwrap(),
    };
    let kernel = Kernel::new(rule, neighborhood, grid, tier).unwrap();

    let mut out = BitField::zeroed(data.len());
    let word_count = data.word_count();
    kernel.step_range(data, out.words_mut(), 0..word_count);
    out
}

/// Apply one step purely through the per-cell reference path.
fn step_reference(
    data: &BitField,
    rule: &CaRule,
    neighborhood: CaNeighborhood,
    width: u32,
) -> BitField {
    let grid = match neighborhood {
        CaNeighborhood::OneDimensional => Grid::one_dimensional(data.len()),
        _ => Grid::two_dimensional(data.len(), width as usize).unwrap(),
    };
    let kernel = Kernel::new(rule, neighborhood, grid, VectorTier::Scalar).unwrap();

    let mut out = BitField::zeroed(data.len());
    for i in 0..data.len() {
        out.set(i, kernel.cell_next(data, i));
    }
    out
}

/// The vector tiers the test host can actually run, scalar always included.
fn available_tiers() -> Vec<VectorTier> {
    let mut tiers = vec![VectorTier::Scalar];

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("sse2") {
            tiers.push(VectorTier::Sse2);
        }
        if is_x86_feature_detected!("avx2") {
            tiers.push(VectorTier::Avx2);
        }
        if is_x86_feature_detected!("avx512f") {
            tiers.push(VectorTier::Avx512f);
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            tiers.push(VectorTier::Neon);
        }
    }

    tiers
}

#[test]
fn rule30_single_seed_step() {
    // seed 10000000, one toroidal step of rule 30 -> 11000001
    let field = BitField::from_bit_str("10000000").unwrap();
    let stepped = step_with_tier(
        &field,
        &CaRule::Rule30,
        CaNeighborhood::OneDimensional,
        0,
        VectorTier::Scalar,
    );

    let got: String = stepped
        .bits()
        .map(|b| if b { '1' } else { '0' })
        .collect();
    assert_eq!(got, "11000001");
}

#[test]
fn rule150_is_the_neighbor_xor() {
    let mut rng = super::TestRng::new(150);
    let field = rng.field(256);
    let stepped = step_with_tier(
        &field,
        &CaRule::Rule150,
        CaNeighborhood::OneDimensional,
        0,
        VectorTier::Scalar,
    );

    let n = field.len();
    for i in 0..n {
        let left = field.get((i + n - 1) % n);
        let right = field.get((i + 1) % n);
        assert_eq!(stepped.get(i), left ^ right, "cell {i}");
    }
}

#[test]
fn wolfram_codes_match_the_truth_table() {
    // spot-check rule 110 on a fixed field against the table definition
    let field = BitField::from_bit_str("0110010111010001").unwrap();
    let stepped = step_with_tier(
        &field,
        &CaRule::Rule110,
        CaNeighborhood::OneDimensional,
        0,
        VectorTier::Scalar,
    );

    let n = field.len();
    for i in 0..n {
        let pattern = ((field.get((i + n - 1) % n) as u8) << 2)
            | ((field.get(i) as u8) << 1)
            | (field.get((i + 1) % n) as u8);
        assert_eq!(stepped.get(i), (110 >> pattern) & 1 == 1, "cell {i}");
    }
}

#[test]
fn bulk_paths_match_the_reference_cells() {
    let mut rng = super::TestRng::new(7331);
    let rules = [
        CaRule::Rule30,
        CaRule::Rule82,
        CaRule::Rule110,
        CaRule::Rule150,
        CaRule::Wolfram(105),
    ];

    for len in [1_usize, 7, 64, 65, 130, 1000, 4099] {
        let field = rng.field(len);
        for rule in &rules {
            let bulk = step_with_tier(
                &field,
                rule,
                CaNeighborhood::OneDimensional,
                0,
                VectorTier::Scalar,
            );
            let reference = step_reference(&field, rule, CaNeighborhood::OneDimensional, 0);
            assert_eq!(bulk, reference, "rule {rule:?}, len {len}");
        }
    }
}

#[test]
fn two_dimensional_bulk_matches_the_reference_cells() {
    let mut rng = super::TestRng::new(99);
    let rules = [
        CaRule::Rule30,
        CaRule::Rule82,
        CaRule::Rule110,
        CaRule::Rule150,
    ];

    for (len, width) in [(96_usize, 10_u32), (1000, 0), (1000, 100), (4099, 64), (513, 7)] {
        let field = rng.field(len);
        for neighborhood in [CaNeighborhood::VonNeumann, CaNeighborhood::Moore] {
            for rule in &rules {
                let bulk = step_with_tier(&field, rule, neighborhood, width, VectorTier::Scalar);
                let reference = step_reference(&field, rule, neighborhood, width);
                assert_eq!(
                    bulk, reference,
                    "rule {rule:?}, {neighborhood:?}, len {len}, width {width}"
                );
            }
        }
    }
}

#[test]
fn every_available_tier_is_bit_identical_to_scalar() {
    let mut rng = super::TestRng::new(0xDEAD);
    let tiers = available_tiers();
    let rules = [
        CaRule::Rule30,
        CaRule::Rule82,
        CaRule::Rule110,
        CaRule::Rule150,
        CaRule::Wolfram(45),
    ];

    let cases = [
        (CaNeighborhood::OneDimensional, 0_u32),
        (CaNeighborhood::VonNeumann, 0),
        (CaNeighborhood::VonNeumann, 100),
        (CaNeighborhood::Moore, 0),
        (CaNeighborhood::Moore, 33),
    ];

    for len in [200_usize, 4096, 10_000] {
        let field = rng.field(len);
        for &(neighborhood, width) in &cases {
            for rule in &rules {
                if neighborhood != CaNeighborhood::OneDimensional
                    && matches!(rule, CaRule::Wolfram(_))
                {
                    continue;
                }
                let scalar = step_with_tier(&field, rule, neighborhood, width, VectorTier::Scalar);
                for &tier in &tiers[1..] {
                    let vectored = step_with_tier(&field, rule, neighborhood, width, tier);
                    assert_eq!(
                        scalar, vectored,
                        "tier {tier:?}, rule {rule:?}, {neighborhood:?}, len {len}"
                    );
                }
            }
        }
    }
}

#[test]
fn custom_rules_see_the_current_buffer() {
    // a custom rule inverting the cell, ignoring neighbors
    let rule = CaRule::Custom(Arc::new(|field: &BitField, i: usize| !field.get(i)));

    let mut rng = super::TestRng::new(5);
    let field = rng.field(300);
    let stepped = step_with_tier(
        &field,
        &rule,
        CaNeighborhood::OneDimensional,
        0,
        VectorTier::Scalar,
    );

    for i in 0..field.len() {
        assert_eq!(stepped.get(i), !field.get(i));
    }
}

#[test]
fn arbitrary_codes_are_rejected_on_grids() {
    let processor = CaProcessor::new(CaConfig {
        rule: CaRule::Wolfram(99),
        neighborhood: CaNeighborhood::Moore,
        ..Default::default()
    })
    .unwrap();

    let result = processor.run(BitField::zeroed(1000));
    assert!(matches!(result, Err(CoreError::Config(_))));
}

#[test]
fn zero_iterations_return_the_input_unchanged() {
    let mut rng = super::TestRng::new(6);
    let field = rng.field(2000);

    let processor = CaProcessor::new(CaConfig {
        iterations: 0,
        ..Default::default()
    })
    .unwrap();
    let output = processor.run(field.clone()).unwrap();
    assert_eq!(output, field);
}

#[test]
fn thread_count_does_not_change_the_result() {
    let mut rng = super::TestRng::new(8);
    let field = rng.field(20_000);

    let run = |threads: usize| {
        let processor = CaProcessor::new(CaConfig {
            rule: CaRule::Rule110,
            iterations: 5,
            threads: NonZeroUsize::new(threads),
            ..Default::default()
        })
        .unwrap();
        processor.run(field.clone()).unwrap()
    };

    let single = run(1);
    let multi = run(4);
    assert_eq!(single, multi);
}

#[test]
fn iterating_matches_repeated_single_steps() {
    let mut rng = super::TestRng::new(9);
    let field = rng.field(3000);

    let processor = CaProcessor::new(CaConfig {
        rule: CaRule::Rule30,
        iterations: 3,
        ..Default::default()
    })
    .unwrap();
    let iterated = processor.run(field.clone()).unwrap();

    let mut manual = field;
    for _ in 0..3 {
        manual = step_with_tier(
            &manual,
            &CaRule::Rule30,
            CaNeighborhood::OneDimensional,
            0,
            VectorTier::Scalar,
        );
    }
    assert_eq!(iterated, manual);
}

#[test]
fn cancellation_stops_the_processor() {
    let token = CancelToken::new();
    token.cancel();

    let processor = CaProcessor::new(CaConfig::default())
        .unwrap()
        .with_cancel(token);
    let result = processor.run(BitField::zeroed(1000));
    assert!(matches!(result, Err(CoreError::Cancelled { .. })));
}

#[test]
fn worker_panic_surfaces_as_worker_failed() {
    let rule = CaRule::Custom(Arc::new(|_: &BitField, i: usize| {
        assert!(i < 100, "boom");
        false
    }));

    let processor = CaProcessor::new(CaConfig {
        rule,
        ..Default::default()
    })
    .unwrap();
    let result = processor.run(BitField::zeroed(1000));
    assert!(matches!(result, Err(CoreError::WorkerFailed(_))));
}

#[test]
fn grid_width_auto_selection_squares_the_field() {
    let grid = Grid::two_dimensional(10_000, 0).unwrap();
    assert_eq!(grid.width, 100);
    assert_eq!(grid.height, 100);

    let grid = Grid::two_dimensional(10, 3).unwrap();
    assert_eq!(grid.height, 4);
    assert!(grid.width * grid.height >= 10);
}
