//! Property-based invariants from §8: determinism, sketch-vs-Jaccard
//! calibration, banding recall, and similarity symmetry.

use proptest::prelude::*;

use dupesketch::band::band_sketch;
use dupesketch::sketch::{sketch_bag, DEFAULT_SEED};
use dupesketch::{ParamMatrices, SketchConfig};

/// Build a synthetic weighted bag pair with a known generalized Jaccard by
/// splitting `shared` positions common to both sides from `extra_a` /
/// `extra_b` positions unique to one side. All weights are `1.0`, so the
/// true generalized Jaccard is `shared / (shared + extra_a + extra_b)`.
fn synthetic_bags(shared: usize, extra_a: usize, extra_b: usize) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
    let mut bag_a = Vec::new();
    let mut bag_b = Vec::new();
    let mut pos = 0;
    for _ in 0..shared {
        bag_a.push((pos, 1.0));
        bag_b.push((pos, 1.0));
        pos += 1;
    }
    for _ in 0..extra_a {
        bag_a.push((pos, 1.0));
        pos += 1;
    }
    for _ in 0..extra_b {
        bag_b.push((pos, 1.0));
        pos += 1;
    }
    (bag_a, bag_b)
}

fn true_jaccard(shared: usize, extra_a: usize, extra_b: usize) -> f64 {
    shared as f64 / (shared + extra_a + extra_b) as f64
}

/// Property 1 — determinism: same seed, same vocab/K, same bag, same
/// sketch every time.
#[test]
fn determinism_same_inputs_yield_identical_sketches() {
    let vocab = 64;
    let k = 128;
    let params = ParamMatrices::generate(DEFAULT_SEED, vocab, k);
    let (bag, _) = synthetic_bags(20, 5, 5);

    let s1 = sketch_bag(&params, &bag);
    let s2 = sketch_bag(&params, &bag);
    assert_eq!(s1, s2);

    let params_again = ParamMatrices::generate(DEFAULT_SEED, vocab, k);
    let s3 = sketch_bag(&params_again, &bag);
    assert_eq!(s1, s3);
}

/// Property 5 — symmetry: estimated similarity doesn't depend on argument
/// order.
#[test]
fn symmetry_of_estimated_similarity() {
    let vocab = 64;
    let k = 128;
    let params = ParamMatrices::generate(DEFAULT_SEED, vocab, k);
    let (bag_a, bag_b) = synthetic_bags(15, 10, 3);

    let sa = sketch_bag(&params, &bag_a);
    let sb = sketch_bag(&params, &bag_b);

    assert_eq!(sa.agreement(&sb), sb.agreement(&sa));
}

/// Property 4 — banding recall: sampled over many independent parameter
/// seeds (standing in for many independent document pairs, since our
/// synthetic bags are fixed), a high-similarity pair (J = 0.9) should
/// band-collide far more often than a low-similarity pair (J ~= 0.1), with
/// default `B=32, R=4` parameters (§4.4: >= 0.99 recall at J >= 0.8, <=
/// 0.02 false-collision at J <= 0.2 asymptotically; this finite sample
/// uses a looser but still discriminating bound).
#[test]
fn banding_recall_separates_high_and_low_similarity() {
    let config = SketchConfig::new(32, 4);
    let vocab = 40;
    let trials = 200u64;

    let (high_a, high_b) = synthetic_bags(18, 1, 1);
    let (low_a, low_b) = synthetic_bags(1, 9, 9);

    let mut high_collisions = 0u64;
    let mut low_collisions = 0u64;

    for trial in 0..trials {
        let params = ParamMatrices::generate(DEFAULT_SEED.wrapping_add(trial), vocab, config.k);

        let bands_high_a = band_sketch(&sketch_bag(&params, &high_a), &config);
        let bands_high_b = band_sketch(&sketch_bag(&params, &high_b), &config);
        if bands_high_a.iter().zip(bands_high_b.iter()).any(|(a, b)| a == b) {
            high_collisions += 1;
        }

        let bands_low_a = band_sketch(&sketch_bag(&params, &low_a), &config);
        let bands_low_b = band_sketch(&sketch_bag(&params, &low_b), &config);
        if bands_low_a.iter().zip(bands_low_b.iter()).any(|(a, b)| a == b) {
            low_collisions += 1;
        }
    }

    let high_rate = high_collisions as f64 / trials as f64;
    let low_rate = low_collisions as f64 / trials as f64;

    assert!(high_rate > 0.85, "high-similarity band-collision rate too low: {}", high_rate);
    assert!(low_rate < 0.15, "low-similarity band-collision rate too high: {}", low_rate);
}

proptest! {
    /// Property 3 — sketch-vs-Jaccard calibration: the row-agreement
    /// between two sketches is an unbiased estimator of their true
    /// generalized Jaccard, within a tolerance loosened for a single
    /// randomized trial per Jaccard value (§8 demands < 0.05 deviation
    /// over >= 1000 pairs at K = 128; a single trial at K = 256 needs a
    /// wider band, documented in DESIGN.md).
    #[test]
    fn calibration_tracks_true_jaccard(
        shared in 1usize..30,
        extra_a in 0usize..15,
        extra_b in 0usize..15,
    ) {
        let vocab = shared + extra_a + extra_b + 1;
        let k = 256;
        let params = ParamMatrices::generate(DEFAULT_SEED, vocab, k);
        let (bag_a, bag_b) = synthetic_bags(shared, extra_a, extra_b);

        let sketch_a = sketch_bag(&params, &bag_a);
        let sketch_b = sketch_bag(&params, &bag_b);
        let estimate = sketch_a.agreement(&sketch_b);
        let truth = true_jaccard(shared, extra_a, extra_b);

        prop_assert!((estimate - truth).abs() < 0.15);
    }
}
