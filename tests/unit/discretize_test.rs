//! Properties of summary binning.

use proptest::prelude::*;
use ridetwin::mining::{bins_for, BinningStrategy, SummaryFeature};

fn values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-50.0..50.0f64, 1..40)
}

#[test]
fn bins_are_monotone() {
    proptest!(|(v in values(), bins in 1usize..6)| {
        for strategy in [BinningStrategy::EqualWidth, BinningStrategy::Quantile] {
            let b = bins_for(SummaryFeature::Speed, &v, strategy, bins, &[]);
            prop_assert_eq!(b.count(), bins);
            let mut sorted = v.clone();
            sorted.sort_by(f64::total_cmp);
            let assigned: Vec<usize> = sorted.iter().map(|x| b.bin_of(*x).unwrap()).collect();
            prop_assert!(assigned.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(assigned.iter().all(|bin| *bin < bins));
        }
    });
}

#[test]
fn quantile_bins_split_evenly() {
    let values: Vec<f64> = (0..90).map(f64::from).collect();
    let b = bins_for(SummaryFeature::Duration, &values, BinningStrategy::Quantile, 3, &[]);
    let mut counts = [0usize; 3];
    for v in &values {
        counts[b.bin_of(*v).unwrap()] += 1;
    }
    for count in counts {
        assert!((29..=31).contains(&count), "{counts:?}");
    }
}
