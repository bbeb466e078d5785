//! Property tests for the pure parts of the training stages.
//!
//! Uses proptest to verify:
//! 1. The seeded split puts every row in exactly one of train/test
//! 2. The same seed gives the same split
//! 3. Model acceptance is exactly "no served model, or improvement > threshold"
//! 4. Weighted metrics stay in [0, 1] and perfect predictions score 1

use complaintlab_runner::stages::{DataTransformation, ModelEvaluation};
use complaintlab_runner::ClassificationMetrics;
use polars::prelude::*;
use proptest::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

fn numbered(rows: usize) -> DataFrame {
    let ids: Vec<i64> = (0..rows as i64).collect();
    DataFrame::new(vec![Column::new("id".into(), ids)]).unwrap()
}

fn ids(df: &DataFrame) -> Vec<i64> {
    df.column("id")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

fn arb_labels() -> impl Strategy<Value = Vec<(Option<String>, Option<String>)>> {
    let label = prop_oneof![Just("Yes".to_string()), Just("No".to_string())];
    prop::collection::vec(
        (prop::option::of(label.clone()), prop::option::of(label)),
        0..60,
    )
}

proptest! {
    #[test]
    fn split_partitions_every_row_once(
        rows in 0usize..300,
        test_size in 0.0f64..=1.0,
        seed in any::<u64>(),
    ) {
        let df = numbered(rows);
        let (train, test) = DataTransformation::split(&df, test_size, seed).unwrap();

        prop_assert_eq!(train.height() + test.height(), rows);
        let mut all = ids(&train);
        all.extend(ids(&test));
        all.sort_unstable();
        prop_assert_eq!(all, (0..rows as i64).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_reproducible(rows in 1usize..200, test_size in 0.0f64..=1.0, seed in any::<u64>()) {
        let df = numbered(rows);
        let (train_a, test_a) = DataTransformation::split(&df, test_size, seed).unwrap();
        let (train_b, test_b) = DataTransformation::split(&df, test_size, seed).unwrap();
        prop_assert_eq!(ids(&train_a), ids(&train_b));
        prop_assert_eq!(ids(&test_a), ids(&test_b));
    }

    #[test]
    fn acceptance_matches_threshold(
        trained in 0.0f64..=1.0,
        best in prop::option::of(0.0f64..=1.0),
        threshold in 0.0f64..0.2,
    ) {
        let (accepted, improved) = ModelEvaluation::decide(trained, best, threshold);
        match best {
            None => {
                prop_assert!(accepted);
                prop_assert_eq!(improved, trained);
            }
            Some(best) => {
                prop_assert_eq!(improved, trained - best);
                prop_assert_eq!(accepted, trained - best > threshold);
            }
        }
    }

    #[test]
    fn better_model_is_never_less_acceptable(
        trained in 0.0f64..=1.0,
        gain in 0.0f64..=1.0,
        best in 0.0f64..=1.0,
        threshold in 0.0f64..0.2,
    ) {
        let (worse, _) = ModelEvaluation::decide(trained, Some(best), threshold);
        let (better, _) = ModelEvaluation::decide(trained + gain, Some(best), threshold);
        prop_assert!(!worse || better);
    }

    #[test]
    fn metrics_are_bounded(pairs in arb_labels()) {
        let (truth, predicted): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        let m = ClassificationMetrics::compute(&truth, &predicted);
        for score in [m.f1_score, m.precision_score, m.recall_score, m.accuracy] {
            prop_assert!((0.0..=1.0 + 1e-9).contains(&score), "score {} out of range", score);
        }
        prop_assert_eq!(m.support, truth.iter().filter(|t| t.is_some()).count());
    }

    #[test]
    fn perfect_predictions_score_one(pairs in arb_labels()) {
        let truth: Vec<Option<String>> = pairs.into_iter().map(|(t, _)| t).collect();
        prop_assume!(truth.iter().any(Option::is_some));
        let m = ClassificationMetrics::compute(&truth, &truth);
        prop_assert!((m.f1_score - 1.0).abs() < 1e-9);
        prop_assert!((m.accuracy - 1.0).abs() < 1e-9);
    }
}
