//! Property tests for opinion merging.

use proptest::prelude::*;
use rave_llm::{merge, Agreement, Opinion, TieBreak};
use rave_test_utils::generators::arb_opinion;

fn opinions() -> impl Strategy<Value = Vec<Opinion>> {
    prop::collection::vec(arb_opinion(), 1..6)
}

proptest! {
    #[test]
    fn prop_result_is_an_input_label_with_bounded_confidence(ops in opinions()) {
        let result = merge(&ops, TieBreak::FirstListed).unwrap();
        let label = result.recommendation.to_lowercase();
        prop_assert!(ops.iter().any(|o| o.label() == label));
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        prop_assert_eq!(result.contributors.len(), ops.len());
    }

    #[test]
    fn prop_strict_majority_always_wins(ops in opinions()) {
        let n = ops.len();
        let winner = ["approve", "reject", "review"]
            .into_iter()
            .find(|l| ops.iter().filter(|o| o.label() == *l).count() * 2 > n);
        let result = merge(&ops, TieBreak::FirstListed).unwrap();
        match winner {
            Some(label) => {
                prop_assert_eq!(result.recommendation.to_lowercase(), label);
                prop_assert_ne!(result.agreement, Agreement::HighestConfidence);
            }
            None => prop_assert_eq!(result.agreement, Agreement::HighestConfidence),
        }
    }

    #[test]
    fn prop_pros_are_unioned_without_duplicates(ops in opinions()) {
        let result = merge(&ops, TieBreak::FirstListed).unwrap();
        let pros = result.supplementary.get("pros").cloned().unwrap_or_default();

        let mut folded: Vec<String> = pros.iter().map(|p| p.to_lowercase()).collect();
        let before = folded.len();
        folded.sort();
        folded.dedup();
        prop_assert_eq!(folded.len(), before);

        for item in ops.iter().flat_map(|o| o.supplementary.get("pros").into_iter().flatten()) {
            prop_assert!(pros.iter().any(|p| p.eq_ignore_ascii_case(item)));
        }
    }
}
