use std::collections::HashSet;

use litrag_core::types::FusedResult;

/// Collapse a fragment ranking to unique parent documents: the first
/// (best-ranked) fragment of each parent wins, input order is kept and the
/// output stops at `limit`.
pub fn dedupe(results: &[FusedResult], limit: usize) -> Vec<FusedResult> {
    if limit == 0 {
        return Vec::new();
    }
    let mut seen: HashSet<&str> = HashSet::new();
    results
        .iter()
        .filter(|r| seen.insert(r.fragment.parent_id.as_str()))
        .take(limit)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use litrag_core::types::Fragment;
    use proptest::prelude::*;

    fn fused(parents: &[u8]) -> Vec<FusedResult> {
        parents
            .iter()
            .enumerate()
            .map(|(i, p)| FusedResult {
                fragment: Fragment::new(p.to_string(), i, parents.len(), "t"),
                score: 1.0 / (i as f64 + 1.0),
                rank: i + 1,
                lexical_rank: None,
                vector_rank: None,
            })
            .collect()
    }

    #[test]
    fn first_fragment_per_parent_wins() {
        let out = dedupe(&fused(&[1, 2, 1, 3, 2, 4]), 3);
        let got: Vec<(&str, usize)> = out.iter().map(|r| (r.fragment.parent_id.as_str(), r.rank)).collect();
        assert_eq!(got, vec![("1", 1), ("2", 2), ("3", 4)]);
    }

    #[test]
    fn zero_limit_is_empty() {
        assert!(dedupe(&fused(&[1, 2]), 0).is_empty());
        assert!(dedupe(&[], 5).is_empty());
    }

    proptest! {
        #[test]
        fn unique_bounded_and_order_preserving(parents in proptest::collection::vec(0u8..12, 0..40), limit in 0usize..15) {
            let input = fused(&parents);
            let out = dedupe(&input, limit);
            prop_assert!(out.len() <= limit);

            let ids: Vec<&str> = out.iter().map(|r| r.fragment.parent_id.as_str()).collect();
            let unique: HashSet<&str> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), ids.len());

            // Exactly the first occurrences, in input order.
            let mut seen = HashSet::new();
            let expected: Vec<usize> = input
                .iter()
                .filter(|r| seen.insert(r.fragment.parent_id.clone()))
                .map(|r| r.rank)
                .take(limit)
                .collect();
            prop_assert_eq!(out.iter().map(|r| r.rank).collect::<Vec<_>>(), expected);
        }
    }
}
