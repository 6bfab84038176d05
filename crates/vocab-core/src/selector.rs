//! Uniform draw of categories without replacement.

use std::collections::BTreeSet;

use rand::Rng;

use crate::catalogue::CategoryName;

/// Draws `min(count, eligible.len())` distinct categories from `eligible`.
///
/// Each pick is uniform over what remains, and the pick is removed before
/// the next draw. Negative counts select nothing. Pure: callers merge the
/// result into session state themselves.
pub fn pick_categories<R>(eligible: &BTreeSet<CategoryName>, count: i64, rng: &mut R) -> BTreeSet<CategoryName>
where
    R: Rng + ?Sized,
{
    let wanted = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    if wanted >= eligible.len() {
        return eligible.clone();
    }

    // BTreeSet iteration is ordered, so the same seed yields the same picks.
    let mut remaining: Vec<&CategoryName> = eligible.iter().collect();
    let mut selected = BTreeSet::new();
    while selected.len() < wanted {
        let index = rng.gen_range(0..remaining.len());
        selected.insert(remaining.swap_remove(index).clone());
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn returns_everything_when_count_exceeds_supply() {
        let eligible = names(&["Bracken", "Jester"]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_categories(&eligible, 5, &mut rng), eligible);
    }

    #[test]
    fn negative_count_selects_nothing() {
        let eligible = names(&["Bracken", "Jester"]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_categories(&eligible, -3, &mut rng).is_empty());
    }

    #[test]
    fn empty_eligible_set_selects_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_categories(&BTreeSet::new(), 2, &mut rng).is_empty());
    }

    #[test]
    fn same_seed_same_picks() {
        let eligible = names(&["A", "B", "C", "D", "E", "F"]);
        let first = pick_categories(&eligible, 3, &mut StdRng::seed_from_u64(99));
        let second = pick_categories(&eligible, 3, &mut StdRng::seed_from_u64(99));
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.is_subset(&eligible));
    }

    #[test]
    fn every_category_can_be_drawn() {
        let eligible = names(&["A", "B", "C"]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            seen.extend(pick_categories(&eligible, 1, &mut rng));
        }
        assert_eq!(seen, eligible);
    }
}
