use std::cmp::Ordering;

use super::models::{Platform, SelectionCriteria, SelectionOutcome};

/// Preference order: higher authority, then higher success rate, then the
/// least recently used (never-used first). The key breaks remaining ties so
/// that selection is fully deterministic.
pub fn preference_order(a: &Platform, b: &Platform) -> Ordering {
    b.authority
        .cmp(&a.authority)
        .then_with(|| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| match (a.last_used_at, b.last_used_at) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => left.cmp(&right),
        })
        .then_with(|| a.key.cmp(&b.key))
}

/// Picks the best platform the criteria allow. Returns `Exhausted` instead
/// of repeating an excluded platform.
pub fn select_from(platforms: Vec<Platform>, criteria: &SelectionCriteria) -> SelectionOutcome {
    let eligible: Vec<Platform> = platforms
        .into_iter()
        .filter(|platform| criteria.allows(platform))
        .collect();
    if eligible.is_empty() {
        return SelectionOutcome::NoneAvailable;
    }
    eligible
        .into_iter()
        .filter(|platform| !criteria.exclude.contains(&platform.key))
        .min_by(preference_order)
        .map(SelectionOutcome::Selected)
        .unwrap_or(SelectionOutcome::Exhausted)
}
