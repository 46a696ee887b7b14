use std::cmp::Ordering;

use crate::routing::RoutingCandidate;

/// Candidates sharing one buyer tier, in the order they should be tried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    pub tier: i32,
    pub candidates: Vec<RoutingCandidate>,
}

/// Groups eligible candidates by buyer tier (ascending) and orders each tier by
/// buyer weight (descending), then buyer id and offer id so the same input always
/// produces the same order.
pub fn select_tiers(mut candidates: Vec<RoutingCandidate>) -> Vec<Tier> {
    candidates.retain(RoutingCandidate::is_eligible);
    candidates.sort_by(tier_order);

    let mut tiers: Vec<Tier> = Vec::new();
    for candidate in candidates {
        match tiers.last_mut() {
            Some(tier) if tier.tier == candidate.buyer.tier => tier.candidates.push(candidate),
            _ => tiers.push(Tier { tier: candidate.buyer.tier, candidates: vec![candidate] }),
        }
    }
    tiers
}

/// Routing order: tier ascending, weight descending, then buyer id and offer id.
/// Catalogs page in this order too.
pub fn tier_order(left: &RoutingCandidate, right: &RoutingCandidate) -> Ordering {
    left.buyer
        .tier
        .cmp(&right.buyer.tier)
        .then_with(|| right.buyer.weight.cmp(&left.buyer.weight))
        .then_with(|| left.buyer.id.cmp(&right.buyer.id))
        .then_with(|| left.offer.id.cmp(&right.offer.id))
}

#[cfg(test)]
mod tests {
    use super::select_tiers;
    use crate::testing::candidate;

    fn buyer_ids(tier: &super::Tier) -> Vec<&str> {
        tier.candidates.iter().map(|candidate| candidate.buyer.id.0.as_str()).collect()
    }

    #[test]
    fn tiers_ascend_and_weights_descend() {
        let tiers = select_tiers(vec![
            candidate("buyer-c", 2, 99),
            candidate("buyer-a", 1, 10),
            candidate("buyer-b", 1, 20),
        ]);

        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].tier, 1);
        assert_eq!(buyer_ids(&tiers[0]), vec!["buyer-b", "buyer-a"]);
        assert_eq!(tiers[1].tier, 2);
        assert_eq!(buyer_ids(&tiers[1]), vec!["buyer-c"]);
    }

    #[test]
    fn equal_weights_are_ordered_by_buyer_id() {
        let forward = select_tiers(vec![
            candidate("buyer-z", 1, 50),
            candidate("buyer-m", 1, 50),
            candidate("buyer-a", 1, 50),
        ]);
        let reversed = select_tiers(vec![
            candidate("buyer-a", 1, 50),
            candidate("buyer-m", 1, 50),
            candidate("buyer-z", 1, 50),
        ]);

        assert_eq!(buyer_ids(&forward[0]), vec!["buyer-a", "buyer-m", "buyer-z"]);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn inactive_pairs_are_dropped() {
        let mut paused_offer = candidate("buyer-a", 1, 10);
        paused_offer.offer.is_active = false;
        let mut inactive_buyer = candidate("buyer-b", 1, 10);
        inactive_buyer.buyer.status = crate::domain::ActivityStatus::Inactive;

        let tiers = select_tiers(vec![paused_offer, inactive_buyer, candidate("buyer-c", 3, 1)]);

        assert_eq!(tiers.len(), 1);
        assert_eq!(buyer_ids(&tiers[0]), vec!["buyer-c"]);
    }

    #[test]
    fn empty_input_yields_no_tiers() {
        assert!(select_tiers(Vec::new()).is_empty());
    }
}
