use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use dcx_core::routing::{select_tiers, Tier};
use dcx_core::store::CandidatePage;
use dcx_core::{
    CampaignId, OfferCatalog, RoutingEngine, RoutingOutcome, RoutingPolicy, RoutingRequest,
    SupplierId,
};
use dcx_db::{SqlCapLedger, SqlOfferCatalog};
use uuid::Uuid;

use crate::commands::{with_migrated_pool, CommandResult, StepError};

#[derive(Debug, Args)]
pub struct RouteArgs {
    #[arg(long, help = "Campaign to route for")]
    pub campaign: String,
    #[arg(long, default_value = "sup-demo", help = "Supplier sending the call")]
    pub supplier: String,
    #[arg(long, default_value = "+10000000000", help = "Caller number")]
    pub from: String,
    #[arg(long, default_value = "+10000000000", help = "Dialed tracking number")]
    pub to: String,
    #[arg(
        long,
        help = "Run the real decision; this reserves a daily call slot on the chosen buyer"
    )]
    pub commit: bool,
}

pub fn run(args: RouteArgs) -> CommandResult {
    let routed = with_migrated_pool("route", |config, pool| async move {
        let catalog = Arc::new(SqlOfferCatalog::new(pool.clone()));
        let policy = RoutingPolicy::from(&config.routing);
        if args.commit {
            let engine = RoutingEngine::new(catalog, Arc::new(SqlCapLedger::new(pool)), policy);
            Ok(commit(&engine, &args).await)
        } else {
            preview(catalog.as_ref(), &args, policy.candidate_page_size).await
        }
    });

    match routed {
        Ok(message) => CommandResult::success("route", message),
        Err(failure) => failure,
    }
}

async fn commit(engine: &RoutingEngine, args: &RouteArgs) -> String {
    let request = RoutingRequest {
        campaign_id: CampaignId(args.campaign.clone()),
        supplier_id: SupplierId(args.supplier.clone()),
        from_number: args.from.clone(),
        to_number: args.to.clone(),
        timestamp: Utc::now(),
        trace_id: Uuid::new_v4().to_string(),
    };

    match engine.decide_route_with_retry(&request).await {
        RoutingOutcome::Routed(decision) => format!(
            "routed to buyer {} via offer {} ({} {})",
            decision.buyer_id.0,
            decision.offer_id.0,
            decision.destination_type.as_str(),
            decision.destination_value
        ),
        RoutingOutcome::NoRoute(reason) => format!("no route: {}", reason.as_str()),
    }
}

/// Walks the tiers without reserving anything and reports the first buyer whose
/// caps would currently admit a call.
async fn preview(
    catalog: &dyn OfferCatalog,
    args: &RouteArgs,
    candidate_page_size: u32,
) -> Result<String, StepError> {
    let campaign_id = CampaignId(args.campaign.clone());
    let mut page = CandidatePage::first(candidate_page_size);
    let mut candidates = Vec::new();
    loop {
        let batch = catalog
            .find_active_offers(&campaign_id, page)
            .await
            .map_err(|error| ("catalog_lookup", error.to_string(), 6u8))?;
        let last_page = page.is_last(batch.len());
        candidates.extend(batch);
        if last_page {
            break;
        }
        page = page.next();
    }

    Ok(describe_preview(&select_tiers(candidates)))
}

fn describe_preview(tiers: &[Tier]) -> String {
    if tiers.is_empty() {
        return "preview: no route: no_active_offers".to_string();
    }

    let mut lines = Vec::new();
    let mut chosen = None;
    for tier in tiers {
        for candidate in &tier.candidates {
            let blocked = candidate.buyer.caps.first_violation();
            let state = blocked.map_or("open", |violation| violation.as_str());
            lines.push(format!(
                "  tier {} buyer {} offer {}: {state}",
                tier.tier, candidate.buyer.id.0, candidate.offer.id.0
            ));
            if chosen.is_none() && blocked.is_none() {
                chosen = Some(candidate.buyer.id.0.clone());
            }
        }
    }

    let headline = match chosen {
        Some(buyer_id) => format!("preview: would route to buyer {buyer_id}"),
        None => "preview: no route: all_buyers_exhausted".to_string(),
    };
    format!("{headline}\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use dcx_core::caps::BuyerCaps;
    use dcx_core::routing::{select_tiers, RoutingCandidate};
    use dcx_db::fixtures::{demo_buyer, demo_offer};

    use super::describe_preview;

    fn candidate(buyer_id: &str, tier: i32, caps: BuyerCaps) -> RoutingCandidate {
        RoutingCandidate {
            buyer: demo_buyer(buyer_id, tier, 100, caps),
            offer: demo_offer("camp-1", buyer_id, 1_000, 60),
        }
    }

    #[test]
    fn preview_skips_capped_buyers_without_reserving() {
        let capped =
            BuyerCaps { daily_call_cap: Some(5), daily_calls_used: 5, ..BuyerCaps::default() };
        let tiers = select_tiers(vec![
            candidate("buyer-full", 1, capped),
            candidate("buyer-open", 2, BuyerCaps::default()),
        ]);

        let report = describe_preview(&tiers);

        assert!(report.starts_with("preview: would route to buyer buyer-open"));
        assert!(report.contains("tier 1 buyer buyer-full offer offer-buyer-full: daily_call_cap"));
        assert!(report.contains("tier 2 buyer buyer-open offer offer-buyer-open: open"));
    }

    #[test]
    fn preview_reports_empty_and_exhausted_campaigns() {
        assert_eq!(describe_preview(&[]), "preview: no route: no_active_offers");

        let capped = BuyerCaps { daily_call_cap: Some(0), ..BuyerCaps::default() };
        let tiers = select_tiers(vec![candidate("buyer-full", 1, capped)]);
        assert!(describe_preview(&tiers).starts_with("preview: no route: all_buyers_exhausted"));
    }
}
