use dcx_db::fixtures::seed_demo;
use dcx_db::SeedResult;

use crate::commands::{with_migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    let seeded = with_migrated_pool("seed", |_, pool| async move {
        seed_demo(&pool).await.map_err(|error| ("seed_execution", error.to_string(), 6u8))
    });

    match seeded {
        Ok(seed) => CommandResult::success("seed", summary(&seed)),
        Err(failure) => failure,
    }
}

fn summary(seed: &SeedResult) -> String {
    format!(
        "demo exchange seeded: campaign {} (supplier {}) on {} with buyers {}",
        seed.campaign_id,
        seed.supplier_id,
        seed.tracking_number,
        seed.buyer_ids.join(", ")
    )
}
