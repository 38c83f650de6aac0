//! Load aggregation: merges recommendations with the acceptance ledger into
//! room-level and facility-level summaries.

use crate::models::domain::{
    ApplianceGroup, FacilitySummary, GroupId, Recommendation, RecommendationId, Room, RoomLoadSummary, RoomStatus,
};
use std::collections::{BTreeMap, BTreeSet};

pub fn summarize_room(
    room: &Room,
    groups: &[ApplianceGroup],
    recommendations: &[Recommendation],
    accepted: &BTreeSet<RecommendationId>,
) -> RoomLoadSummary {
    // Full-configuration ceiling: every unit of every group (UPS included) ON.
    let max_load_watts: f64 = groups.iter().map(|g| g.total_power_watts).sum();
    let totals: BTreeMap<GroupId, f64> = groups.iter().map(|g| (g.id, g.total_power_watts)).collect();

    let mut accepted_savings = 0.0;
    let mut suggestion_open = false;
    for rec in recommendations {
        let Some(total) = totals.get(&rec.group_id).copied() else {
            // Recommendation for a group no longer configured; nothing to save.
            continue;
        };
        let savings = rec.potential_savings_watts(total);
        if accepted.contains(&rec.id) {
            accepted_savings += savings;
        } else if savings > 0.0 {
            suggestion_open = true;
        }
    }

    // Per-recommendation savings are bounded by their own group's power, but
    // the room-level sum is capped regardless so load can never go negative.
    let watts_saved = accepted_savings.min(max_load_watts);
    let current_load_watts = max_load_watts - watts_saved;
    let saved_percent = percent_of(watts_saved, max_load_watts);
    let status = if suggestion_open {
        RoomStatus::OptimizationSuggested
    } else {
        RoomStatus::OptimalEfficiency
    };

    RoomLoadSummary {
        room_id: room.id,
        max_load_watts,
        current_load_watts,
        watts_saved,
        saved_percent,
        status,
    }
}

pub fn summarize_facility(summaries: &[RoomLoadSummary]) -> FacilitySummary {
    let max_load_watts: f64 = summaries.iter().map(|s| s.max_load_watts).sum();
    let current_load_watts: f64 = summaries.iter().map(|s| s.current_load_watts).sum();
    let watts_saved = max_load_watts - current_load_watts;

    FacilitySummary {
        max_load_watts,
        current_load_watts,
        watts_saved,
        saved_percent: percent_of(watts_saved, max_load_watts),
    }
}

fn percent_of(part: f64, whole: f64) -> u8 {
    if whole > 0.0 {
        (part / whole * 100.0).round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}
