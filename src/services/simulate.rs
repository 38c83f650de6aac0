//! Synthetic occupancy and operator activity for demo deployments without
//! the camera or operator collaborators attached.
//!
//! Occupancy per room follows a seeded random walk written through the real
//! sample store; once recommendations exist, the simulator occasionally
//! accepts or reverts one, driving the full reconciliation path.

use crate::db::models::audit_source;
use crate::models::domain::{OccupancySample, Recommendation, Room, RoomId};
use crate::services::occupancy;
use crate::services::reconcile::{self, AcceptanceLedger};
use chrono::Utc;
use diesel::PgConnection;
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const SIM_SEED: u64 = 0x5EED_CAFE_F00D_BEEFu64;
const MAX_STEP: i32 = 2;
const TOGGLE_PROBABILITY: f64 = 0.05;

pub struct Simulator {
    rng: SmallRng,
    counts: BTreeMap<RoomId, i32>,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        Simulator {
            rng: SmallRng::seed_from_u64(seed),
            counts: BTreeMap::new(),
        }
    }

    pub fn with_default_seed() -> Self {
        Simulator::new(SIM_SEED)
    }

    /// Advance every room's occupancy one step and record the new samples.
    pub fn step_occupancy(&mut self, conn: &mut PgConnection, rooms: &[Room]) {
        for room in rooms {
            let current = self.counts.get(&room.id).copied().unwrap_or(0);
            let next = walk(&mut self.rng, current, room.capacity);
            self.counts.insert(room.id, next);

            let sample = OccupancySample {
                room_id: room.id,
                people_count: next,
                confidence: self.rng.random_range(0.85..=0.99),
                detected_at: Utc::now(),
            };
            if let Err(e) = occupancy::record_sample(conn, &sample) {
                warn!("Sim: failed to record sample for room {}: {}", room.id.0, e);
            }
        }
    }

    /// Occasionally act like an operator and toggle one recommendation.
    pub fn maybe_toggle(
        &mut self,
        conn: &mut PgConnection,
        ledger: &AcceptanceLedger,
        room_id: RoomId,
        recommendations: &[Recommendation],
    ) {
        if recommendations.is_empty() || !self.rng.random_bool(TOGGLE_PROBABILITY) {
            return;
        }
        let pick = self.rng.random_range(0..recommendations.len());
        let rec = &recommendations[pick];

        info!(
            "Sim: toggling recommendation {} ({} {}) in room {}",
            rec.id.0, rec.category, rec.status, room_id.0
        );
        if let Err(e) = reconcile::toggle_acceptance(
            conn,
            ledger,
            audit_source::SIMULATED_OPERATOR,
            room_id,
            rec.id,
            rec.group_id,
            rec.estimated_power_watts,
        ) {
            warn!("Sim: toggle failed in room {}: {}", room_id.0, e);
        }
    }
}

/// Random step of at most `MAX_STEP` occupants, clamped to [0, capacity].
fn walk(rng: &mut SmallRng, current: i32, capacity: i32) -> i32 {
    (current + rng.random_range(-MAX_STEP..=MAX_STEP)).clamp(0, capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_stays_within_room_bounds() {
        let mut rng = SmallRng::seed_from_u64(SIM_SEED);
        let capacity = 20;
        let mut current = 0;
        for _ in 0..1000 {
            let next = walk(&mut rng, current, capacity);
            assert!((0..=capacity).contains(&next));
            assert!((next - current).abs() <= MAX_STEP);
            current = next;
        }
    }

    #[test]
    fn seeded_walks_are_reproducible() {
        let mut a = SmallRng::seed_from_u64(42);
        let mut b = SmallRng::seed_from_u64(42);
        let walk_a: Vec<i32> = (0..50).scan(0, |c, _| {
            *c = walk(&mut a, *c, 20);
            Some(*c)
        }).collect();
        let walk_b: Vec<i32> = (0..50).scan(0, |c, _| {
            *c = walk(&mut b, *c, 20);
            Some(*c)
        }).collect();
        assert_eq!(walk_a, walk_b);
    }
}
