//! Acceptance ledger and reconciliation engine.
//!
//! An operator toggle flips a recommendation between Unaccepted and Accepted,
//! moves one physical unit of the affected appliance group offline (or back
//! online) and appends an audit row. Count update and audit append run in one
//! transaction with the group row locked, so concurrent toggles on the same
//! group serialize instead of losing updates. If persistence fails the
//! in-memory flip is rolled back and the error surfaces to the caller.

use crate::db::models::NewAuditEntry;
use crate::models::domain::{GroupId, PowerStatus, RecommendationId, RoomId};
use crate::schema;
use crate::utils::round2;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::Mutex;

#[derive(Debug)]
pub enum AppliancePersistError {
    GroupNotFound(GroupId),
    Database(diesel::result::Error),
}

impl Display for AppliancePersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AppliancePersistError::GroupNotFound(g) => write!(f, "appliance group {} not found", g.0),
            AppliancePersistError::Database(e) => write!(f, "database error: {}", e),
        }
    }
}

impl Error for AppliancePersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppliancePersistError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<diesel::result::Error> for AppliancePersistError {
    fn from(value: diesel::result::Error) -> Self {
        AppliancePersistError::Database(value)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ToggleDirection {
    /// Recommendation newly accepted: one unit goes offline.
    Accept,
    /// Acceptance withdrawn: one unit comes back online.
    Unaccept,
}

impl Display for ToggleDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ToggleDirection::Accept => f.write_str("accepted"),
            ToggleDirection::Unaccept => f.write_str("reverted"),
        }
    }
}

/// Per-room sets of recommendation ids the operator has accepted.
///
/// Toggles on the same (room, recommendation) are ordered by the inner lock;
/// membership is exactly the most recent toggle state.
#[derive(Debug, Default)]
pub struct AcceptanceLedger {
    inner: Mutex<BTreeMap<RoomId, BTreeSet<RecommendationId>>>,
}

impl AcceptanceLedger {
    pub fn new() -> Self {
        AcceptanceLedger::default()
    }

    pub fn accepted_for(&self, room: RoomId) -> BTreeSet<RecommendationId> {
        let inner = self.inner.lock().expect("acceptance ledger poisoned");
        inner.get(&room).cloned().unwrap_or_default()
    }

    pub fn is_accepted(&self, room: RoomId, recommendation: RecommendationId) -> bool {
        let inner = self.inner.lock().expect("acceptance ledger poisoned");
        inner.get(&room).is_some_and(|set| set.contains(&recommendation))
    }

    fn flip(&self, room: RoomId, recommendation: RecommendationId) -> ToggleDirection {
        let mut inner = self.inner.lock().expect("acceptance ledger poisoned");
        let set = inner.entry(room).or_default();
        if set.insert(recommendation) {
            ToggleDirection::Accept
        } else {
            set.remove(&recommendation);
            ToggleDirection::Unaccept
        }
    }

    /// Undo a `flip` that could not be persisted.
    fn revert(&self, room: RoomId, recommendation: RecommendationId, direction: ToggleDirection) {
        let mut inner = self.inner.lock().expect("acceptance ledger poisoned");
        let set = inner.entry(room).or_default();
        match direction {
            ToggleDirection::Accept => {
                set.remove(&recommendation);
            }
            ToggleDirection::Unaccept => {
                set.insert(recommendation);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub room_id: RoomId,
    pub recommendation_id: RecommendationId,
    pub group_id: GroupId,
    pub direction: ToggleDirection,
    pub active_count: i32,
    pub unit_count: i32,
    pub status: PowerStatus,
    pub load_percent: f64,
    pub estimated_power_watts: f64,
}

/// Flip acceptance of a recommendation and reconcile the persisted unit count.
///
/// `watts_affected` is the saving carried by the recommendation; it is logged
/// for the trail but the count policy is one unit per toggle regardless.
pub fn toggle_acceptance(
    conn: &mut PgConnection,
    ledger: &AcceptanceLedger,
    source: &str,
    room_id: RoomId,
    recommendation_id: RecommendationId,
    group_id: GroupId,
    watts_affected: f64,
) -> Result<ReconciliationResult, AppliancePersistError> {
    let direction = ledger.flip(room_id, recommendation_id);

    match persist_toggle(conn, source, room_id, recommendation_id, group_id, direction) {
        Ok(result) => {
            info!(
                "Reconcile: room {} recommendation {} {} (group {}, active {}/{}, {:.2} W affected)",
                room_id.0,
                recommendation_id.0,
                direction,
                group_id.0,
                result.active_count,
                result.unit_count,
                watts_affected
            );
            Ok(result)
        }
        Err(e) => {
            warn!(
                "Reconcile: rolling back {} of recommendation {} in room {}: {}",
                direction, recommendation_id.0, room_id.0, e
            );
            ledger.revert(room_id, recommendation_id, direction);
            Err(e)
        }
    }
}

fn persist_toggle(
    conn: &mut PgConnection,
    source: &str,
    room_id: RoomId,
    recommendation_id: RecommendationId,
    group_id: GroupId,
    direction: ToggleDirection,
) -> Result<ReconciliationResult, AppliancePersistError> {
    use schema::appliance_groups::dsl as AG;
    use schema::audit_entries::dsl as AU;

    conn.transaction::<_, AppliancePersistError, _>(|conn| {
        // Row lock serializes concurrent toggles on the same group.
        let (unit_count, active_count, total_power_watts): (i32, i32, f64) = AG::appliance_groups
            .filter(AG::id.eq(group_id.0))
            .select((AG::unit_count, AG::active_count, AG::total_power_watts))
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(AppliancePersistError::GroupNotFound(group_id))?;

        let next_active = next_active_count(direction, active_count, unit_count);
        diesel::update(AG::appliance_groups.filter(AG::id.eq(group_id.0)))
            .set((AG::active_count.eq(next_active), AG::updated_at.eq(Utc::now())))
            .execute(conn)?;

        let (status, load_percent, estimated_power_watts) = audit_fields(next_active, unit_count, total_power_watts);
        let entry = NewAuditEntry {
            time: Utc::now(),
            appliance_group_id: group_id.0,
            status: status.to_string(),
            load_percent,
            estimated_power_watts,
            source: source.to_string(),
        };
        diesel::insert_into(AU::audit_entries).values(&entry).execute(conn)?;

        Ok(ReconciliationResult {
            room_id,
            recommendation_id,
            group_id,
            direction,
            active_count: next_active,
            unit_count,
            status,
            load_percent,
            estimated_power_watts,
        })
    })
}

/// One unit per toggle, clamped into [0, unit_count].
fn next_active_count(direction: ToggleDirection, active_count: i32, unit_count: i32) -> i32 {
    match direction {
        ToggleDirection::Accept => (active_count - 1).max(0),
        ToggleDirection::Unaccept => (active_count + 1).min(unit_count),
    }
}

fn audit_fields(active_count: i32, unit_count: i32, total_power_watts: f64) -> (PowerStatus, f64, f64) {
    let status = if active_count > 0 { PowerStatus::On } else { PowerStatus::Off };
    let load_percent = if unit_count > 0 {
        round2(f64::from(active_count) / f64::from(unit_count) * 100.0)
    } else {
        0.0
    };
    let estimated_power_watts = round2(load_percent / 100.0 * total_power_watts);
    (status, load_percent, estimated_power_watts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ROOM: RoomId = RoomId(1);
    const REC: RecommendationId = RecommendationId(11);

    #[test]
    fn toggling_twice_restores_the_ledger() {
        let ledger = AcceptanceLedger::new();

        assert_eq!(ledger.flip(ROOM, REC), ToggleDirection::Accept);
        assert!(ledger.is_accepted(ROOM, REC));
        assert_eq!(ledger.flip(ROOM, REC), ToggleDirection::Unaccept);
        assert!(!ledger.is_accepted(ROOM, REC));
        assert!(ledger.accepted_for(ROOM).is_empty());
    }

    #[test]
    fn revert_undoes_an_unpersisted_flip() {
        let ledger = AcceptanceLedger::new();

        let direction = ledger.flip(ROOM, REC);
        ledger.revert(ROOM, REC, direction);
        assert!(!ledger.is_accepted(ROOM, REC));

        // And the other way round: an un-accept that fails is restored.
        ledger.flip(ROOM, REC);
        let direction = ledger.flip(ROOM, REC);
        assert_eq!(direction, ToggleDirection::Unaccept);
        ledger.revert(ROOM, REC, direction);
        assert!(ledger.is_accepted(ROOM, REC));
    }

    #[test]
    fn rooms_are_ledgered_independently() {
        let ledger = AcceptanceLedger::new();
        ledger.flip(RoomId(1), REC);
        assert!(!ledger.is_accepted(RoomId(2), REC));
    }

    #[rstest]
    #[case(ToggleDirection::Accept, 8, 8, 7)]
    #[case(ToggleDirection::Accept, 1, 8, 0)]
    #[case(ToggleDirection::Accept, 0, 8, 0)]
    #[case(ToggleDirection::Unaccept, 7, 8, 8)]
    #[case(ToggleDirection::Unaccept, 8, 8, 8)]
    #[case(ToggleDirection::Unaccept, 0, 8, 1)]
    fn active_count_is_clamped(
        #[case] direction: ToggleDirection,
        #[case] active: i32,
        #[case] units: i32,
        #[case] expected: i32,
    ) {
        assert_eq!(next_active_count(direction, active, units), expected);
    }

    #[test]
    fn active_count_stays_in_bounds_for_any_toggle_sequence() {
        let unit_count = 8;
        let mut active = unit_count;
        let directions = [
            ToggleDirection::Accept,
            ToggleDirection::Accept,
            ToggleDirection::Unaccept,
            ToggleDirection::Accept,
        ];
        // 100 toggles cycling through a lopsided pattern.
        for i in 0..100 {
            active = next_active_count(directions[i % directions.len()], active, unit_count);
            assert!((0..=unit_count).contains(&active));
        }
    }

    #[test]
    fn accept_then_unaccept_restores_the_count() {
        let unit_count = 8;
        let start = 5;
        let down = next_active_count(ToggleDirection::Accept, start, unit_count);
        let back = next_active_count(ToggleDirection::Unaccept, down, unit_count);
        assert_eq!(back, start);
    }

    #[rstest]
    #[case(5, 8, 26860.0, PowerStatus::On, 62.5, 16787.5)]
    #[case(0, 8, 26860.0, PowerStatus::Off, 0.0, 0.0)]
    #[case(8, 8, 26860.0, PowerStatus::On, 100.0, 26860.0)]
    #[case(1, 3, 1000.0, PowerStatus::On, 33.33, 333.3)]
    fn audit_fields_follow_the_unit_ratio(
        #[case] active: i32,
        #[case] units: i32,
        #[case] total: f64,
        #[case] status: PowerStatus,
        #[case] load_percent: f64,
        #[case] estimated: f64,
    ) {
        let (s, lp, est) = audit_fields(active, units, total);
        assert_eq!(s, status);
        assert_eq!(lp, load_percent);
        assert_eq!(est, estimated);
    }
}
