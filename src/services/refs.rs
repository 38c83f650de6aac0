//! Reference-data sync: building configuration into the database, and the
//! domain view of what is currently persisted.
//!
//! Rooms and appliance groups are upserted from the building config at
//! startup. `active_count` is operator state, not configuration: it is seeded
//! at unit_count on first insert, survives re-syncs, and is clamped back into
//! [0, unit_count] when the configured unit count shrinks.

use crate::config::{ApplianceGroupConfig, BuildingConfig, RoomConfig};
use crate::db::models as dbm;
use crate::models::domain::{ApplianceCategory, ApplianceGroup, GroupId, Room, RoomId, ValidationError};
use crate::schema;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{info, warn};
use std::collections::BTreeMap;

pub fn sync_building(conn: &mut PgConnection, building: &BuildingConfig) -> Result<(), String> {
    info!("Refs: syncing {} room(s)", building.rooms.len());
    for room in &building.rooms {
        upsert_room(conn, room)?;
        for group in &room.appliance_groups {
            upsert_group(conn, room.room_id, group)?;
        }
        info!(
            "Refs: room {} complete ({} appliance group(s))",
            room.room_id,
            room.appliance_groups.len()
        );
    }
    Ok(())
}

fn upsert_room(conn: &mut PgConnection, room: &RoomConfig) -> Result<(), String> {
    use schema::rooms::dsl as R;

    let new_row = dbm::NewRoom {
        id: room.room_id,
        name: room.name.clone(),
        floor: room.floor,
        capacity: room.capacity,
    };
    diesel::insert_into(R::rooms)
        .values(&new_row)
        .on_conflict(R::id)
        .do_update()
        .set((
            R::name.eq(new_row.name.clone()),
            R::floor.eq(new_row.floor),
            R::capacity.eq(new_row.capacity),
            R::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .map_err(|e| format!("upsert room {} failed: {}", room.room_id, e))?;
    Ok(())
}

fn upsert_group(conn: &mut PgConnection, room_id: i64, group: &ApplianceGroupConfig) -> Result<(), String> {
    use schema::appliance_groups::dsl as AG;

    let category = group.category().map_err(|e| e.to_string())?;
    let new_row = dbm::NewApplianceGroup {
        id: group.group_id,
        room_id,
        category: category.as_tag().to_string(),
        unit_count: group.unit_count,
        unit_power_watts: group.unit_power_watts,
        total_power_watts: group.resolved_total_power_watts(),
        // New groups start with every physical unit active.
        active_count: group.unit_count,
        adjustable: group.adjustable,
    };
    diesel::insert_into(AG::appliance_groups)
        .values(&new_row)
        .on_conflict(AG::id)
        .do_update()
        .set((
            AG::room_id.eq(new_row.room_id),
            AG::category.eq(new_row.category.clone()),
            AG::unit_count.eq(new_row.unit_count),
            AG::unit_power_watts.eq(new_row.unit_power_watts),
            AG::total_power_watts.eq(new_row.total_power_watts),
            AG::adjustable.eq(new_row.adjustable),
            AG::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .map_err(|e| format!("upsert appliance group {} failed: {}", group.group_id, e))?;

    // A shrunk unit count may strand the persisted active_count above it.
    let row: dbm::ApplianceGroupRow = AG::appliance_groups
        .filter(AG::id.eq(group.group_id))
        .first(conn)
        .map_err(|e| format!("fetch appliance group {} failed: {}", group.group_id, e))?;
    let clamped = row.active_count.clamp(0, row.unit_count);
    if clamped != row.active_count {
        warn!(
            "Refs: clamping active_count of group {} from {} to {} (unit_count {})",
            row.id, row.active_count, clamped, row.unit_count
        );
        diesel::update(AG::appliance_groups.filter(AG::id.eq(row.id)))
            .set((AG::active_count.eq(clamped), AG::updated_at.eq(Utc::now())))
            .execute(conn)
            .map_err(|e| format!("clamp appliance group {} failed: {}", row.id, e))?;
    }
    Ok(())
}

pub fn group_from_row(row: &dbm::ApplianceGroupRow) -> Result<ApplianceGroup, ValidationError> {
    let category =
        ApplianceCategory::from_tag(&row.category).ok_or_else(|| ValidationError::UnknownCategory(row.category.clone()))?;
    Ok(ApplianceGroup {
        id: GroupId(row.id),
        room_id: RoomId(row.room_id),
        category,
        unit_count: row.unit_count,
        unit_power_watts: row.unit_power_watts,
        total_power_watts: row.total_power_watts,
        active_count: row.active_count,
        adjustable: row.adjustable,
    })
}

/// Load every room with its appliance groups, as the engine sees them.
pub fn load_building(conn: &mut PgConnection) -> Result<(Vec<Room>, BTreeMap<RoomId, Vec<ApplianceGroup>>), String> {
    use schema::appliance_groups::dsl as AG;
    use schema::rooms::dsl as R;

    let room_rows: Vec<dbm::RoomRow> = R::rooms.order(R::id).load(conn).map_err(|e| format!("load rooms failed: {}", e))?;
    let rooms: Vec<Room> = room_rows
        .iter()
        .map(|row| Room {
            id: RoomId(row.id),
            name: row.name.clone(),
            floor: row.floor,
            capacity: row.capacity,
        })
        .collect();

    let group_rows: Vec<dbm::ApplianceGroupRow> = AG::appliance_groups
        .order(AG::id)
        .load(conn)
        .map_err(|e| format!("load appliance groups failed: {}", e))?;

    let mut groups: BTreeMap<RoomId, Vec<ApplianceGroup>> = BTreeMap::new();
    for row in &group_rows {
        let group = group_from_row(row).map_err(|e| format!("appliance group {}: {}", row.id, e))?;
        groups.entry(group.room_id).or_default().push(group);
    }
    Ok((rooms, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(category: &str, unit_count: i32, active_count: i32) -> dbm::ApplianceGroupRow {
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap();
        dbm::ApplianceGroupRow {
            id: 11,
            room_id: 1,
            category: category.to_string(),
            unit_count,
            unit_power_watts: 3357.5,
            total_power_watts: 26860.0,
            active_count,
            adjustable: true,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn converts_rows_to_domain_groups() {
        let group = group_from_row(&row("AC", 8, 6)).unwrap();
        assert_eq!(group.category, ApplianceCategory::Ac);
        assert_eq!(group.id, GroupId(11));
        assert_eq!(group.active_count, 6);
    }

    #[test]
    fn rejects_rows_with_unknown_categories() {
        let err = group_from_row(&row("GEOTHERMAL", 8, 6)).unwrap_err();
        assert_eq!(err, ValidationError::UnknownCategory("GEOTHERMAL".to_string()));
    }
}
