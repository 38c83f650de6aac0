//! Diesel model structs representing persisted engine state.
//!
//! `rooms` and `appliance_groups` mirror the static building configuration;
//! `occupancy_samples` holds the single live sample per room;
//! `optimization_passes` and `audit_entries` are append-only outputs.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

// Standardized `audit_entries.source` tags.
pub mod audit_source {
    /// Operator accepted or reverted a recommendation.
    pub const USER_OPTIMIZATION: &str = "user_optimization";
    /// Synthetic toggle issued by the demo simulator.
    pub const SIMULATED_OPERATOR: &str = "simulated_operator";
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::rooms)]
pub struct RoomRow {
    pub id: i64,
    pub name: String,
    pub floor: Option<i32>,
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::rooms)]
pub struct NewRoom {
    pub id: i64,
    pub name: String,
    pub floor: Option<i32>,
    pub capacity: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::appliance_groups)]
#[diesel(belongs_to(RoomRow, foreign_key = room_id))]
pub struct ApplianceGroupRow {
    pub id: i64,
    pub room_id: i64,
    pub category: String,
    pub unit_count: i32,
    pub unit_power_watts: f64,
    pub total_power_watts: f64,
    pub active_count: i32,
    pub adjustable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::appliance_groups)]
pub struct NewApplianceGroup {
    pub id: i64,
    pub room_id: i64,
    pub category: String,
    pub unit_count: i32,
    pub unit_power_watts: f64,
    pub total_power_watts: f64,
    pub active_count: i32,
    pub adjustable: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::occupancy_samples)]
pub struct OccupancySampleRow {
    pub room_id: i64,
    pub people_count: i32,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::optimization_passes)]
#[diesel(belongs_to(RoomRow, foreign_key = room_id))]
pub struct OptimizationPassRow {
    pub id: i64,
    pub room_id: i64,
    pub created_at: DateTime<Utc>,
    pub people_count: i32,
    pub outside_temp_c: Option<f64>,
    pub max_load_watts: f64,
    pub current_load_watts: f64,
    pub saved_percent: i32,
    pub status: String,
    pub recommendations: serde_json::Value,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::optimization_passes)]
pub struct NewOptimizationPass {
    pub room_id: i64,
    pub created_at: DateTime<Utc>,
    pub people_count: i32,
    pub outside_temp_c: Option<f64>,
    pub max_load_watts: f64,
    pub current_load_watts: f64,
    pub saved_percent: i32,
    pub status: String,
    pub recommendations: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::audit_entries)]
pub struct AuditEntryRow {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub appliance_group_id: i64,
    pub status: String,
    pub load_percent: f64,
    pub estimated_power_watts: f64,
    pub source: String,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::audit_entries)]
pub struct NewAuditEntry {
    pub time: DateTime<Utc>,
    pub appliance_group_id: i64,
    pub status: String,
    pub load_percent: f64,
    pub estimated_power_watts: f64,
    pub source: String,
}
