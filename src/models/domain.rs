//! Engine domain types: rooms, appliance groups, samples and recommendations.
//!
//! Scope: types only — persistence rows live in `crate::db::models`, and the
//! decision logic lives under `crate::services`.
//!
//! Notes
//! - Timestamps use `chrono` (`DateTime<Utc>`).
//! - Recommendation identity is stable: a recommendation id is the id of the
//!   appliance group it targets, so acceptance survives reordering between
//!   optimization passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{self, Display, Formatter};

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

/// Stable recommendation identity — the id of the targeted appliance group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationId(pub i64);

impl From<GroupId> for RecommendationId {
    fn from(value: GroupId) -> Self {
        RecommendationId(value.0)
    }
}

// =====================
// Configuration entities
// =====================

/// Closed set of appliance group categories, with the tags used in the
/// building config and the `appliance_groups.category` column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplianceCategory {
    #[serde(rename = "LIGHTING")]
    Lighting,
    #[serde(rename = "FAF")]
    FreshAirFan,
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "UPS")]
    Ups,
    #[serde(rename = "OTHER")]
    Other,
}

impl ApplianceCategory {
    pub fn as_tag(&self) -> &'static str {
        match self {
            ApplianceCategory::Lighting => "LIGHTING",
            ApplianceCategory::FreshAirFan => "FAF",
            ApplianceCategory::Ac => "AC",
            ApplianceCategory::Ups => "UPS",
            ApplianceCategory::Other => "OTHER",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "LIGHTING" => Some(ApplianceCategory::Lighting),
            "FAF" => Some(ApplianceCategory::FreshAirFan),
            "AC" => Some(ApplianceCategory::Ac),
            "UPS" => Some(ApplianceCategory::Ups),
            "OTHER" => Some(ApplianceCategory::Other),
            _ => None,
        }
    }

    /// UPS groups back critical equipment and are never recommended OFF.
    pub fn optimizable(&self) -> bool {
        !matches!(self, ApplianceCategory::Ups)
    }

    /// Categories whose drive level reacts to the outside temperature.
    pub fn weather_biased(&self) -> bool {
        matches!(self, ApplianceCategory::Ac | ApplianceCategory::FreshAirFan)
    }

    /// Stable evaluation/output rank: lighting, fan, AC, then the rest.
    pub fn rank(&self) -> u8 {
        match self {
            ApplianceCategory::Lighting => 0,
            ApplianceCategory::FreshAirFan => 1,
            ApplianceCategory::Ac => 2,
            ApplianceCategory::Ups => 3,
            ApplianceCategory::Other => 4,
        }
    }
}

impl Display for ApplianceCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub floor: Option<i32>,
    /// Maximum expected occupants; divisor for occupancy density.
    pub capacity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplianceGroup {
    pub id: GroupId,
    pub room_id: RoomId,
    pub category: ApplianceCategory,
    pub unit_count: i32,
    pub unit_power_watts: f64,
    /// Usually `unit_count * unit_power_watts`; config may override for
    /// non-uniform groups.
    pub total_power_watts: f64,
    pub active_count: i32,
    pub adjustable: bool,
}

// =====================
// Live inputs
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySample {
    pub room_id: RoomId,
    pub people_count: i32,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

/// Process-wide ambient conditions; absence only skips the bias step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub temperature_c: f64,
    pub observed_at: DateTime<Utc>,
}

// =====================
// Calculator / aggregator outputs
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerStatus {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl Display for PowerStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PowerStatus::On => f.write_str("ON"),
            PowerStatus::Off => f.write_str("OFF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub group_id: GroupId,
    pub category: ApplianceCategory,
    pub status: PowerStatus,
    /// 1..=10 drive level; `None` for non-adjustable groups and OFF targets.
    pub level: Option<u8>,
    /// AC target temperature in °C; `None` for non-AC groups and OFF targets.
    pub setpoint_c: Option<f64>,
    /// Whole watts for the recommended state.
    pub estimated_power_watts: f64,
}

impl Recommendation {
    /// Watts this recommendation would shed relative to the group at full load.
    pub fn potential_savings_watts(&self, group_total_power_watts: f64) -> f64 {
        (group_total_power_watts - self.estimated_power_watts).max(0.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    /// At least one recommendation with real savings awaits acceptance.
    OptimizationSuggested,
    OptimalEfficiency,
}

impl Display for RoomStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RoomStatus::OptimizationSuggested => f.write_str("OptimizationSuggested"),
            RoomStatus::OptimalEfficiency => f.write_str("OptimalEfficiency"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomLoadSummary {
    pub room_id: RoomId,
    pub max_load_watts: f64,
    pub current_load_watts: f64,
    pub watts_saved: f64,
    /// 0..=100, rounded.
    pub saved_percent: u8,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySummary {
    pub max_load_watts: f64,
    pub current_load_watts: f64,
    pub watts_saved: f64,
    pub saved_percent: u8,
}

// =====================
// Validation
// =====================

/// Malformed occupancy or configuration input, rejected before computation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NegativePeopleCount(i32),
    ConfidenceOutOfRange(f64),
    NonPositiveCapacity { room: RoomId, capacity: i32 },
    NonPositiveUnitCount { group: GroupId, unit_count: i32 },
    UnknownCategory(String),
    ForeignGroup { group: GroupId, room: RoomId },
    DuplicateRoom(RoomId),
    DuplicateGroup(GroupId),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NegativePeopleCount(n) => {
                write!(f, "people_count must be >= 0, got {}", n)
            }
            ValidationError::ConfidenceOutOfRange(c) => {
                write!(f, "confidence must be within [0, 1], got {}", c)
            }
            ValidationError::NonPositiveCapacity { room, capacity } => {
                write!(f, "room {} capacity must be positive, got {}", room.0, capacity)
            }
            ValidationError::NonPositiveUnitCount { group, unit_count } => {
                write!(f, "appliance group {} unit_count must be positive, got {}", group.0, unit_count)
            }
            ValidationError::UnknownCategory(tag) => write!(f, "unknown appliance category: {}", tag),
            ValidationError::ForeignGroup { group, room } => {
                write!(f, "appliance group {} does not belong to room {}", group.0, room.0)
            }
            ValidationError::DuplicateRoom(room) => write!(f, "duplicate room id {}", room.0),
            ValidationError::DuplicateGroup(group) => write!(f, "duplicate appliance group id {}", group.0),
        }
    }
}

impl Error for ValidationError {}
