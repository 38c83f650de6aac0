//! Recommendation calculator: maps occupancy, weather and appliance
//! configuration to a target power state per appliance group.
//!
//! Pure and deterministic — identical inputs yield identical recommendation
//! lists, which makes re-optimization idempotent. The only failure path is
//! input validation; UPS groups are excluded from optimization entirely.

use crate::config::OptimizerSettings;
use crate::models::domain::{
    ApplianceCategory, ApplianceGroup, OccupancySample, PowerStatus, Recommendation, Room, ValidationError,
    WeatherSample,
};
use crate::utils::round_watts;

/// AC setpoint used when no outside temperature is known.
pub const AC_SETPOINT_FALLBACK_C: f64 = 24.0;

pub fn compute_recommendations(
    room: &Room,
    occupancy: &OccupancySample,
    weather: Option<&WeatherSample>,
    groups: &[ApplianceGroup],
    settings: &OptimizerSettings,
) -> Result<Vec<Recommendation>, ValidationError> {
    validate_inputs(room, occupancy, groups)?;

    let people = occupancy.people_count;
    let setpoint_c = ac_setpoint_c(weather);

    // Stable ordering: category rank, then group id. Recommendation ids are
    // the group ids, so acceptance state survives any reordering anyway.
    let mut ordered: Vec<&ApplianceGroup> = groups.iter().filter(|g| g.category.optimizable()).collect();
    ordered.sort_by_key(|g| (g.category.rank(), g.id));

    let mut recommendations = Vec::with_capacity(ordered.len());
    for group in ordered {
        if people < min_occupancy(group.category, settings) {
            recommendations.push(off_state(group));
            continue;
        }

        let level = if group.adjustable {
            let base = base_level(people, room.capacity);
            Some(if group.category.weather_biased() {
                apply_weather_bias(base, weather, settings)
            } else {
                base
            })
        } else {
            None
        };

        let estimated_power_watts = match level {
            Some(level) => round_watts(group.total_power_watts * f64::from(level) / 10.0),
            None => group.total_power_watts,
        };

        recommendations.push(Recommendation {
            id: group.id.into(),
            group_id: group.id,
            category: group.category,
            status: PowerStatus::On,
            level,
            setpoint_c: (group.category == ApplianceCategory::Ac).then_some(setpoint_c),
            estimated_power_watts,
        });
    }

    Ok(recommendations)
}

fn validate_inputs(room: &Room, occupancy: &OccupancySample, groups: &[ApplianceGroup]) -> Result<(), ValidationError> {
    if occupancy.people_count < 0 {
        return Err(ValidationError::NegativePeopleCount(occupancy.people_count));
    }
    if !(0.0..=1.0).contains(&occupancy.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange(occupancy.confidence));
    }
    if room.capacity <= 0 {
        return Err(ValidationError::NonPositiveCapacity {
            room: room.id,
            capacity: room.capacity,
        });
    }
    for group in groups {
        if group.room_id != room.id {
            return Err(ValidationError::ForeignGroup {
                group: group.id,
                room: room.id,
            });
        }
        if group.unit_count <= 0 {
            return Err(ValidationError::NonPositiveUnitCount {
                group: group.id,
                unit_count: group.unit_count,
            });
        }
    }
    Ok(())
}

fn off_state(group: &ApplianceGroup) -> Recommendation {
    Recommendation {
        id: group.id.into(),
        group_id: group.id,
        category: group.category,
        status: PowerStatus::Off,
        level: None,
        setpoint_c: None,
        estimated_power_watts: 0.0,
    }
}

fn min_occupancy(category: ApplianceCategory, settings: &OptimizerSettings) -> i32 {
    match category {
        ApplianceCategory::Lighting => settings.lighting_min_occupancy,
        ApplianceCategory::FreshAirFan => settings.fan_min_occupancy,
        ApplianceCategory::Ac => settings.ac_min_occupancy,
        // UPS never reaches here; anything uncategorized runs for any occupant.
        ApplianceCategory::Ups | ApplianceCategory::Other => 1,
    }
}

/// Drive level from occupancy density, before any weather bias.
fn base_level(people: i32, capacity: i32) -> u8 {
    let density = (f64::from(people) / f64::from(capacity)).clamp(0.0, 1.0);
    clamp_level((1.0 + density * 9.0).round() as i32)
}

fn apply_weather_bias(level: u8, weather: Option<&WeatherSample>, settings: &OptimizerSettings) -> u8 {
    let Some(weather) = weather else {
        return level;
    };
    let bias = i32::from(settings.weather_bias_levels);
    if weather.temperature_c > settings.hot_threshold_c {
        clamp_level(i32::from(level) + bias)
    } else if weather.temperature_c < settings.cold_threshold_c {
        clamp_level(i32::from(level) - bias)
    } else {
        level
    }
}

fn clamp_level(level: i32) -> u8 {
    level.clamp(1, 10) as u8
}

/// AC target temperature: T_base = 25 - floor((T_out - 25) / 4), clamped to
/// [22, 25] °C. Hotter outside means a cooler setpoint.
fn ac_setpoint_c(weather: Option<&WeatherSample>) -> f64 {
    match weather {
        Some(w) => (25.0 - ((w.temperature_c - 25.0) / 4.0).floor()).clamp(22.0, 25.0),
        None => AC_SETPOINT_FALLBACK_C,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::{GroupId, RoomId};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn room() -> Room {
        Room {
            id: RoomId(1),
            name: "MTA-1".to_string(),
            floor: Some(2),
            capacity: 20,
        }
    }

    fn group(id: i64, category: ApplianceCategory, unit_count: i32, total: f64, adjustable: bool) -> ApplianceGroup {
        ApplianceGroup {
            id: GroupId(id),
            room_id: RoomId(1),
            category,
            unit_count,
            unit_power_watts: total / f64::from(unit_count),
            total_power_watts: total,
            active_count: unit_count,
            adjustable,
        }
    }

    fn groups() -> Vec<ApplianceGroup> {
        vec![
            group(11, ApplianceCategory::Ac, 8, 26860.0, true),
            group(12, ApplianceCategory::Lighting, 32, 1152.0, false),
            group(13, ApplianceCategory::Ups, 2, 1800.0, false),
        ]
    }

    fn occupancy(people: i32) -> OccupancySample {
        OccupancySample {
            room_id: RoomId(1),
            people_count: people,
            confidence: 0.95,
            detected_at: Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap(),
        }
    }

    fn weather(temperature_c: f64) -> WeatherSample {
        WeatherSample {
            temperature_c,
            observed_at: Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap(),
        }
    }

    fn settings() -> OptimizerSettings {
        OptimizerSettings::default()
    }

    #[test]
    fn empty_room_turns_every_optimizable_group_off() {
        let recs = compute_recommendations(&room(), &occupancy(0), None, &groups(), &settings()).unwrap();

        // UPS is skipped entirely, the rest goes dark.
        assert_eq!(recs.len(), 2);
        for rec in &recs {
            assert_eq!(rec.status, PowerStatus::Off);
            assert_eq!(rec.estimated_power_watts, 0.0);
            assert_eq!(rec.level, None);
        }
    }

    #[test]
    fn single_occupant_lights_on_ac_stays_off() {
        let recs = compute_recommendations(&room(), &occupancy(1), None, &groups(), &settings()).unwrap();

        let lighting = recs.iter().find(|r| r.category == ApplianceCategory::Lighting).unwrap();
        let ac = recs.iter().find(|r| r.category == ApplianceCategory::Ac).unwrap();
        assert_eq!(lighting.status, PowerStatus::On);
        assert_eq!(lighting.estimated_power_watts, 1152.0);
        assert_eq!(ac.status, PowerStatus::Off);
    }

    #[test]
    fn hot_afternoon_drives_ac_to_level_eight() {
        let recs =
            compute_recommendations(&room(), &occupancy(10), Some(&weather(35.0)), &groups(), &settings()).unwrap();

        let ac = recs.iter().find(|r| r.category == ApplianceCategory::Ac).unwrap();
        assert_eq!(ac.status, PowerStatus::On);
        assert_eq!(ac.level, Some(8));
        assert_relative_eq!(ac.estimated_power_watts, 21488.0);
        assert_eq!(ac.setpoint_c, Some(23.0));

        let lighting = recs.iter().find(|r| r.category == ApplianceCategory::Lighting).unwrap();
        assert_eq!(lighting.status, PowerStatus::On);
        assert_eq!(lighting.level, None);
        assert_relative_eq!(lighting.estimated_power_watts, 1152.0);
    }

    #[rstest]
    #[case(2)]
    #[case(5)]
    #[case(10)]
    #[case(20)]
    fn warmer_weather_never_lowers_the_ac_level(#[case] people: i32) {
        let at = |t: f64| {
            let recs =
                compute_recommendations(&room(), &occupancy(people), Some(&weather(t)), &groups(), &settings())
                    .unwrap();
            recs.iter()
                .find(|r| r.category == ApplianceCategory::Ac)
                .and_then(|r| r.level)
                .unwrap()
        };
        assert!(at(35.0) >= at(25.0));
    }

    #[test]
    fn cold_weather_lowers_biased_levels() {
        let mut all = groups();
        all.push(group(14, ApplianceCategory::FreshAirFan, 4, 400.0, true));
        let recs = compute_recommendations(&room(), &occupancy(10), Some(&weather(15.0)), &all, &settings()).unwrap();

        // base level 6, cold bias -2
        let ac = recs.iter().find(|r| r.category == ApplianceCategory::Ac).unwrap();
        assert_eq!(ac.level, Some(4));
        let fan = recs.iter().find(|r| r.category == ApplianceCategory::FreshAirFan).unwrap();
        assert_eq!(fan.level, Some(4));
    }

    #[rstest]
    #[case(1, 20, 1)]
    #[case(10, 20, 6)]
    #[case(20, 20, 10)]
    #[case(50, 20, 10)]
    fn level_scales_with_density(#[case] people: i32, #[case] capacity: i32, #[case] expected: u8) {
        assert_eq!(base_level(people, capacity), expected);
    }

    #[rstest]
    #[case(Some(28.0), 25.0)]
    #[case(Some(30.0), 24.0)]
    #[case(Some(33.0), 23.0)]
    #[case(Some(40.0), 22.0)]
    #[case(Some(10.0), 25.0)]
    #[case(None, 24.0)]
    fn setpoint_follows_outside_temperature(#[case] outside: Option<f64>, #[case] expected: f64) {
        let sample = outside.map(weather);
        assert_eq!(ac_setpoint_c(sample.as_ref()), expected);
    }

    #[test]
    fn output_is_ordered_and_deterministic() {
        let mut shuffled = groups();
        shuffled.reverse();
        let a =
            compute_recommendations(&room(), &occupancy(10), Some(&weather(29.0)), &shuffled, &settings()).unwrap();
        let b =
            compute_recommendations(&room(), &occupancy(10), Some(&weather(29.0)), &shuffled, &settings()).unwrap();

        assert_eq!(a, b);
        let categories: Vec<_> = a.iter().map(|r| r.category).collect();
        assert_eq!(categories, vec![ApplianceCategory::Lighting, ApplianceCategory::Ac]);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let err = compute_recommendations(&room(), &occupancy(-1), None, &groups(), &settings()).unwrap_err();
        assert_eq!(err, ValidationError::NegativePeopleCount(-1));

        let mut sample = occupancy(3);
        sample.confidence = 1.5;
        let err = compute_recommendations(&room(), &sample, None, &groups(), &settings()).unwrap_err();
        assert_eq!(err, ValidationError::ConfidenceOutOfRange(1.5));

        let mut foreign = groups();
        foreign[0].room_id = RoomId(2);
        let err = compute_recommendations(&room(), &occupancy(3), None, &foreign, &settings()).unwrap_err();
        assert!(matches!(err, ValidationError::ForeignGroup { .. }));

        let mut bad_room = room();
        bad_room.capacity = 0;
        let err = compute_recommendations(&bad_room, &occupancy(3), None, &groups(), &settings()).unwrap_err();
        assert!(matches!(err, ValidationError::NonPositiveCapacity { .. }));
    }
}
