//! Steady-cadence optimization loop.
//!
//! Each tick reads the live occupancy samples and the outside weather,
//! debounces per-room changes into a single pass, computes recommendations
//! for the affected rooms in parallel (pure, no shared state between rooms),
//! then aggregates against the acceptance ledger and persists one
//! optimization pass per room for the presentation layer.

use crate::client::WeatherClient;
use crate::config::Config;
use crate::db::models::NewOptimizationPass;
use crate::models::domain::{
    OccupancySample, Recommendation, Room, RoomId, RoomLoadSummary, ValidationError, WeatherSample,
};
use crate::services::reconcile::AcceptanceLedger;
use crate::services::simulate::Simulator;
use crate::services::{aggregate, occupancy, optimizer, refs};
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::thread;
use std::time::{Duration, Instant};

/// A collaborator could not be reached; the engine degrades instead of failing.
#[derive(Debug)]
pub enum OptimizationUnavailable {
    Occupancy(String),
    Weather(String),
}

impl Display for OptimizationUnavailable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationUnavailable::Occupancy(e) => write!(f, "occupancy collaborator unavailable: {}", e),
            OptimizationUnavailable::Weather(e) => write!(f, "weather collaborator unavailable: {}", e),
        }
    }
}

impl Error for OptimizationUnavailable {}

/// Batches per-room change notifications: rooms marked within one window
/// drain together once the window has elapsed.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeSet<RoomId>,
    since: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            pending: BTreeSet::new(),
            since: None,
        }
    }

    pub fn mark(&mut self, room: RoomId, now: Instant) {
        self.pending.insert(room);
        self.since.get_or_insert(now);
    }

    /// Drain the pending set once the batch window has elapsed.
    pub fn take_ready(&mut self, now: Instant) -> Option<BTreeSet<RoomId>> {
        let since = self.since?;
        if now.duration_since(since) < self.window {
            return None;
        }
        self.since = None;
        Some(std::mem::take(&mut self.pending))
    }
}

pub fn run_loop(
    conn: &mut PgConnection,
    config: &Config,
    weather_client: Option<&WeatherClient>,
    ledger: &AcceptanceLedger,
) -> Result<(), String> {
    let (rooms, _) = refs::load_building(conn)?;
    if rooms.is_empty() {
        return Err("No rooms configured; nothing to optimize".into());
    }

    let mut debouncer = Debouncer::new(config.debounce_window);
    let mut last_seen: BTreeMap<RoomId, OccupancySample> = BTreeMap::new();
    let mut latest_weather: Option<WeatherSample> = None;
    let mut last_weather_fetch: Option<Instant> = None;
    let mut simulator = config.simulate_occupancy.then(Simulator::with_default_seed);

    // Initial pass covers every room, with or without a live sample.
    let startup = Instant::now();
    for room in &rooms {
        debouncer.mark(room.id, startup);
    }

    loop {
        let tick_start = Instant::now();

        if let Some(simulator) = simulator.as_mut() {
            simulator.step_occupancy(conn, &rooms);
        }

        // Occupancy changes mark their room; a read failure degrades to the
        // samples from the previous tick.
        match occupancy::latest_samples(conn) {
            Ok(samples) => {
                for (room_id, sample) in samples {
                    if last_seen.get(&room_id) != Some(&sample) {
                        debouncer.mark(room_id, tick_start);
                        last_seen.insert(room_id, sample);
                    }
                }
            }
            Err(e) => warn!("{}", OptimizationUnavailable::Occupancy(e.to_string())),
        }

        // Weather changes affect the bias step in every room.
        if let Some(client) = weather_client {
            let due = last_weather_fetch.is_none_or(|at| tick_start.duration_since(at) >= config.weather_refresh);
            if due {
                last_weather_fetch = Some(tick_start);
                match client.current_conditions() {
                    Ok(sample) => {
                        if latest_weather.as_ref().map(|w| w.temperature_c) != Some(sample.temperature_c) {
                            for room in &rooms {
                                debouncer.mark(room.id, tick_start);
                            }
                        }
                        latest_weather = Some(sample);
                    }
                    Err(e) => warn!("{}", OptimizationUnavailable::Weather(e.to_string())),
                }
            }
        }

        if let Some(dirty) = debouncer.take_ready(Instant::now()) {
            let recommendations = run_pass(conn, config, &rooms, &dirty, &last_seen, latest_weather.as_ref(), ledger)?;
            if let Some(simulator) = simulator.as_mut() {
                for (room_id, recs) in &recommendations {
                    simulator.maybe_toggle(conn, ledger, *room_id, recs);
                }
            }
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < config.poll_interval {
            thread::sleep(config.poll_interval - elapsed);
        }
    }
}

/// Run one optimization pass over the dirty rooms. Computation is parallel
/// and strictly precedes aggregation for the same room; per-room failures are
/// logged and do not stop the remaining rooms.
fn run_pass(
    conn: &mut PgConnection,
    config: &Config,
    rooms: &[Room],
    dirty: &BTreeSet<RoomId>,
    samples: &BTreeMap<RoomId, OccupancySample>,
    weather: Option<&WeatherSample>,
    ledger: &AcceptanceLedger,
) -> Result<BTreeMap<RoomId, Vec<Recommendation>>, String> {
    // Fresh group state: active counts move underneath us between passes.
    let (_, groups_by_room) = refs::load_building(conn)?;

    let targets: Vec<&Room> = rooms.iter().filter(|room| dirty.contains(&room.id)).collect();
    let mut computed: Vec<(RoomId, OccupancySample, Result<Vec<Recommendation>, ValidationError>)> =
        Vec::with_capacity(targets.len());

    thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|room| {
                let groups = groups_by_room.get(&room.id).cloned().unwrap_or_default();
                let sample = samples.get(&room.id).cloned().unwrap_or_else(|| fallback_sample(room.id));
                let settings = &config.optimizer;
                scope.spawn(move || {
                    let result = optimizer::compute_recommendations(room, &sample, weather, &groups, settings);
                    (room.id, sample, result)
                })
            })
            .collect();
        for handle in handles {
            match handle.join() {
                Ok(outcome) => computed.push(outcome),
                Err(_) => error!("Pass: optimization worker panicked"),
            }
        }
    });

    let mut recommendations = BTreeMap::new();
    let mut summaries: Vec<RoomLoadSummary> = Vec::new();
    for (room_id, sample, result) in computed {
        let recs = match result {
            Ok(recs) => recs,
            Err(e) => {
                // Local failure; the remaining rooms keep optimizing.
                error!("Pass: room {} rejected: {}", room_id.0, e);
                continue;
            }
        };
        let Some(room) = rooms.iter().find(|r| r.id == room_id) else {
            continue;
        };
        let groups = groups_by_room.get(&room_id).cloned().unwrap_or_default();

        let accepted = ledger.accepted_for(room_id);
        let summary = aggregate::summarize_room(room, &groups, &recs, &accepted);
        info!(
            "Pass: room {} people={} status={} load={:.0}/{:.0} W saved={}%",
            room_id.0,
            sample.people_count,
            summary.status,
            summary.current_load_watts,
            summary.max_load_watts,
            summary.saved_percent
        );
        insert_pass(conn, &sample, weather, &recs, &summary);
        summaries.push(summary);
        recommendations.insert(room_id, recs);
    }

    if !summaries.is_empty() {
        let facility = aggregate::summarize_facility(&summaries);
        info!(
            "Pass: facility load={:.0}/{:.0} W saved={}% across {} room(s)",
            facility.current_load_watts,
            facility.max_load_watts,
            facility.saved_percent,
            summaries.len()
        );
    }

    Ok(recommendations)
}

/// Rooms with no live sample ever are optimized as empty.
fn fallback_sample(room_id: RoomId) -> OccupancySample {
    OccupancySample {
        room_id,
        people_count: 0,
        confidence: 1.0,
        detected_at: Utc::now(),
    }
}

fn insert_pass(
    conn: &mut PgConnection,
    sample: &OccupancySample,
    weather: Option<&WeatherSample>,
    recommendations: &[Recommendation],
    summary: &RoomLoadSummary,
) {
    use crate::schema::optimization_passes::dsl as P;

    let payload = match serde_json::to_value(recommendations) {
        Ok(v) => v,
        Err(e) => {
            warn!("Pass: failed to serialize recommendations for room {}: {}", summary.room_id.0, e);
            return;
        }
    };
    let row = NewOptimizationPass {
        room_id: summary.room_id.0,
        created_at: Utc::now(),
        people_count: sample.people_count,
        outside_temp_c: weather.map(|w| w.temperature_c),
        max_load_watts: summary.max_load_watts,
        current_load_watts: summary.current_load_watts,
        saved_percent: i32::from(summary.saved_percent),
        status: summary.status.to_string(),
        recommendations: payload,
    };
    if let Err(e) = diesel::insert_into(P::optimization_passes).values(&row).execute(conn) {
        warn!("Pass: failed to persist pass for room {}: {}", summary.room_id.0, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    #[test]
    fn nothing_ready_before_the_window_elapses() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.mark(RoomId(1), start);
        assert_eq!(debouncer.take_ready(start), None);
        assert_eq!(debouncer.take_ready(start + Duration::from_millis(499)), None);
    }

    #[test]
    fn changes_within_a_window_batch_into_one_pass() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.mark(RoomId(1), start);
        debouncer.mark(RoomId(2), start + Duration::from_millis(200));
        debouncer.mark(RoomId(1), start + Duration::from_millis(400));

        let ready = debouncer.take_ready(start + WINDOW).expect("window elapsed");
        assert_eq!(ready, BTreeSet::from([RoomId(1), RoomId(2)]));
        // Drained; a new mark starts a fresh window.
        assert_eq!(debouncer.take_ready(start + WINDOW), None);
    }

    #[test]
    fn window_is_anchored_to_the_first_mark() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.mark(RoomId(1), start);
        // A late arrival does not push the deadline out.
        debouncer.mark(RoomId(2), start + Duration::from_millis(450));
        let ready = debouncer.take_ready(start + WINDOW).expect("window elapsed");
        assert_eq!(ready.len(), 2);
    }

    #[test]
    fn marks_after_a_drain_open_a_new_window() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.mark(RoomId(1), start);
        debouncer.take_ready(start + WINDOW).expect("first drain");

        let later = start + Duration::from_secs(10);
        debouncer.mark(RoomId(3), later);
        assert_eq!(debouncer.take_ready(later + Duration::from_millis(100)), None);
        assert_eq!(
            debouncer.take_ready(later + WINDOW),
            Some(BTreeSet::from([RoomId(3)]))
        );
    }

    #[test]
    fn rooms_without_samples_are_treated_as_empty() {
        let sample = fallback_sample(RoomId(7));
        assert_eq!(sample.people_count, 0);
        assert_eq!(sample.room_id, RoomId(7));
    }
}
