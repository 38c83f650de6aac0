//! Keyed store for the live occupancy sample per room.
//!
//! `occupancy_samples` is keyed by room id: recording a sample replaces the
//! previous one (insert-and-evict-older), so reads always see at most one
//! live sample per room and old samples never accumulate.

use crate::db::models::OccupancySampleRow;
use crate::models::domain::{OccupancySample, RoomId, ValidationError};
use crate::schema;
use diesel::prelude::*;
use diesel::PgConnection;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Debug)]
pub enum SampleStoreError {
    Invalid(ValidationError),
    Database(diesel::result::Error),
}

impl Display for SampleStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SampleStoreError::Invalid(e) => write!(f, "invalid occupancy sample: {}", e),
            SampleStoreError::Database(e) => write!(f, "database error: {}", e),
        }
    }
}

impl Error for SampleStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SampleStoreError::Invalid(e) => Some(e),
            SampleStoreError::Database(e) => Some(e),
        }
    }
}

impl From<ValidationError> for SampleStoreError {
    fn from(value: ValidationError) -> Self {
        SampleStoreError::Invalid(value)
    }
}

impl From<diesel::result::Error> for SampleStoreError {
    fn from(value: diesel::result::Error) -> Self {
        SampleStoreError::Database(value)
    }
}

pub fn validate_sample(sample: &OccupancySample) -> Result<(), ValidationError> {
    if sample.people_count < 0 {
        return Err(ValidationError::NegativePeopleCount(sample.people_count));
    }
    if !(0.0..=1.0).contains(&sample.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange(sample.confidence));
    }
    Ok(())
}

/// Record the latest sample for a room, superseding any previous one.
/// Invalid samples are rejected with no effect on the store.
pub fn record_sample(conn: &mut PgConnection, sample: &OccupancySample) -> Result<(), SampleStoreError> {
    use schema::occupancy_samples::dsl as O;

    validate_sample(sample)?;

    let row = OccupancySampleRow {
        room_id: sample.room_id.0,
        people_count: sample.people_count,
        confidence: sample.confidence,
        detected_at: sample.detected_at,
    };
    diesel::insert_into(O::occupancy_samples)
        .values(&row)
        .on_conflict(O::room_id)
        .do_update()
        .set((
            O::people_count.eq(row.people_count),
            O::confidence.eq(row.confidence),
            O::detected_at.eq(row.detected_at),
        ))
        .execute(conn)?;
    Ok(())
}

/// Latest sample per room; rooms without a sample yet are simply absent.
pub fn latest_samples(conn: &mut PgConnection) -> Result<BTreeMap<RoomId, OccupancySample>, SampleStoreError> {
    use schema::occupancy_samples::dsl as O;

    let rows: Vec<OccupancySampleRow> = O::occupancy_samples.load(conn)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            (
                RoomId(row.room_id),
                OccupancySample {
                    room_id: RoomId(row.room_id),
                    people_count: row.people_count,
                    confidence: row.confidence,
                    detected_at: row.detected_at,
                },
            )
        })
        .collect())
}
