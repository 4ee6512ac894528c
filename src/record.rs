//! Record value type and the query vocabulary over it.
//!
//! `updated_day` is always derived from `updated_at`; there is no way to set
//! it on its own, and rows that disagree are rejected when read back.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;

/// Format of the derived day key. Shared with display code, so it is fixed.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Calendar day of a timestamp, in UTC, as `YYYY-MM-DD`.
pub fn calendar_day(at: &DateTime<Utc>) -> String {
    at.format(DAY_FORMAT).to_string()
}

/// Uniformly random timestamp in `[epoch, now]` with millisecond precision.
pub fn random_timestamp<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> DateTime<Utc> {
    let upper = now.timestamp_millis().max(0);
    let millis = rng.gen_range(0..=upper);
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// A single persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    identifier: Uuid,
    updated_at: DateTime<Utc>,
    updated_day: String,
}

impl Record {
    /// Create a record with the given identifier and timestamp.
    ///
    /// The timestamp is truncated to milliseconds, the precision the store keeps.
    pub fn new(identifier: Uuid, updated_at: DateTime<Utc>) -> Self {
        let updated_at = truncate_to_millis(updated_at);
        Self {
            identifier,
            updated_day: calendar_day(&updated_at),
            updated_at,
        }
    }

    /// Create a record with a fresh identifier and a random timestamp up to `now`.
    pub fn random<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> Self {
        Self::new(crate::generate_record_id(), random_timestamp(now, rng))
    }

    /// Rebuild a record from its stored columns.
    pub fn from_row(
        identifier: &str,
        updated_at_millis: i64,
        updated_day: String,
    ) -> Result<Self, StoreError> {
        let identifier = Uuid::parse_str(identifier)
            .map_err(|e| StoreError::Validation(format!("bad identifier {identifier:?}: {e}")))?;
        let updated_at = DateTime::from_timestamp_millis(updated_at_millis).ok_or_else(|| {
            StoreError::Validation(format!("timestamp out of range: {updated_at_millis}"))
        })?;
        let record = Self {
            identifier,
            updated_at,
            updated_day,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn identifier(&self) -> Uuid {
        self.identifier
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn updated_day(&self) -> &str {
        &self.updated_day
    }

    /// Set the timestamp and recompute the day key.
    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = truncate_to_millis(at);
        self.updated_day = calendar_day(&self.updated_at);
    }

    /// Move the timestamp to a random instant in `[epoch, now]`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, now: DateTime<Utc>, rng: &mut R) {
        self.set_updated_at(random_timestamp(now, rng));
    }

    /// Check the identifier is present and the day key matches the timestamp.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.identifier.is_nil() {
            return Err(StoreError::Validation("missing identifier".into()));
        }
        let expected = calendar_day(&self.updated_at);
        if self.updated_day != expected {
            return Err(StoreError::Validation(format!(
                "record {} has day {} but timestamp falls on {expected}",
                self.identifier, self.updated_day
            )));
        }
        Ok(())
    }
}

/// Selection of records for counts and fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub day: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
}

impl Filter {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only records whose day key equals `day`.
    #[must_use]
    pub fn on_day(mut self, day: impl Into<String>) -> Self {
        self.day = Some(day.into());
        self
    }

    /// Only records updated at or after `at`.
    #[must_use]
    pub fn updated_since(mut self, at: DateTime<Utc>) -> Self {
        self.updated_since = Some(at);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.day.as_deref().map_or(true, |d| d == record.updated_day())
            && self.updated_since.map_or(true, |t| record.updated_at() >= t)
    }
}

/// Ordering of fetched records. Ties on `updated_at` fall back to the
/// identifier so that the order is total and pages never overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Most recently updated first.
    #[default]
    Newest,
    /// Least recently updated first.
    Oldest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_calendar_day_format() {
        let at = Utc.with_ymd_and_hms(2018, 10, 24, 23, 59, 59).unwrap();
        assert_eq!(calendar_day(&at), "2018-10-24");

        let early = Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(calendar_day(&early), "1970-01-02");
    }

    #[test]
    fn test_set_updated_at_recomputes_day() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap();
        let mut record = Record::new(Uuid::new_v4(), start);
        assert_eq!(record.updated_day(), "2020-01-01");

        record.set_updated_at(Utc.with_ymd_and_hms(2021, 6, 15, 0, 0, 0).unwrap());
        assert_eq!(record.updated_day(), "2021-06-15");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_random_timestamp_within_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let at = random_timestamp(now, &mut rng);
            assert!(at >= DateTime::<Utc>::UNIX_EPOCH);
            assert!(at <= now);
        }
    }

    #[test]
    fn test_new_truncates_to_millis() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let record = Record::new(Uuid::new_v4(), at);
        assert_eq!(record.updated_at().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_from_row_rejects_day_drift() {
        let id = Uuid::new_v4().to_string();
        let err = Record::from_row(&id, 0, "1999-01-01".into()).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let ok = Record::from_row(&id, 0, "1970-01-01".into()).unwrap();
        assert_eq!(ok.updated_at(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_nil_identifier_is_invalid() {
        let record = Record::new(Uuid::nil(), Utc::now());
        assert!(matches!(record.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_filter_matches() {
        let at = Utc.with_ymd_and_hms(2022, 2, 2, 2, 2, 2).unwrap();
        let record = Record::new(Uuid::new_v4(), at);

        assert!(Filter::all().matches(&record));
        assert!(Filter::all().on_day("2022-02-02").matches(&record));
        assert!(!Filter::all().on_day("2022-02-03").matches(&record));
        assert!(Filter::all().updated_since(at).matches(&record));
        assert!(!Filter::all()
            .updated_since(at + chrono::Duration::seconds(1))
            .matches(&record));
    }
}
