//! OpenSky state vectors: the raw positional tuple delivered by the
//! `/states/all` endpoint and the validated row persisted in `state_vectors`.
//!
//! Field order of a raw state vector (OpenSky REST API):
//!
//! | idx | field           | idx | field           |
//! |-----|-----------------|-----|-----------------|
//! | 0   | icao24          | 9   | velocity        |
//! | 1   | callsign        | 10  | true_track      |
//! | 2   | origin_country  | 11  | vertical_rate   |
//! | 3   | time_position   | 12  | sensors         |
//! | 4   | last_contact    | 13  | geo_altitude    |
//! | 5   | longitude       | 14  | squawk          |
//! | 6   | latitude        | 15  | spi             |
//! | 7   | baro_altitude   | 16  | position_source |
//! | 8   | on_ground       |     |                 |

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimum number of positional fields a state vector must carry.
pub const STATE_VECTOR_FIELDS: usize = 17;

const ICAO24: usize = 0;
const CALLSIGN: usize = 1;
const ORIGIN_COUNTRY: usize = 2;
const TIME_POSITION: usize = 3;
const LAST_CONTACT: usize = 4;
const LONGITUDE: usize = 5;
const LATITUDE: usize = 6;
const BARO_ALTITUDE: usize = 7;
const ON_GROUND: usize = 8;
const VELOCITY: usize = 9;
const TRUE_TRACK: usize = 10;
const VERTICAL_RATE: usize = 11;
const SENSORS: usize = 12;
const GEO_ALTITUDE: usize = 13;
const SQUAWK: usize = 14;
const SPI: usize = 15;
const POSITION_SOURCE: usize = 16;

/// One element of the `states` array, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawObservation(pub Value);

impl RawObservation {
    /// The positional fields, or `None` when the element is not an array.
    pub fn fields(&self) -> Option<&[Value]> {
        self.0.as_array().map(Vec::as_slice)
    }
}

impl From<Vec<Value>> for RawObservation {
    fn from(fields: Vec<Value>) -> Self {
        Self(Value::Array(fields))
    }
}

/// Why a raw observation was not turned into a [`StateVector`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("state vector is not an array")]
    NotAnArray,
    #[error("state vector has {actual} fields, expected at least {}", STATE_VECTOR_FIELDS)]
    TooFewFields { actual: usize },
    #[error("icao24 is missing or blank")]
    MissingIdentity,
    #[error("last_contact is not an integer")]
    InvalidLastContact,
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("true_track {0} outside [0, 360]")]
    TrueTrackOutOfRange(f64),
    #[error("{field} is not 0 or 1")]
    InvalidFlag { field: &'static str },
    #[error("position_source {0} is not 0, 1 or 2")]
    PositionSourceOutOfRange(i64),
    #[error("{field} has an unexpected type")]
    WrongType { field: &'static str },
}

impl RejectReason {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::NotAnArray | RejectReason::TooFewFields { .. } => "shape",
            RejectReason::MissingIdentity => "identity",
            RejectReason::InvalidLastContact => "last_contact",
            RejectReason::LongitudeOutOfRange(_)
            | RejectReason::LatitudeOutOfRange(_)
            | RejectReason::TrueTrackOutOfRange(_)
            | RejectReason::PositionSourceOutOfRange(_) => "range",
            RejectReason::InvalidFlag { .. } => "flag",
            RejectReason::WrongType { .. } => "type",
        }
    }
}

/// A validated aircraft state, one row of `state_vectors`.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = crate::schema::state_vectors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StateVector {
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: String,
    pub time_position: Option<i64>,
    pub last_contact: i64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub on_ground: bool,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    /// Receiver IDs as delivered, serialized to JSON text.
    pub sensors: Option<String>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub spi: bool,
    pub position_source: Option<i32>,
    /// UTC time of the fetch that produced this row; shared by the whole batch.
    pub fetch_time: NaiveDateTime,
}

impl StateVector {
    /// Validate one raw observation and coerce it into a row.
    ///
    /// Checks run in a fixed order and stop at the first failure. Squawk
    /// codes that are not four characters after trimming are dropped rather
    /// than rejected.
    pub fn from_raw(raw: &RawObservation, fetch_time: DateTime<Utc>) -> Result<Self, RejectReason> {
        let fields = raw.fields().ok_or(RejectReason::NotAnArray)?;
        if fields.len() < STATE_VECTOR_FIELDS {
            return Err(RejectReason::TooFewFields {
                actual: fields.len(),
            });
        }

        let icao24 = match &fields[ICAO24] {
            Value::String(s) if !s.trim().is_empty() => s.clone(),
            _ => return Err(RejectReason::MissingIdentity),
        };
        let last_contact = fields[LAST_CONTACT]
            .as_i64()
            .ok_or(RejectReason::InvalidLastContact)?;
        let origin_country = fields[ORIGIN_COUNTRY]
            .as_str()
            .ok_or(RejectReason::WrongType {
                field: "origin_country",
            })?
            .to_string();

        let longitude = optional_f64(&fields[LONGITUDE], "longitude")?;
        if let Some(lon) = longitude
            && !(-180.0..=180.0).contains(&lon)
        {
            return Err(RejectReason::LongitudeOutOfRange(lon));
        }

        let latitude = optional_f64(&fields[LATITUDE], "latitude")?;
        if let Some(lat) = latitude
            && !(-90.0..=90.0).contains(&lat)
        {
            return Err(RejectReason::LatitudeOutOfRange(lat));
        }

        let true_track = optional_f64(&fields[TRUE_TRACK], "true_track")?;
        if let Some(track) = true_track
            && !(0.0..=360.0).contains(&track)
        {
            return Err(RejectReason::TrueTrackOutOfRange(track));
        }

        let on_ground = binary_flag(&fields[ON_GROUND], "on_ground")?;
        let spi = binary_flag(&fields[SPI], "spi")?;

        let squawk = optional_str(&fields[SQUAWK], "squawk")?
            .map(str::trim)
            .filter(|code| code.chars().count() == 4)
            .map(str::to_string);

        let callsign = optional_str(&fields[CALLSIGN], "callsign")?
            .map(|cs| cs.trim().to_uppercase())
            .filter(|cs| !cs.is_empty());

        let position_source = match optional_i64(&fields[POSITION_SOURCE], "position_source")? {
            None => None,
            Some(source @ 0..=2) => Some(source as i32),
            Some(other) => return Err(RejectReason::PositionSourceOutOfRange(other)),
        };

        let sensors = match &fields[SENSORS] {
            Value::Null => None,
            other => Some(other.to_string()),
        };

        Ok(Self {
            icao24,
            callsign,
            origin_country,
            time_position: optional_i64(&fields[TIME_POSITION], "time_position")?,
            last_contact,
            longitude,
            latitude,
            baro_altitude: optional_f64(&fields[BARO_ALTITUDE], "baro_altitude")?,
            on_ground,
            velocity: optional_f64(&fields[VELOCITY], "velocity")?,
            true_track,
            vertical_rate: optional_f64(&fields[VERTICAL_RATE], "vertical_rate")?,
            sensors,
            geo_altitude: optional_f64(&fields[GEO_ALTITUDE], "geo_altitude")?,
            squawk,
            spi,
            position_source,
            fetch_time: fetch_time.naive_utc(),
        })
    }

    /// `fetch_time` as a UTC timestamp.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetch_time.and_utc()
    }
}

fn optional_f64(value: &Value, field: &'static str) -> Result<Option<f64>, RejectReason> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or(RejectReason::WrongType { field }),
        _ => Err(RejectReason::WrongType { field }),
    }
}

fn optional_i64(value: &Value, field: &'static str) -> Result<Option<i64>, RejectReason> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or(RejectReason::WrongType { field }),
        _ => Err(RejectReason::WrongType { field }),
    }
}

fn optional_str<'a>(value: &'a Value, field: &'static str) -> Result<Option<&'a str>, RejectReason> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.as_str())),
        _ => Err(RejectReason::WrongType { field }),
    }
}

/// Upstream sends booleans; older dumps carry 0/1.
fn binary_flag(value: &Value, field: &'static str) -> Result<bool, RejectReason> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Ok(false),
            Some(v) if v == 1.0 => Ok(true),
            _ => Err(RejectReason::InvalidFlag { field }),
        },
        _ => Err(RejectReason::InvalidFlag { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fetch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    fn ual123() -> Vec<Value> {
        vec![
            json!("ABC123"),
            json!("UAL123  "),
            json!("United States"),
            json!(1000),
            json!(1005),
            json!(-120.5),
            json!(37.5),
            json!(10000),
            json!(0),
            json!(250.0),
            json!(90.0),
            json!(0),
            Value::Null,
            json!(10500),
            json!("1200"),
            json!(0),
            json!(0),
        ]
    }

    fn with_field(index: usize, value: Value) -> RawObservation {
        let mut fields = ual123();
        fields[index] = value;
        RawObservation::from(fields)
    }

    #[test]
    fn test_accepts_reference_tuple() {
        let sv = StateVector::from_raw(&RawObservation::from(ual123()), fetch_time()).unwrap();

        assert_eq!(sv.icao24, "ABC123");
        assert_eq!(sv.callsign.as_deref(), Some("UAL123"));
        assert_eq!(sv.origin_country, "United States");
        assert_eq!(sv.time_position, Some(1000));
        assert_eq!(sv.last_contact, 1005);
        assert_eq!(sv.longitude, Some(-120.5));
        assert_eq!(sv.latitude, Some(37.5));
        assert_eq!(sv.baro_altitude, Some(10000.0));
        assert!(!sv.on_ground);
        assert_eq!(sv.true_track, Some(90.0));
        assert_eq!(sv.sensors, None);
        assert_eq!(sv.squawk.as_deref(), Some("1200"));
        assert!(!sv.spi);
        assert_eq!(sv.position_source, Some(0));
        assert_eq!(sv.fetched_at(), fetch_time());
    }

    #[test]
    fn test_rejects_latitude_out_of_range() {
        let raw = with_field(LATITUDE, json!(95.0));
        assert_eq!(
            StateVector::from_raw(&raw, fetch_time()),
            Err(RejectReason::LatitudeOutOfRange(95.0))
        );
    }

    #[test]
    fn test_rejects_longitude_and_track_out_of_range() {
        for lon in [-180.5, 181.0, 1e9] {
            let raw = with_field(LONGITUDE, json!(lon));
            assert!(matches!(
                StateVector::from_raw(&raw, fetch_time()),
                Err(RejectReason::LongitudeOutOfRange(_))
            ));
        }
        for track in [-0.1, 360.1] {
            let raw = with_field(TRUE_TRACK, json!(track));
            assert!(matches!(
                StateVector::from_raw(&raw, fetch_time()),
                Err(RejectReason::TrueTrackOutOfRange(_))
            ));
        }
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let mut fields = ual123();
        fields[LONGITUDE] = json!(180.0);
        fields[LATITUDE] = json!(-90.0);
        fields[TRUE_TRACK] = json!(360.0);
        assert!(StateVector::from_raw(&RawObservation::from(fields), fetch_time()).is_ok());
    }

    #[test]
    fn test_absent_position_is_accepted() {
        let mut fields = ual123();
        fields[LONGITUDE] = Value::Null;
        fields[LATITUDE] = Value::Null;
        fields[TRUE_TRACK] = Value::Null;
        let sv = StateVector::from_raw(&RawObservation::from(fields), fetch_time()).unwrap();
        assert_eq!(sv.longitude, None);
        assert_eq!(sv.latitude, None);
        assert_eq!(sv.true_track, None);
    }

    #[test]
    fn test_rejects_short_tuples() {
        for len in [0, 1, 16] {
            let raw = RawObservation::from(ual123().into_iter().take(len).collect::<Vec<_>>());
            assert_eq!(
                StateVector::from_raw(&raw, fetch_time()),
                Err(RejectReason::TooFewFields { actual: len })
            );
        }
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let mut fields = ual123();
        fields.push(json!(3));
        assert!(StateVector::from_raw(&RawObservation::from(fields), fetch_time()).is_ok());
    }

    #[test]
    fn test_rejects_non_array() {
        let raw = RawObservation(json!({"icao24": "ABC123"}));
        assert_eq!(
            StateVector::from_raw(&raw, fetch_time()),
            Err(RejectReason::NotAnArray)
        );
    }

    #[test]
    fn test_short_squawk_becomes_absent() {
        let raw = with_field(SQUAWK, json!("12"));
        let sv = StateVector::from_raw(&raw, fetch_time()).unwrap();
        assert_eq!(sv.squawk, None);
        assert_eq!(sv.callsign.as_deref(), Some("UAL123"));
    }

    #[test]
    fn test_squawk_is_trimmed_before_length_check() {
        let sv = StateVector::from_raw(&with_field(SQUAWK, json!(" 7700 ")), fetch_time()).unwrap();
        assert_eq!(sv.squawk.as_deref(), Some("7700"));

        let sv = StateVector::from_raw(&with_field(SQUAWK, json!("77000")), fetch_time()).unwrap();
        assert_eq!(sv.squawk, None);
    }

    #[test]
    fn test_identity_and_last_contact_required() {
        for icao in [Value::Null, json!(""), json!("   "), json!(42)] {
            assert_eq!(
                StateVector::from_raw(&with_field(ICAO24, icao), fetch_time()),
                Err(RejectReason::MissingIdentity)
            );
        }
        for contact in [Value::Null, json!(1005.5), json!(1005.0), json!("1005")] {
            assert_eq!(
                StateVector::from_raw(&with_field(LAST_CONTACT, contact), fetch_time()),
                Err(RejectReason::InvalidLastContact)
            );
        }
    }

    #[test]
    fn test_flags_accept_bools_and_binary_numbers() {
        let sv = StateVector::from_raw(&with_field(ON_GROUND, json!(true)), fetch_time()).unwrap();
        assert!(sv.on_ground);
        let sv = StateVector::from_raw(&with_field(SPI, json!(1)), fetch_time()).unwrap();
        assert!(sv.spi);

        for bad in [json!(2), json!(-1), Value::Null, json!("0")] {
            assert_eq!(
                StateVector::from_raw(&with_field(ON_GROUND, bad.clone()), fetch_time()),
                Err(RejectReason::InvalidFlag { field: "on_ground" })
            );
            assert_eq!(
                StateVector::from_raw(&with_field(SPI, bad), fetch_time()),
                Err(RejectReason::InvalidFlag { field: "spi" })
            );
        }
    }

    #[test]
    fn test_wrong_types_reject_single_record() {
        assert_eq!(
            StateVector::from_raw(&with_field(CALLSIGN, json!(123)), fetch_time()),
            Err(RejectReason::WrongType { field: "callsign" })
        );
        assert_eq!(
            StateVector::from_raw(&with_field(VELOCITY, json!("fast")), fetch_time()),
            Err(RejectReason::WrongType { field: "velocity" })
        );
        assert_eq!(
            StateVector::from_raw(&with_field(ORIGIN_COUNTRY, Value::Null), fetch_time()),
            Err(RejectReason::WrongType {
                field: "origin_country"
            })
        );
    }

    #[test]
    fn test_position_source_range() {
        let sv = StateVector::from_raw(&with_field(POSITION_SOURCE, json!(2)), fetch_time()).unwrap();
        assert_eq!(sv.position_source, Some(2));
        assert_eq!(
            StateVector::from_raw(&with_field(POSITION_SOURCE, json!(3)), fetch_time()),
            Err(RejectReason::PositionSourceOutOfRange(3))
        );
    }

    #[test]
    fn test_callsign_normalization() {
        let sv = StateVector::from_raw(&with_field(CALLSIGN, json!("  dlh4ab ")), fetch_time()).unwrap();
        assert_eq!(sv.callsign.as_deref(), Some("DLH4AB"));

        let sv = StateVector::from_raw(&with_field(CALLSIGN, json!("        ")), fetch_time()).unwrap();
        assert_eq!(sv.callsign, None);
    }

    #[test]
    fn test_sensors_kept_as_json_text() {
        let sv = StateVector::from_raw(&with_field(SENSORS, json!([1, 2])), fetch_time()).unwrap();
        assert_eq!(sv.sensors.as_deref(), Some("[1,2]"));
    }

    #[test]
    fn test_integer_floats_are_widened() {
        // baro_altitude arrives as an integer in the reference tuple
        let sv = StateVector::from_raw(&with_field(VELOCITY, json!(250)), fetch_time()).unwrap();
        assert_eq!(sv.velocity, Some(250.0));
    }
}
