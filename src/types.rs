//! Parameter types: how a parameter is decoded and what its derived value means.
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::bits::BitReader;
use crate::calibrate::{Calibrator, Polynomial};
use crate::encoding::DataEncoding;
use crate::record::Record;
use crate::value::Value;
use crate::{Error, Result};

/// Reference time for time parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Epoch {
    /// 1958-01-01
    Tai,
    /// 2000-01-01T11:58:55.816 UTC
    J2000,
    /// 1970-01-01, also spelled POSIX
    Unix,
    /// 1980-01-06
    Gps,
    Custom(DateTime<Utc>),
}

impl Epoch {
    /// Epoch as (seconds, nanoseconds) since the UNIX epoch.
    fn unix_offset(&self) -> (i64, u32) {
        match self {
            Epoch::Tai => (-378_691_200, 0),
            Epoch::J2000 => (946_727_935, 816_000_000),
            Epoch::Unix => (0, 0),
            Epoch::Gps => (315_964_800, 0),
            Epoch::Custom(dt) => (dt.timestamp(), dt.timestamp_subsec_nanos()),
        }
    }

    /// The epoch as a UTC timestamp.
    ///
    /// # Errors
    /// [Error::InvalidSchema] if the epoch is not representable.
    pub fn datetime(&self) -> Result<DateTime<Utc>> {
        let (secs, nanos) = self.unix_offset();
        DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| Error::InvalidSchema(format!("epoch {self} out of range")))
    }
}

impl FromStr for Epoch {
    type Err = Error;

    /// Accepts `TAI`, `J2000`, `UNIX`, `POSIX`, `GPS`, or an `xs:date`/`xs:dateTime`
    /// literal. Literals without a zone are taken as UTC.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Ok(match s {
            "TAI" => Epoch::Tai,
            "J2000" => Epoch::J2000,
            "UNIX" | "POSIX" => Epoch::Unix,
            "GPS" => Epoch::Gps,
            _ => {
                let dt = DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .or_else(|_| {
                        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
                    })
                    .or_else(|_| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
                    })
                    .map_err(|_| Error::InvalidSchema(format!("unrecognized epoch {s:?}")))?;
                Epoch::Custom(dt)
            }
        })
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Epoch::Tai => write!(f, "TAI"),
            Epoch::J2000 => write!(f, "J2000"),
            Epoch::Unix => write!(f, "UNIX"),
            Epoch::Gps => write!(f, "GPS"),
            Epoch::Custom(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// Time specific properties of absolute and relative time types.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TimeReference {
    pub epoch: Option<Epoch>,
    /// Name of another time parameter this one is relative to. Carried for loaders; it
    /// does not affect decoding.
    pub offset_from: Option<String>,
    /// Seconds per raw unit.
    pub scale: Option<f64>,
    /// Seconds added after scaling.
    pub offset: Option<f64>,
}

impl TimeReference {
    /// The `offset + scale * x` polynomial, if either is set. An offset without a scale
    /// uses a scale of 1.
    #[must_use]
    pub fn scaler(&self) -> Option<Calibrator> {
        let mut terms = Vec::new();
        if let Some(offset) = self.offset {
            terms.push((offset, 0));
        }
        match (self.scale, self.offset) {
            (Some(scale), _) => terms.push((scale, 1)),
            (None, Some(_)) => terms.push((1.0, 1)),
            (None, None) => return None,
        }
        Some(Calibrator::Polynomial(Polynomial::new(&terms)))
    }

    /// Convert a derived number of seconds to a timestamp relative to the epoch. Returns
    /// `None` if there is no epoch. No leap second correction is performed.
    ///
    /// # Errors
    /// [Error::InvalidSchema] if `value` is not numeric or the result is out of range.
    pub fn to_datetime(&self, value: &Value) -> Result<Option<DateTime<Utc>>> {
        let Some(epoch) = &self.epoch else {
            return Ok(None);
        };
        let secs = value.as_f64().ok_or_else(|| {
            Error::InvalidSchema(format!("{} value is not a time offset", value.type_name()))
        })?;
        let nanos = (secs * 1e9).round();
        if !nanos.is_finite() || nanos.abs() > i64::MAX as f64 {
            return Err(Error::InvalidSchema(format!("time offset {secs} out of range")));
        }
        epoch
            .datetime()?
            .checked_add_signed(chrono::Duration::nanoseconds(nanos as i64))
            .map(Some)
            .ok_or_else(|| Error::InvalidSchema(format!("time offset {secs} out of range")))
    }
}

/// What kind of value a parameter type produces.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum TypeKind {
    #[default]
    Integer,
    Float,
    String,
    Binary,
    /// Raw integer value to label.
    Enumerated(Vec<(i128, String)>),
    /// Non-zero raw values are true.
    Boolean,
    AbsoluteTime(TimeReference),
    RelativeTime(TimeReference),
}

impl TypeKind {
    fn name(&self) -> &'static str {
        match self {
            TypeKind::Integer => "integer",
            TypeKind::Float => "float",
            TypeKind::String => "string",
            TypeKind::Binary => "binary",
            TypeKind::Enumerated(_) => "enumerated",
            TypeKind::Boolean => "boolean",
            TypeKind::AbsoluteTime(_) => "absolute time",
            TypeKind::RelativeTime(_) => "relative time",
        }
    }
}

/// Named description of how to decode and derive a value.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParameterType {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default, setter(strip_option, into))]
    pub unit: Option<String>,
    #[builder(default)]
    pub kind: TypeKind,
    #[builder(setter(into))]
    pub encoding: DataEncoding,
}

impl ParameterType {
    /// Check that the encoding can produce values of this kind.
    ///
    /// # Errors
    /// [Error::InvalidSchema] for incompatible combinations, [Error::Unsupported] for
    /// string or binary encoded booleans.
    pub fn validate(&self) -> Result<()> {
        let enc = &self.encoding;
        let ok = match &self.kind {
            TypeKind::Integer | TypeKind::Float => enc.is_numeric(),
            TypeKind::String => matches!(enc, DataEncoding::String(_)),
            TypeKind::Binary => matches!(enc, DataEncoding::Binary(_)),
            TypeKind::Enumerated(labels) => {
                let mut values: Vec<i128> = labels.iter().map(|(v, _)| *v).collect();
                values.sort_unstable();
                values.dedup();
                if values.len() != labels.len() {
                    return Err(Error::InvalidSchema(format!(
                        "enumeration {} has duplicate values",
                        self.name
                    )));
                }
                matches!(enc, DataEncoding::Integer(_))
            }
            TypeKind::Boolean => {
                if !enc.is_numeric() {
                    return Err(Error::Unsupported(format!(
                        "boolean type {} with a string or binary encoding",
                        self.name
                    )));
                }
                true
            }
            TypeKind::AbsoluteTime(_) | TypeKind::RelativeTime(_) => true,
        };
        if !ok {
            return Err(Error::InvalidSchema(format!(
                "{} type {} cannot use encoding {enc:?}",
                self.kind.name(),
                self.name
            )));
        }
        Ok(())
    }

    /// Read a value at the cursor, returning its `(raw, derived)` values.
    ///
    /// `record` holds the fields decoded so far and resolves dynamic lengths and
    /// calibrator criteria.
    ///
    /// # Errors
    /// Any error reading the encoding or deriving the value.
    pub fn decode(&self, reader: &mut BitReader, record: &Record) -> Result<(Value, Value)> {
        let raw = self.encoding.read(reader, record)?;
        let derived = match &self.kind {
            TypeKind::Enumerated(labels) => {
                let value = raw.as_i128().ok_or_else(|| {
                    Error::InvalidSchema(format!("enumeration {} requires integer values", self.name))
                })?;
                labels
                    .iter()
                    .find(|(v, _)| *v == value)
                    .map(|(_, label)| Value::String(label.clone()))
                    .ok_or_else(|| Error::Enumeration {
                        type_name: self.name.clone(),
                        value,
                    })?
            }
            TypeKind::Boolean => Value::Bool(raw.as_f64().is_some_and(|v| v != 0.0)),
            TypeKind::AbsoluteTime(time) | TypeKind::RelativeTime(time) => {
                let scaler = time.scaler();
                match self.encoding.calibration() {
                    Some(cal) => {
                        cal.apply_with_default(&raw, record, scaler.as_ref().or(cal.default.as_ref()))?
                    }
                    None => raw.clone(),
                }
            }
            _ => match self.encoding.calibration() {
                Some(cal) => cal.apply(&raw, record)?,
                None => raw.clone(),
            },
        };
        Ok((raw, derived))
    }

    /// Time reference for time types.
    #[must_use]
    pub fn time_reference(&self) -> Option<&TimeReference> {
        match &self.kind {
            TypeKind::AbsoluteTime(t) | TypeKind::RelativeTime(t) => Some(t),
            _ => None,
        }
    }
}
