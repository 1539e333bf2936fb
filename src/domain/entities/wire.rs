//! Serde helpers for the backend's loose JSON conventions.
//!
//! The portal backend is inconsistent about identifiers (numbers or strings) and timestamps
//! (RFC 3339, zone-less ISO date-times, epoch millis, or Jackson's `[y, m, d, h, mi, s, ns]`
//! arrays), so everything coming off the wire goes through these.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Deserialize an identifier that may arrive as a JSON string or number
pub fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawId::deserialize(deserializer)?.into_string())
}

pub fn id_string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(RawId::into_string))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
    Parts(Vec<i64>),
}

impl RawTimestamp {
    fn into_datetime(self) -> Result<DateTime<Utc>, String> {
        match self {
            RawTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| format!("timestamp out of range: {}", ms)),
            RawTimestamp::Text(text) => parse_timestamp(&text),
            RawTimestamp::Parts(parts) => from_parts(&parts),
        }
    }
}

/// Parse the textual timestamp forms the backend emits.
///
/// Zone-less values are taken as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!("unrecognised timestamp: {}", text))
}

fn from_parts(parts: &[i64]) -> Result<DateTime<Utc>, String> {
    let part = |i: usize| parts.get(i).copied().unwrap_or(0);
    if parts.len() < 3 {
        return Err(format!("timestamp array too short: {:?}", parts));
    }
    let date = NaiveDate::from_ymd_opt(part(0) as i32, part(1) as u32, part(2) as u32)
        .ok_or_else(|| format!("invalid date in {:?}", parts))?;
    let naive = date
        .and_hms_nano_opt(part(3) as u32, part(4) as u32, part(5) as u32, part(6) as u32)
        .ok_or_else(|| format!("invalid time in {:?}", parts))?;
    Ok(Utc.from_utc_datetime(&naive))
}

pub mod timestamp {
    use super::*;

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawTimestamp::deserialize(deserializer)?
            .into_datetime()
            .map_err(de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<RawTimestamp>::deserialize(deserializer)?
                .map(RawTimestamp::into_datetime)
                .transpose()
                .map_err(de::Error::custom)
        }
    }
}
