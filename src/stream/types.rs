//! Core data types for the partitioned stream pipeline.
//!
//! Message IDs and partition keys are structured values with a defined total
//! order, not ad hoc strings. Records travel as flat string field maps, the
//! wire shape of the backing log service's hashes, with typed views on top.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A two-part message identifier, monotonically increasing within a partition.
///
/// Rendered as `{unixSeconds}-{sequence}`. The timestamp component is
/// authoritative for deriving the event's hour of day. IDs are
/// partition-local: there is no ordering relation across partitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MessageId {
    /// Unix timestamp in seconds
    pub timestamp: u64,
    /// Per-second sequence number
    pub seq: u64,
}

impl MessageId {
    /// The "read from the start" sentinel (`0-0`).
    pub const ZERO: MessageId = MessageId {
        timestamp: 0,
        seq: 0,
    };

    pub fn new(timestamp: u64, seq: u64) -> Self {
        Self { timestamp, seq }
    }

    /// Whether this is the zero sentinel.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// UTC hour of day (0-23) derived from the timestamp component.
    pub fn hour(&self) -> u32 {
        ((self.timestamp % 86_400) / 3_600) as u32
    }

    /// The timestamp component as a UTC datetime, if representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp, self.seq)
    }
}

impl FromStr for MessageId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, seq) = match s.split_once('-') {
            Some((ts, seq)) => (ts, seq),
            // A bare timestamp (e.g. "0") means sequence zero.
            None => (s, "0"),
        };

        let timestamp = ts
            .parse::<u64>()
            .map_err(|_| ParseError::MessageId(s.to_string()))?;
        let seq = seq
            .parse::<u64>()
            .map_err(|_| ParseError::MessageId(s.to_string()))?;

        Ok(Self { timestamp, seq })
    }
}

/// Identifies one date-sharded partition of the event log.
///
/// Rendered as `{base}:{YYYYMMDD}`. Partitions are ordered by embedded date;
/// the successor is the same base one calendar day later.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub base: String,
    pub date: NaiveDate,
}

impl PartitionKey {
    pub fn new(base: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            base: base.into(),
            date,
        }
    }

    /// The partition one calendar day after this one, same base.
    pub fn successor(&self) -> PartitionKey {
        PartitionKey {
            base: self.base.clone(),
            date: self.date + Duration::days(1),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base, self.date.format("%Y%m%d"))
    }
}

impl FromStr for PartitionKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, date_str) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseError::PartitionKey(s.to_string()))?;

        if base.is_empty() {
            return Err(ParseError::PartitionKey(s.to_string()));
        }

        let date = NaiveDate::parse_from_str(date_str, "%Y%m%d")
            .map_err(|_| ParseError::PartitionKey(s.to_string()))?;

        Ok(Self {
            base: base.to_string(),
            date,
        })
    }
}

/// One appended record: its ID plus a flat field map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: MessageId,
    pub fields: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn new(id: MessageId, fields: BTreeMap<String, String>) -> Self {
        Self { id, fields }
    }
}

/// Field name carrying the temperature reading.
pub const TEMP_FIELD: &str = "temp_f";

/// A typed view over a sensor reading entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempReading {
    /// Temperature in whole degrees Fahrenheit
    pub temp_f: i64,
}

impl TempReading {
    pub fn new(temp_f: i64) -> Self {
        Self { temp_f }
    }

    /// Decode a reading from a log entry.
    ///
    /// A missing or non-numeric temperature is an error, not a skip: silently
    /// dropping a reading would corrupt the running average undetectably.
    pub fn from_entry(entry: &LogEntry) -> Result<Self, DecodeError> {
        let raw = entry
            .fields
            .get(TEMP_FIELD)
            .ok_or_else(|| DecodeError::MissingField(TEMP_FIELD.to_string()))?;
        let temp_f = raw.parse::<i64>().map_err(|_| DecodeError::Invalid {
            field: TEMP_FIELD.to_string(),
            value: raw.clone(),
        })?;
        Ok(Self { temp_f })
    }

    /// Render the reading as a wire field map.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(TEMP_FIELD.to_string(), self.temp_f.to_string())])
    }
}

/// A finalized hourly average record, published once per completed hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyAverage {
    /// Hour of day (0-23) the bucket covered
    pub hour: u32,
    /// Date tag (`YYYY/MM/DD`), derived from the message that closed the bucket
    pub date: String,
    /// Floor of the bucket's mean temperature
    pub average_temp_f: i64,
}

impl HourlyAverage {
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("hour".to_string(), self.hour.to_string()),
            ("date".to_string(), self.date.clone()),
            (
                "average_temp_f".to_string(),
                self.average_temp_f.to_string(),
            ),
        ])
    }

    pub fn from_entry(entry: &LogEntry) -> Result<Self, DecodeError> {
        Ok(Self {
            hour: parse_field(&entry.fields, "hour")?,
            date: entry
                .fields
                .get("date")
                .cloned()
                .ok_or_else(|| DecodeError::MissingField("date".to_string()))?,
            average_temp_f: parse_field(&entry.fields, "average_temp_f")?,
        })
    }
}

/// Full resume snapshot for the hourly aggregator.
///
/// Written after each message is fully folded into the bucket (or the bucket
/// is emitted), never mid-update: reapplying the snapshot and replaying the
/// log strictly after `last_message_id` reproduces the in-flight bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorCheckpoint {
    /// Partition currently being consumed
    pub partition: PartitionKey,
    /// Last message folded into state; resume strictly after it
    pub last_message_id: MessageId,
    /// Running sum for the in-flight hour bucket
    pub hourly_total: i64,
    /// Running count for the in-flight hour bucket
    pub hourly_count: u64,
}

impl AggregatorCheckpoint {
    /// A fresh start at the beginning of the given partition.
    pub fn fresh(partition: PartitionKey) -> Self {
        Self {
            partition,
            last_message_id: MessageId::ZERO,
            hourly_total: 0,
            hourly_count: 0,
        }
    }

    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("current_stream_key".to_string(), self.partition.to_string()),
            (
                "last_message_id".to_string(),
                self.last_message_id.to_string(),
            ),
            (
                "current_hourly_total".to_string(),
                self.hourly_total.to_string(),
            ),
            (
                "current_hourly_count".to_string(),
                self.hourly_count.to_string(),
            ),
        ])
    }

    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, DecodeError> {
        Ok(Self {
            partition: parse_field(fields, "current_stream_key")?,
            last_message_id: parse_field(fields, "last_message_id")?,
            hourly_total: parse_field(fields, "current_hourly_total")?,
            hourly_count: parse_field(fields, "current_hourly_count")?,
        })
    }
}

/// Resume position for the averages consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AveragesCheckpoint {
    pub last_message_id: MessageId,
}

impl AveragesCheckpoint {
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "last_message_id".to_string(),
            self.last_message_id.to_string(),
        )])
    }

    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, DecodeError> {
        Ok(Self {
            last_message_id: parse_field(fields, "last_message_id")?,
        })
    }
}

fn parse_field<T>(fields: &BTreeMap<String, String>, name: &str) -> Result<T, DecodeError>
where
    T: FromStr,
{
    let raw = fields
        .get(name)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))?;
    raw.parse::<T>().map_err(|_| DecodeError::Invalid {
        field: name.to_string(),
        value: raw.clone(),
    })
}

/// Errors parsing composite identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MessageId(String),
    PartitionKey(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MessageId(s) => write!(f, "invalid message ID: {s:?}"),
            ParseError::PartitionKey(s) => write!(f, "invalid partition key: {s:?}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors decoding typed records from wire field maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    MissingField(String),
    Invalid { field: String, value: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingField(name) => write!(f, "missing field {name:?}"),
            DecodeError::Invalid { field, value } => {
                write!(f, "invalid value {value:?} for field {field:?}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Helper: the date of a message id formatted as the averages record expects.
pub(crate) fn format_record_date(id: MessageId) -> Result<String, DecodeError> {
    let dt = id.datetime().ok_or_else(|| DecodeError::Invalid {
        field: "timestamp".to_string(),
        value: id.timestamp.to_string(),
    })?;
    Ok(format!(
        "{:04}/{:02}/{:02}",
        dt.year(),
        dt.month(),
        dt.day()
    ))
}
