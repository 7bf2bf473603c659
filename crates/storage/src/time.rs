// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ISO-8601 timestamp formatting for the on-disk record format.
//!
//! Timestamps are epoch milliseconds in memory and
//! `YYYY-MM-DDTHH:MM:SS.mmmZ` on disk.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format epoch milliseconds as ISO-8601 UTC with millisecond precision.
pub fn format_epoch_ms(ms: u64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms as i64) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        // Unrepresentable (would require a timestamp ~300k years out)
        None => String::from("1970-01-01T00:00:00.000Z"),
    }
}

/// Parse an ISO-8601 timestamp back into epoch milliseconds.
pub fn parse_epoch_ms(s: &str) -> Result<u64, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(s)?;
    Ok(dt.timestamp_millis().max(0) as u64)
}

/// Serde adapter: `u64` epoch milliseconds <-> ISO-8601 string.
pub mod ts_millis {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ms: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_epoch_ms(*ms))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_epoch_ms(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional timestamps.
pub mod ts_millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ms: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match ms {
            Some(ms) => serializer.serialize_some(&super::format_epoch_ms(*ms)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => super::parse_epoch_ms(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod tests;
