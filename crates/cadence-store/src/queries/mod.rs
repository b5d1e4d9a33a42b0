pub mod actions;
pub mod blockers;
pub mod checkpoints;
pub mod decisions;
pub mod documents;
pub mod projects;
pub mod samples;
pub mod sessions;
pub mod snapshots;
pub mod symbols;
pub mod ui_state;

use chrono::{DateTime, Utc};

use crate::{Error, Result};

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

pub(crate) fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        Some(s) => parse_ts(&s).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn to_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}
