//! Replica-set view (`replSetGetStatus`) of one metric block.
//!
//! Member names are strings, so they never make it into the numeric series.
//! The view is read from the block's reference document instead, which gives
//! one status per block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bson::{Document, Value};

pub const STATE_PRIMARY: i32 = 1;
pub const STATE_SECONDARY: i32 = 2;
pub const STATE_ARBITER: i32 = 7;

/// One entry of `replSetGetStatus.members`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ReplSetMember {
    /// `host:port`.
    pub name: String,
    pub state: i32,
    /// Seconds part of the member's last applied optime.
    pub optime_secs: u64,
}

impl ReplSetMember {
    fn from_document(doc: &Document) -> Option<Self> {
        let name = doc.get("name")?.as_str()?.to_string();
        let state = doc.get("state").and_then(Value::as_i64).unwrap_or(0) as i32;
        let optime_secs = doc.get("optime").map(optime_secs).unwrap_or(0);
        Some(Self {
            name,
            state,
            optime_secs,
        })
    }

    /// Chart legend: first host label plus port
    /// (`db01.example.net:27017` → `db01:27017`).
    pub fn legend(&self) -> String {
        match (self.name.find('.'), self.name.rfind(':')) {
            (Some(dot), Some(colon)) if dot < colon => {
                format!("{}{}", &self.name[..dot], &self.name[colon..])
            }
            _ => self.name.clone(),
        }
    }
}

/// Protocol version 1 wraps the timestamp as `{ts, t}`; version 0 stores it
/// bare.
fn optime_secs(value: &Value) -> u64 {
    match value {
        Value::Timestamp { t, .. } => u64::from(*t),
        Value::Document(doc) => match doc.get("ts") {
            Some(Value::Timestamp { t, .. }) => u64::from(*t),
            _ => 0,
        },
        _ => 0,
    }
}

/// `replSetGetStatus` of one block, members sorted by name.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ReplSetStatus {
    pub date: DateTime<Utc>,
    pub members: Vec<ReplSetMember>,
}

impl ReplSetStatus {
    /// Reads `replSetGetStatus` from a block reference document. `None` for
    /// standalone servers or when the section has no members.
    pub fn from_reference(doc: &Document) -> Option<Self> {
        let status = doc.get_document("replSetGetStatus")?;
        let date = match status.get("date")? {
            Value::DateTime(ms) => DateTime::from_timestamp_millis(*ms)?,
            _ => return None,
        };
        let Some(Value::Array(items)) = status.get("members") else {
            return None;
        };
        let mut members: Vec<ReplSetMember> = items
            .iter()
            .filter_map(|item| match item {
                Value::Document(d) => ReplSetMember::from_document(d),
                _ => None,
            })
            .collect();
        if members.is_empty() {
            return None;
        }
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Some(Self { date, members })
    }

    pub fn primary(&self) -> Option<&ReplSetMember> {
        self.members.iter().find(|m| m.state == STATE_PRIMARY)
    }

    /// Seconds each member is behind the primary. Secondaries are measured
    /// against the primary's optime, arbiters are left out and every other
    /// state reads 0. `None` while the set has no primary.
    pub fn lags(&self) -> Option<Vec<(&ReplSetMember, u64)>> {
        let primary = self.primary()?.optime_secs;
        Some(
            self.members
                .iter()
                .filter(|m| m.state != STATE_ARBITER)
                .map(|m| {
                    let lag = if m.state == STATE_SECONDARY {
                        primary.saturating_sub(m.optime_secs)
                    } else {
                        0
                    };
                    (m, lag)
                })
                .collect(),
        )
    }
}
