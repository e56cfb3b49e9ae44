use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Option side as the token API spells it (`ce`/`pe`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Ce,
    Pe,
}

impl OptionType {
    pub const BOTH: [OptionType; 2] = [OptionType::Ce, OptionType::Pe];

    pub fn as_str(self) -> &'static str {
        match self {
            OptionType::Ce => "ce",
            OptionType::Pe => "pe",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized tick: the topic it arrived on, the last traded
/// price, and whatever instrument metadata the pipeline could attach.
/// Immutable once built; owned by the batch buffer until flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub topic: String,
    pub ltp: f64,
    pub index_name: Option<String>,
    pub option_type: Option<OptionType>,
    pub strike: Option<i32>,
    pub received_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(topic: impl Into<String>, ltp: f64) -> Self {
        Self {
            topic: topic.into(),
            ltp,
            index_name: None,
            option_type: None,
            strike: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }
}

/// Per-index instrument parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    /// Distance between adjacent strikes for this index.
    pub strike_step: u32,
    /// Option expiry date the token API expects, `DD-MM-YYYY`.
    pub expiry_date: String,
}

/// Round a price to the nearest multiple of the index strike step.
pub fn atm_strike(ltp: f64, strike_step: u32) -> i64 {
    let step = strike_step.max(1) as f64;
    (ltp / step).round() as i64 * strike_step.max(1) as i64
}

/// Symmetric strike ladder around `atm`, `half_width` steps in each
/// direction (so `2 * half_width + 1` strikes in total).
pub fn strike_ladder(atm: i64, strike_step: u32, half_width: u32) -> Vec<i64> {
    let step = strike_step.max(1) as i64;
    let half = half_width as i64;
    (-half..=half).map(|k| atm + k * step).collect()
}

/// Topic an index tick is published on.
pub fn index_topic(prefix: &str, index_name: &str) -> String {
    format!("{}/{}", prefix, index_name)
}

/// Topic an option instrument is subscribed on once its token is known.
pub fn option_topic(prefix: &str, token: &str) -> String {
    format!("{}/NSE_FO|{}", prefix, token)
}

/// The index name a topic refers to, if it is under the index prefix.
pub fn index_name_from_topic<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    topic
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|name| !name.is_empty())
}
