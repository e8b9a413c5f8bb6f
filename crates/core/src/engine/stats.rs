use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::CloseReason;

/// Counters and values recorded over one job run.
///
/// Keys are sorted, so reports built from the same run are identical.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    started_at: DateTime<Utc>,
    values: BTreeMap<String, Value>,
}

impl StatsCollector {
    pub fn start() -> Self {
        Self::start_at(Utc::now())
    }

    pub fn start_at(started_at: DateTime<Utc>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            "start_time".to_string(),
            Value::String(started_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Self { started_at, values }
    }

    pub fn inc(&mut self, key: impl Into<String>) {
        self.inc_by(key, 1);
    }

    pub fn inc_by(&mut self, key: impl Into<String>, count: u64) {
        let entry = self.values.entry(key.into()).or_insert(Value::from(0u64));
        let current = entry.as_u64().unwrap_or(0);
        *entry = Value::from(current + count);
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_count(&self, key: &str) -> u64 {
        self.values.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    /// Record the end of the run and hand out the final values.
    pub fn finish(mut self, reason: &CloseReason) -> BTreeMap<String, Value> {
        self.finish_at(reason, Utc::now());
        self.values
    }

    fn finish_at(&mut self, reason: &CloseReason, finished_at: DateTime<Utc>) {
        let elapsed = (finished_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.set("finish_reason", reason.as_str());
        self.set(
            "finish_time",
            finished_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        self.set("elapsed_time_seconds", elapsed);
    }
}
