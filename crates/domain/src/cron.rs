//! Cron job specs and their persisted run state.
//!
//! `next_run_at` is always UTC; scheduling math converts to/from the job's
//! IANA timezone only while computing the next fire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Spec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronScheduleKind {
    /// `cron` holds a duration spec, e.g. `"1s"`, `"5m"`, `"1h30m"`.
    Interval,
    /// `cron` holds a 5- or 6-field cron expression evaluated in `timezone`.
    Cron,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronSchedule {
    #[serde(rename = "type")]
    pub kind: CronScheduleKind,
    pub cron: String,
    #[serde(default)]
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronTaskType {
    /// Dispatch `text` verbatim to the configured channel.
    Text,
    /// Run the agent loop on `text` and dispatch the reply.
    Agent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronDispatchTarget {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronDispatch {
    /// Delivery channel; empty means `console`.
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub target: CronDispatchTarget,
}

impl CronDispatch {
    pub fn effective_channel(&self) -> &str {
        if self.channel.trim().is_empty() {
            "console"
        } else {
            self.channel.trim()
        }
    }
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_misfire_grace_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronRuntime {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_misfire_grace_seconds")]
    pub misfire_grace_seconds: u64,
}

impl Default for CronRuntime {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_seconds: default_timeout_seconds(),
            misfire_grace_seconds: default_misfire_grace_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub task_type: CronTaskType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub dispatch: CronDispatch,
    #[serde(default)]
    pub runtime: CronRuntime,
}

fn default_enabled() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronRunStatus {
    Succeeded,
    Failed,
    Running,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronJobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<CronRunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_deserializes_with_defaults() {
        let json = serde_json::json!({
            "id": "job-1",
            "name": "job-1",
            "schedule": {"type": "interval", "cron": "1s"},
            "task_type": "text",
            "text": "hello cron",
            "dispatch": {"target": {"user_id": "u1", "session_id": "s1"}},
        });
        let spec: CronJobSpec = serde_json::from_value(json).unwrap();
        assert!(spec.enabled);
        assert_eq!(spec.schedule.kind, CronScheduleKind::Interval);
        assert_eq!(spec.task_type, CronTaskType::Text);
        assert_eq!(spec.dispatch.effective_channel(), "console");
        assert_eq!(spec.runtime.max_concurrency, 1);
        assert_eq!(spec.runtime.timeout_seconds, 300);
        assert_eq!(spec.runtime.misfire_grace_seconds, 60);
    }

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_value(CronRunStatus::Succeeded).unwrap(),
            "succeeded"
        );
        assert_eq!(
            serde_json::to_value(CronRunStatus::Running).unwrap(),
            "running"
        );
    }
}
