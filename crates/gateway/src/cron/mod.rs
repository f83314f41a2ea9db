//! Cron scheduler — wakes on wall-clock timers over the persisted jobs,
//! enforces misfire/concurrency/timeout discipline, and dispatches task
//! output through the channel bridge.

pub mod schedule;

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use nextai_domain::agent::{AgentInputMessage, AgentProcessRequest};
use nextai_domain::cron::{CronJobSpec, CronRunStatus, CronTaskType};
use nextai_domain::error::{Error, Result};
use nextai_store::CronJobLock;

use crate::dispatch::OutboundMessage;
use crate::state::AppState;

use schedule::resolve_next_run_at;

/// Fallback wake interval when no job is scheduled.
const IDLE_WAKE_SECS: u64 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The scheduler's in-process coordination state. The scheduling loop
/// itself runs as a spawned task over the shared [`AppState`].
pub struct CronScheduler {
    notify: Notify,
    /// In-memory per-job run counters; the cross-process bound is the
    /// advisory file lock.
    running: Mutex<std::collections::HashMap<String, u32>>,
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CronScheduler {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            running: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Wake the scheduling loop after a job CRUD operation.
    pub fn poke(&self) {
        self.notify.notify_one();
    }

    /// Spawn the scheduling loop.
    pub fn spawn(state: AppState) {
        tokio::spawn(async move {
            recover_persisted_jobs(&state);
            scheduler_loop(state).await;
        });
    }

    fn try_acquire_slot(&self, job_id: &str, max_concurrency: u32) -> Result<()> {
        let mut counts = self.running.lock();
        let count = counts.entry(job_id.to_owned()).or_insert(0);
        if *count >= max_concurrency {
            return Err(Error::CronMaxConcurrencyReached(job_id.to_owned()));
        }
        *count += 1;
        Ok(())
    }

    fn release_slot(&self, job_id: &str) {
        let mut counts = self.running.lock();
        if let Some(count) = counts.get_mut(job_id) {
            *count = count.saturating_sub(1);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Startup recovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Make every enabled job schedulable after a restart: seed missing
/// `next_run_at` values and clear stale `running` markers (the lock file,
/// not the persisted status, is the authority on liveness).
fn recover_persisted_jobs(state: &AppState) {
    let now = Utc::now();
    let result = state.store.write(|s| {
        for (id, spec) in &s.cron_jobs {
            let entry = s.cron_states.entry(id.clone()).or_default();
            if entry.last_status == Some(CronRunStatus::Running) {
                entry.last_status = None;
            }
            if spec.enabled && entry.next_run_at.is_none() {
                entry.next_run_at = resolve_next_run_at(spec, entry.last_run_at, now);
            }
        }
        Ok(())
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "cron startup recovery failed");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduling loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn scheduler_loop(state: AppState) {
    tracing::info!("cron scheduler started");
    loop {
        let now = Utc::now();

        // Min-queue over next fire times, rebuilt from the persisted state
        // each pass so CRUD operations need no separate bookkeeping.
        let mut queue: BinaryHeap<Reverse<(DateTime<Utc>, String)>> = BinaryHeap::new();
        state.store.read(|s| {
            for (id, spec) in &s.cron_jobs {
                if !spec.enabled {
                    continue;
                }
                if let Some(next) = s.cron_states.get(id).and_then(|st| st.next_run_at) {
                    queue.push(Reverse((next, id.clone())));
                }
            }
        });

        let mut next_wake: Option<DateTime<Utc>> = None;
        let mut fired = 0u32;
        while let Some(Reverse((due_at, job_id))) = queue.pop() {
            if due_at > now {
                next_wake = Some(due_at);
                break;
            }
            fired += 1;

            let spec = state.store.read(|s| s.cron_jobs.get(&job_id).cloned());
            let spec = match spec {
                Some(s) if s.enabled => s,
                _ => continue,
            };

            // Advance next_run_at before the worker starts so this fire is
            // consumed exactly once.
            let advanced = resolve_next_run_at(&spec, Some(now), now);
            let _ = state.store.write(|s| {
                if let Some(entry) = s.cron_states.get_mut(&job_id) {
                    entry.next_run_at = advanced;
                }
                Ok(())
            });

            let worker_state = state.clone();
            tokio::spawn(async move {
                let _ = execute_job(&worker_state, &spec, Some(due_at)).await;
            });
        }

        // Re-read the advanced fire times before sleeping.
        if fired > 0 {
            continue;
        }

        let sleep_for = match next_wake {
            Some(at) => (at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO),
            None => std::time::Duration::from_secs(IDLE_WAKE_SECS),
        };

        tokio::select! {
            _ = state.cron.notify.notified() => {}
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execute one job fire. `due_at` is the scheduled fire time (`None` for a
/// manual run-now, which bypasses misfire checks but honors concurrency).
pub async fn execute_job(
    state: &AppState,
    spec: &CronJobSpec,
    due_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let job_id = spec.id.clone();
    let now = Utc::now();

    // ── Misfire: too late to run, skip and recompute ──────────────
    if let Some(due) = due_at {
        let grace = Duration::seconds(spec.runtime.misfire_grace_seconds as i64);
        if now - due > grace {
            tracing::warn!(job_id = %job_id, due = %due, "cron misfire skipped");
            let next = resolve_next_run_at(spec, Some(now), now);
            return state.store.write(move |s| {
                let entry = s.cron_states.entry(job_id.clone()).or_default();
                entry.last_status = Some(CronRunStatus::Failed);
                entry.last_error = Some("misfire skipped".into());
                entry.next_run_at = next;
                Ok(())
            });
        }
    }

    // ── Concurrency: in-memory counter plus cross-process lock ────
    if let Err(e) = state
        .cron
        .try_acquire_slot(&job_id, spec.runtime.max_concurrency)
    {
        record_failure(state, &job_id, spec, &e.to_string());
        return Err(e);
    }
    let _slot = SlotGuard {
        state: state.clone(),
        job_id: job_id.clone(),
    };

    let _lock = match CronJobLock::acquire(state.store.data_dir(), &job_id) {
        Ok(lock) => lock,
        Err(e) => {
            record_failure(state, &job_id, spec, &e.to_string());
            return Err(e);
        }
    };

    // ── Mark running ──────────────────────────────────────────────
    let _ = state.store.write({
        let job_id = job_id.clone();
        move |s| {
            let entry = s.cron_states.entry(job_id).or_default();
            entry.last_status = Some(CronRunStatus::Running);
            Ok(())
        }
    });

    tracing::info!(job_id = %job_id, task = ?spec.task_type, "cron job started");

    // ── Run the task under the deadline ───────────────────────────
    let timeout = std::time::Duration::from_secs(spec.runtime.timeout_seconds.max(1));
    let outcome = match tokio::time::timeout(timeout, run_task(state, spec)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "task timeout after {}s",
            spec.runtime.timeout_seconds
        )),
    };

    // ── Record the result and the next fire ───────────────────────
    let finished = Utc::now();
    let next = resolve_next_run_at(spec, Some(finished), finished);
    state.store.write({
        let job_id = job_id.clone();
        let outcome = outcome.clone();
        move |s| {
            let enabled = s.cron_jobs.get(&job_id).map(|j| j.enabled).unwrap_or(false);
            let entry = s.cron_states.entry(job_id).or_default();
            match outcome {
                Ok(()) => {
                    entry.last_status = Some(CronRunStatus::Succeeded);
                    entry.last_run_at = Some(finished);
                    entry.last_error = None;
                    entry.consecutive_failures = 0;
                }
                Err(msg) => {
                    entry.last_status = Some(CronRunStatus::Failed);
                    entry.last_run_at = Some(finished);
                    entry.last_error = Some(msg);
                    entry.consecutive_failures += 1;
                }
            }
            entry.next_run_at = if enabled { next } else { None };
            Ok(())
        }
    })?;

    match &outcome {
        Ok(()) => tracing::info!(job_id = %spec.id, "cron job succeeded"),
        Err(msg) => tracing::warn!(job_id = %spec.id, error = %msg, "cron job failed"),
    }

    // Task failures are recorded in job state, not propagated: the
    // scheduler must survive them.
    Ok(())
}

/// Decrements the in-memory run counter when the worker exits.
struct SlotGuard {
    state: AppState,
    job_id: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.cron.release_slot(&self.job_id);
    }
}

fn record_failure(state: &AppState, job_id: &str, spec: &CronJobSpec, message: &str) {
    let now = Utc::now();
    let next = resolve_next_run_at(spec, Some(now), now);
    let job_id = job_id.to_owned();
    let message = message.to_owned();
    let _ = state.store.write(move |s| {
        let entry = s.cron_states.entry(job_id).or_default();
        entry.last_status = Some(CronRunStatus::Failed);
        entry.last_error = Some(message);
        entry.consecutive_failures += 1;
        if entry.next_run_at.is_none() {
            entry.next_run_at = next;
        }
        Ok(())
    });
}

/// Run the job's task body.
async fn run_task(state: &AppState, spec: &CronJobSpec) -> Result<()> {
    let channel = spec.dispatch.effective_channel().to_owned();
    let target = spec.dispatch.target.clone();

    match spec.task_type {
        CronTaskType::Text => {
            state
                .dispatcher
                .dispatch(&OutboundMessage {
                    user_id: target.user_id,
                    session_id: target.session_id,
                    channel,
                    text: spec.text.clone(),
                })
                .await
        }
        CronTaskType::Agent => {
            // Synthesize an agent request; the loop persists the exchange
            // and dispatches the reply for non-console channels itself.
            let request = AgentProcessRequest {
                input: vec![AgentInputMessage::user(&spec.text)],
                session_id: target.session_id,
                user_id: target.user_id,
                channel,
                ..Default::default()
            };
            crate::runtime::run_buffered(state.clone(), request)
                .await
                .map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextai_domain::cron::CronJobState;
    use nextai_store::Store;

    use crate::config::GatewayConfig;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let config = GatewayConfig {
            host: "127.0.0.1".into(),
            port: 0,
            data_dir: dir.path().to_owned(),
            api_key: String::new(),
            web_dir: None,
            disabled_tools: Default::default(),
        };
        let store = Store::open(dir.path()).unwrap();
        AppState::build(config, store)
    }

    fn text_job(id: &str, cron: &str) -> CronJobSpec {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "enabled": true,
            "schedule": {"type": "interval", "cron": cron},
            "task_type": "text",
            "text": "hello cron",
            "dispatch": {"target": {"user_id": "u1", "session_id": "s1"}},
        }))
        .unwrap()
    }

    fn insert_job(state: &AppState, spec: &CronJobSpec, next_run_at: Option<DateTime<Utc>>) {
        let spec = spec.clone();
        state
            .store
            .write(move |s| {
                s.cron_states.insert(
                    spec.id.clone(),
                    CronJobState {
                        next_run_at,
                        ..Default::default()
                    },
                );
                s.cron_jobs.insert(spec.id.clone(), spec);
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn text_task_runs_and_records_success() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let spec = text_job("job-interval", "1s");
        insert_job(&state, &spec, None);

        execute_job(&state, &spec, Some(Utc::now())).await.unwrap();

        state.store.read(|s| {
            let st = &s.cron_states["job-interval"];
            assert_eq!(st.last_status, Some(CronRunStatus::Succeeded));
            assert!(st.last_run_at.is_some());
            let next = st.next_run_at.expect("next fire computed");
            assert!(next >= st.last_run_at.unwrap() + Duration::seconds(1));
            assert_eq!(st.consecutive_failures, 0);

            // Console dispatch landed in the target chat.
            let chat = s.find_chat("u1", "console", "s1").expect("chat created");
            assert_eq!(s.messages[&chat.id].last().unwrap().flatten_text(), "hello cron");
        });
    }

    #[tokio::test]
    async fn agent_task_dispatches_the_loop_reply() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let spec: CronJobSpec = serde_json::from_value(serde_json::json!({
            "id": "job-agent",
            "name": "job-agent",
            "schedule": {"type": "interval", "cron": "1s"},
            "task_type": "agent",
            "text": "ping",
            "dispatch": {"target": {"user_id": "u1", "session_id": "s1"}},
        }))
        .unwrap();
        insert_job(&state, &spec, None);

        execute_job(&state, &spec, Some(Utc::now())).await.unwrap();

        state.store.read(|s| {
            assert_eq!(
                s.cron_states["job-agent"].last_status,
                Some(CronRunStatus::Succeeded)
            );
            let chat = s.find_chat("u1", "console", "s1").unwrap();
            let texts: Vec<String> = s.messages[&chat.id]
                .iter()
                .map(|m| m.flatten_text())
                .collect();
            assert!(texts.contains(&"ping".to_owned()));
            assert!(texts.contains(&"Echo: ping".to_owned()));
        });
    }

    #[tokio::test]
    async fn misfire_outside_grace_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let spec = text_job("job-late", "1s");
        insert_job(&state, &spec, None);

        // Due two minutes ago with a 60s grace window.
        let due = Utc::now() - Duration::seconds(120);
        execute_job(&state, &spec, Some(due)).await.unwrap();

        state.store.read(|s| {
            let st = &s.cron_states["job-late"];
            assert_eq!(st.last_status, Some(CronRunStatus::Failed));
            assert_eq!(st.last_error.as_deref(), Some("misfire skipped"));
            assert!(st.last_run_at.is_none(), "misfires do not count as runs");
            assert!(st.next_run_at.is_some(), "recomputed from now");
            assert!(s.find_chat("u1", "console", "s1").is_none(), "no dispatch");
        });
    }

    #[tokio::test]
    async fn concurrency_limit_is_enforced_by_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let spec = text_job("job-conc", "1s");
        insert_job(&state, &spec, None);

        // Simulate another process holding the job's lock file.
        let lock = CronJobLock::acquire(state.store.data_dir(), "job-conc").unwrap();

        let err = execute_job(&state, &spec, Some(Utc::now())).await.unwrap_err();
        assert_eq!(err.code(), "cron_max_concurrency_reached");
        state.store.read(|s| {
            let st = &s.cron_states["job-conc"];
            assert_eq!(st.last_status, Some(CronRunStatus::Failed));
            assert_eq!(st.consecutive_failures, 1);
        });

        // After the holder releases, the job runs again.
        drop(lock);
        execute_job(&state, &spec, Some(Utc::now())).await.unwrap();
        state.store.read(|s| {
            assert_eq!(
                s.cron_states["job-conc"].last_status,
                Some(CronRunStatus::Succeeded)
            );
        });
    }

    #[tokio::test]
    async fn in_memory_counter_blocks_before_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        state.cron.try_acquire_slot("job-x", 1).unwrap();
        let err = state.cron.try_acquire_slot("job-x", 1).unwrap_err();
        assert_eq!(err.code(), "cron_max_concurrency_reached");
        state.cron.release_slot("job-x");
        assert!(state.cron.try_acquire_slot("job-x", 1).is_ok());
    }

    #[tokio::test]
    async fn timeout_records_a_timeout_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        // An agent task whose explicit shell sleeps past the deadline.
        let mut spec: CronJobSpec = serde_json::from_value(serde_json::json!({
            "id": "job-slow",
            "name": "job-slow",
            "schedule": {"type": "interval", "cron": "1s"},
            "task_type": "agent",
            "text": "slow",
            "dispatch": {"target": {"user_id": "u1", "session_id": "s-slow"}},
            "runtime": {"timeout_seconds": 1},
        }))
        .unwrap();
        spec.text = "wait".into();
        insert_job(&state, &spec, None);

        // Swap the runner for one that stalls longer than the deadline.
        // A sleeping shell through the demo provider would also work, but a
        // stalled provider exercises cancellation at the await point.
        struct Stall;
        #[async_trait::async_trait]
        impl nextai_providers::ProviderAdapter for Stall {
            fn id(&self) -> &'static str {
                "demo"
            }
            async fn generate_turn(
                &self,
                _input: &[AgentInputMessage],
                _cfg: &nextai_providers::GenerateConfig,
                _tools: &[nextai_domain::tool::ToolSpec],
                _http: &reqwest::Client,
            ) -> Result<nextai_providers::TurnResult> {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(nextai_providers::TurnResult::default())
            }
        }
        let mut state = state;
        let mut runner = nextai_providers::Runner::new();
        runner.register_adapter(std::sync::Arc::new(Stall));
        state.runner = std::sync::Arc::new(runner);

        let started = std::time::Instant::now();
        execute_job(&state, &spec, Some(Utc::now())).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(3));

        state.store.read(|s| {
            let st = &s.cron_states["job-slow"];
            assert_eq!(st.last_status, Some(CronRunStatus::Failed));
            assert!(st.last_error.as_deref().unwrap().contains("timeout"));
            assert_eq!(st.consecutive_failures, 1);
        });
    }

    /// Poll the persisted state until `pred` holds (mirrors how operators
    /// observe `GET /cron/jobs/{id}/state`).
    async fn wait_for_state(
        state: &AppState,
        job_id: &str,
        pred: impl Fn(&CronJobState) -> bool,
    ) -> CronJobState {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let current = state
                .store
                .read(|s| s.cron_states.get(job_id).cloned())
                .unwrap_or_default();
            if pred(&current) {
                return current;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "timeout waiting for cron state of {job_id}: {current:?}"
            );
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_fires_an_interval_job() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let spec = text_job("job-live", "1s");
        insert_job(&state, &spec, resolve_next_run_at(&spec, None, Utc::now()));

        CronScheduler::spawn(state.clone());
        state.cron.poke();

        let observed =
            wait_for_state(&state, "job-live", |st| st.last_run_at.is_some()).await;
        assert_eq!(observed.last_status, Some(CronRunStatus::Succeeded));
        assert!(observed.next_run_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_recovers_a_persisted_due_job() {
        let dir = tempfile::tempdir().unwrap();

        // A previous process persisted a job whose fire time has passed
        // (still inside the grace window).
        {
            let state = test_state(&dir);
            let spec = text_job("job-recovered", "1s");
            insert_job(
                &state,
                &spec,
                Some(Utc::now() - Duration::seconds(2)),
            );
        }

        // A fresh process picks it up and runs it.
        let state = test_state(&dir);
        CronScheduler::spawn(state.clone());

        let observed =
            wait_for_state(&state, "job-recovered", |st| st.last_run_at.is_some()).await;
        assert_eq!(observed.last_status, Some(CronRunStatus::Succeeded));
    }

    #[tokio::test]
    async fn recovery_clears_stale_running_and_seeds_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let spec = text_job("job-recover", "1s");
        state
            .store
            .write({
                let spec = spec.clone();
                move |s| {
                    s.cron_jobs.insert(spec.id.clone(), spec.clone());
                    s.cron_states.insert(
                        spec.id.clone(),
                        CronJobState {
                            last_status: Some(CronRunStatus::Running),
                            ..Default::default()
                        },
                    );
                    Ok(())
                }
            })
            .unwrap();

        recover_persisted_jobs(&state);

        state.store.read(|s| {
            let st = &s.cron_states["job-recover"];
            assert_ne!(st.last_status, Some(CronRunStatus::Running));
            assert!(st.next_run_at.is_some());
        });
    }
}
