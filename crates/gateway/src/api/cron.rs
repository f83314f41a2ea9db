//! Cron job CRUD and control endpoints.

use axum::extract::{Path, State};
use axum::response::Json;
use chrono::Utc;
use serde_json::Value;

use nextai_domain::cron::{CronJobSpec, CronJobState, CronTaskType};
use nextai_domain::error::Error;

use crate::api::ApiResult;
use crate::cron::schedule::{resolve_next_run_at, validate_schedule};
use crate::state::AppState;

fn validate_spec(state: &AppState, spec: &CronJobSpec) -> ApiResult<()> {
    validate_schedule(spec)?;
    if spec.task_type == CronTaskType::Text && spec.text.trim().is_empty() {
        return Err(Error::InvalidRequest("text task requires text".into()).into());
    }
    let channel = spec.dispatch.effective_channel();
    if !state.store.read(|s| s.channels.supports(channel)) {
        return Err(Error::ChannelNotSupported(channel.to_owned()).into());
    }
    Ok(())
}

/// `GET /cron/jobs` — specs with their states attached.
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let jobs = state.store.read(|s| {
        let mut jobs: Vec<Value> = s
            .cron_jobs
            .values()
            .map(|spec| {
                let job_state = s.cron_states.get(&spec.id).cloned().unwrap_or_default();
                let mut v = serde_json::to_value(spec).unwrap_or_default();
                v["state"] = serde_json::to_value(job_state).unwrap_or_default();
                v
            })
            .collect();
        jobs.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
        jobs
    });
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

/// `POST /cron/jobs` — create and schedule.
pub async fn create_job(
    State(state): State<AppState>,
    Json(mut spec): Json<CronJobSpec>,
) -> ApiResult<Json<CronJobSpec>> {
    if spec.id.trim().is_empty() {
        spec.id = format!("job-{}", uuid::Uuid::new_v4());
    }
    if spec.name.trim().is_empty() {
        spec.name = spec.id.clone();
    }
    validate_spec(&state, &spec)?;

    let created = state.store.write({
        let spec = spec.clone();
        move |s| {
            if s.cron_jobs.contains_key(&spec.id) {
                return Err(Error::InvalidRequest(format!(
                    "cron job {:?} already exists",
                    spec.id
                )));
            }
            let now = Utc::now();
            let next = if spec.enabled {
                resolve_next_run_at(&spec, None, now)
            } else {
                None
            };
            s.cron_states.insert(
                spec.id.clone(),
                CronJobState {
                    next_run_at: next,
                    ..Default::default()
                },
            );
            s.cron_jobs.insert(spec.id.clone(), spec.clone());
            Ok(spec)
        }
    })?;

    state.cron.poke();
    Ok(Json(created))
}

/// `PUT /cron/jobs/{id}` — replace the spec and reschedule.
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut spec): Json<CronJobSpec>,
) -> ApiResult<Json<CronJobSpec>> {
    spec.id = id.clone();
    validate_spec(&state, &spec)?;

    let updated = state.store.write({
        let spec = spec.clone();
        move |s| {
            if !s.cron_jobs.contains_key(&id) {
                return Err(Error::NotFound(format!("cron job {id:?} not found")));
            }
            let now = Utc::now();
            let entry = s.cron_states.entry(id.clone()).or_default();
            entry.next_run_at = if spec.enabled {
                resolve_next_run_at(&spec, entry.last_run_at, now)
            } else {
                None
            };
            s.cron_jobs.insert(id.clone(), spec.clone());
            Ok(spec)
        }
    })?;

    state.cron.poke();
    Ok(Json(updated))
}

/// `DELETE /cron/jobs/{id}`.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.store.write(|s| {
        if s.cron_jobs.remove(&id).is_none() {
            return Err(Error::NotFound(format!("cron job {id:?} not found")));
        }
        s.cron_states.remove(&id);
        Ok(())
    })?;
    state.cron.poke();
    Ok(Json(serde_json::json!({"deleted": true})))
}

/// `POST /cron/jobs/{id}/pause` — disable and stop scheduling.
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.store.write(|s| {
        let spec = s
            .cron_jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("cron job {id:?} not found")))?;
        spec.enabled = false;
        if let Some(entry) = s.cron_states.get_mut(&id) {
            entry.next_run_at = None;
        }
        Ok(())
    })?;
    state.cron.poke();
    Ok(Json(serde_json::json!({"enabled": false})))
}

/// `POST /cron/jobs/{id}/resume` — re-enable and recompute the next fire.
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.store.write(|s| {
        let spec = s
            .cron_jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("cron job {id:?} not found")))?;
        spec.enabled = true;
        let spec = spec.clone();
        let entry = s.cron_states.entry(id.clone()).or_default();
        entry.next_run_at = resolve_next_run_at(&spec, entry.last_run_at, Utc::now());
        Ok(())
    })?;
    state.cron.poke();
    Ok(Json(serde_json::json!({"enabled": true})))
}

/// `POST /cron/jobs/{id}/run` — fire immediately, bypassing the schedule
/// (but not the concurrency bounds).
pub async fn run_job_now(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let spec = state
        .store
        .read(|s| s.cron_jobs.get(&id).cloned())
        .ok_or_else(|| Error::NotFound(format!("cron job {id:?} not found")))?;

    let worker_state = state.clone();
    tokio::spawn(async move {
        let _ = crate::cron::execute_job(&worker_state, &spec, None).await;
    });

    Ok(Json(serde_json::json!({"status": "triggered"})))
}

/// `GET /cron/jobs/{id}/state`.
pub async fn get_job_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CronJobState>> {
    let job_state = state
        .store
        .read(|s| {
            if !s.cron_jobs.contains_key(&id) {
                return None;
            }
            Some(s.cron_states.get(&id).cloned().unwrap_or_default())
        })
        .ok_or_else(|| Error::NotFound(format!("cron job {id:?} not found")))?;
    Ok(Json(job_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::app_state;

    fn job_body(id: &str) -> CronJobSpec {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "enabled": true,
            "schedule": {"type": "interval", "cron": "1s"},
            "task_type": "text",
            "text": "hello cron",
            "dispatch": {"target": {"user_id": "u1", "session_id": "s1"}},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_schedules_the_first_fire() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);

        create_job(State(state.clone()), Json(job_body("j1")))
            .await
            .unwrap();

        let job_state = get_job_state(State(state), Path("j1".into()))
            .await
            .unwrap()
            .0;
        assert!(job_state.next_run_at.is_some());
        assert!(job_state.last_run_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        create_job(State(state.clone()), Json(job_body("j1")))
            .await
            .unwrap();
        let err = create_job(State(state), Json(job_body("j1")))
            .await
            .unwrap_err();
        assert_eq!(err.0.code(), "invalid_request");
    }

    #[tokio::test]
    async fn invalid_schedules_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let mut bad = job_body("j-bad");
        bad.schedule.cron = "definitely not".into();
        let err = create_job(State(state), Json(bad)).await.unwrap_err();
        assert_eq!(err.0.code(), "invalid_request");
    }

    #[tokio::test]
    async fn pause_clears_and_resume_recomputes_the_next_fire() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        create_job(State(state.clone()), Json(job_body("j1")))
            .await
            .unwrap();

        pause_job(State(state.clone()), Path("j1".into())).await.unwrap();
        let paused = get_job_state(State(state.clone()), Path("j1".into()))
            .await
            .unwrap()
            .0;
        assert!(paused.next_run_at.is_none());

        resume_job(State(state.clone()), Path("j1".into())).await.unwrap();
        let resumed = get_job_state(State(state), Path("j1".into()))
            .await
            .unwrap()
            .0;
        assert!(resumed.next_run_at.is_some());
    }

    #[tokio::test]
    async fn unknown_job_state_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let err = get_job_state(State(state), Path("ghost".into()))
            .await
            .unwrap_err();
        assert_eq!(err.0.code(), "not_found");
    }

    #[tokio::test]
    async fn unknown_dispatch_channel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let mut job = job_body("j1");
        job.dispatch.channel = "webhook".into();
        let err = create_job(State(state), Json(job)).await.unwrap_err();
        assert_eq!(err.0.code(), "channel_not_supported");
    }
}
