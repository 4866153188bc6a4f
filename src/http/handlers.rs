//! HTTP handlers. Each one delegates to the `Annunciator`.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::Local;
use serde_json::Value;

use super::dto::{
    AnnounceResponse, HistoryQuery, HistoryResponse, MessageResponse, PromoRequest,
    SafetyRequest, ScheduleResponse, ScheduleUpdateResponse, StationRequest, StopResponse,
    VolumeRequest, VolumeResponse,
};
use super::error::{ApiError, AppError};
use super::state::AppState;
use crate::announcement::AnnouncementTemplate;
use crate::annunciator::{Annunciator, AnnunciatorStatus};
use crate::catalog::Catalog;
use crate::player::volume_percent;
use crate::schedule::ScheduleDocument;
use crate::scheduler::SchedulerStatus;
use crate::sequencer::QueueStatus;

pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Entries returned by the history endpoint when no limit is given.
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Run file I/O and audio probes on the blocking pool.
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T, AppError>
where
    F: FnOnce(&Annunciator) -> T + Send + 'static,
    T: Send + 'static,
{
    let annunciator = state.annunciator.clone();
    Ok(tokio::task::spawn_blocking(move || work(&annunciator)).await?)
}

// =============================================================================
// Schedule
// =============================================================================

/// GET /api/schedule
pub async fn get_schedule(State(state): State<AppState>) -> HandlerResult<ScheduleResponse> {
    let schedule = blocking(&state, |a| a.sync().load())
        .await?
        .map_err(AppError::schedule_load)?;
    Ok(Json(ScheduleResponse { schedule }))
}

/// POST|PUT /api/schedule
///
/// Body `{"schedule": {...}}`. Persists the document and rebuilds every job.
pub async fn update_schedule(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> HandlerResult<ScheduleUpdateResponse> {
    let Json(mut body) = body?;
    let raw = body
        .get_mut("schedule")
        .map(Value::take)
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::bad_request("Schedule data required"))?;

    let document: ScheduleDocument = serde_json::from_value(raw).map_err(|e| {
        AppError::BadRequest(ApiError::new("Invalid schedule document").with_details(e.to_string()))
    })?;

    let active_jobs = blocking(&state, move |a| a.sync().apply(&document))
        .await?
        .map_err(AppError::schedule_save)?;
    Ok(Json(ScheduleUpdateResponse {
        success: true,
        message: format!("Schedule updated, {} active jobs", active_jobs),
        active_jobs,
    }))
}

/// GET /scheduler_status, GET /api/scheduler/status
pub async fn scheduler_status(State(state): State<AppState>) -> HandlerResult<SchedulerStatus> {
    Ok(Json(state.annunciator.scheduler_status()))
}

// =============================================================================
// Manual announcements
// =============================================================================

fn announce(state: &AppState, template: AnnouncementTemplate) -> HandlerResult<AnnounceResponse> {
    // The handle is dropped; the response does not wait for playback.
    state.annunciator.announce(&template)?;
    let message = format!("{} announcement queued", template.kind().label());
    Ok(Json(AnnounceResponse {
        success: true,
        message,
        announcement: template,
        timestamp: Local::now().to_rfc3339(),
    }))
}

/// POST /api/announce/station
pub async fn announce_station(
    State(state): State<AppState>,
    body: Result<Json<StationRequest>, JsonRejection>,
) -> HandlerResult<AnnounceResponse> {
    let Json(request) = body?;
    announce(&state, request.into())
}

/// POST /api/announce/promo
pub async fn announce_promo(
    State(state): State<AppState>,
    body: Result<Json<PromoRequest>, JsonRejection>,
) -> HandlerResult<AnnounceResponse> {
    let Json(request) = body?;
    announce(&state, request.into())
}

/// POST /api/announce/safety
pub async fn announce_safety(
    State(state): State<AppState>,
    body: Result<Json<SafetyRequest>, JsonRejection>,
) -> HandlerResult<AnnounceResponse> {
    let Json(request) = body?;
    announce(&state, request.into())
}

/// POST /api/announce/stop
///
/// Clears the current-announcement marker. Audio in flight is not cut off.
pub async fn stop_announcement(State(state): State<AppState>) -> HandlerResult<StopResponse> {
    let stopped = state.annunciator.stop_current().map(|c| c.template);
    Ok(Json(StopResponse {
        success: true,
        stopped,
    }))
}

// =============================================================================
// Playback queue
// =============================================================================

/// GET /api/queue/status
pub async fn queue_status(State(state): State<AppState>) -> HandlerResult<QueueStatus> {
    Ok(Json(state.annunciator.queue_status()))
}

/// GET /api/queue/history?limit=N
///
/// Newest first. A missing or unparsable limit means 20.
pub async fn queue_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> HandlerResult<HistoryResponse> {
    let limit = query
        .limit
        .and_then(|l| l.parse::<usize>().ok())
        .filter(|&l| l > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state.annunciator.history(limit);
    Ok(Json(HistoryResponse {
        count: history.len(),
        history,
    }))
}

// =============================================================================
// Status and configuration
// =============================================================================

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> HandlerResult<AnnunciatorStatus> {
    // Probing the output waits on the audio thread.
    Ok(Json(blocking(&state, |a| a.status()).await?))
}

/// GET /api/config
pub async fn config(State(state): State<AppState>) -> HandlerResult<Catalog> {
    Ok(Json(state.annunciator.catalog().clone()))
}

// =============================================================================
// Audio
// =============================================================================

/// GET /api/audio/volume
pub async fn get_volume(State(state): State<AppState>) -> HandlerResult<VolumeResponse> {
    let volume = state.annunciator.volume();
    Ok(Json(VolumeResponse {
        success: true,
        volume,
        volume_percent: volume_percent(volume),
    }))
}

/// POST /api/audio/volume
///
/// Accepts `{"volume": 0.0-1.0}` or a percentage.
pub async fn set_volume(
    State(state): State<AppState>,
    body: Result<Json<VolumeRequest>, JsonRejection>,
) -> HandlerResult<VolumeResponse> {
    let Json(request) = body?;
    let requested = request
        .volume
        .ok_or_else(|| AppError::bad_request("Missing required fields: volume"))?;
    let volume = state.annunciator.set_volume(requested);
    Ok(Json(VolumeResponse {
        success: true,
        volume,
        volume_percent: volume_percent(volume),
    }))
}

/// POST /api/audio/test
pub async fn test_audio(State(state): State<AppState>) -> HandlerResult<MessageResponse> {
    state.annunciator.test_audio()?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Test chime queued".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annunciator::Annunciator;
    use crate::config::Settings;
    use crate::player::NullOutput;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;

    fn state(dir: &std::path::Path) -> AppState {
        let mut settings = Settings::with_base_dir(dir);
        settings.gap_ms = 1;
        let annunciator = Annunciator::with_output(settings, Arc::new(NullOutput::default())).unwrap();
        AppState::new(Arc::new(annunciator))
    }

    #[tokio::test]
    async fn schedule_round_trips_through_api() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());

        let body = json!({"schedule": {
            "station_announcements": [{"enabled": true, "cron": "0 8 * * 1-5",
                "train_number": "1", "direction": "westbound",
                "destination": "goodwin_station", "track_number": "1"}],
            "safety_announcements": [{"enabled": false, "cron": "0 * * * *", "language": "english"}]
        }});
        let Json(resp) = update_schedule(State(st.clone()), Ok(Json(body))).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.active_jobs, 1);

        let Json(got) = get_schedule(State(st.clone())).await.unwrap();
        assert_eq!(got.schedule.station_announcements.len(), 1);
        assert_eq!(got.schedule.safety_announcements.len(), 1);

        let Json(status) = scheduler_status(State(st)).await.unwrap();
        assert_eq!(status.jobs.len(), 1);
        assert_eq!(status.jobs[0].id, "station_0");
    }

    #[tokio::test]
    async fn schedule_key_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let err = update_schedule(State(state(dir.path())), Ok(Json(json!({"station_announcements": []}))))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body().error, "Schedule data required");
    }

    #[tokio::test]
    async fn structurally_bad_schedule_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({"schedule": {"promo_announcements": [{"enabled": true, "cron": "* * * * *"}]}});
        let err = update_schedule(State(state(dir.path())), Ok(Json(body)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.body().details.is_some());
    }

    #[tokio::test]
    async fn station_missing_fields_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let req = StationRequest {
            train_number: Some("1".into()),
            direction: Some("eastbound".into()),
            ..Default::default()
        };
        let err = announce_station(State(state(dir.path())), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(
            err.body().error,
            "Missing required fields: destination, track_number"
        );
    }

    #[tokio::test]
    async fn unknown_language_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("json")).unwrap();
        fs::write(
            dir.path().join("json").join("safety.json"),
            r#"{"safety": [{"id": "english", "name": "English"}, {"id": "spanish", "name": "Spanish"}]}"#,
        )
        .unwrap();
        let req = SafetyRequest { language: Some("x".into()) };
        let err = announce_safety(State(state(dir.path())), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(err.body().error, "Invalid language 'x'. Available: english, spanish");
    }

    #[tokio::test]
    async fn promo_announce_echoes_template() {
        let dir = tempfile::tempdir().unwrap();
        let req = PromoRequest { file: Some("gift_shop".into()) };
        let Json(resp) = announce_promo(State(state(dir.path())), Ok(Json(req)))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.announcement, AnnouncementTemplate::Promo { file: "gift_shop".into() });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["announcement"]["type"], "promo");
    }

    #[tokio::test]
    async fn stop_clears_current_announcement() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        let req = SafetyRequest { language: Some("english".into()) };
        announce_safety(State(st.clone()), Ok(Json(req))).await.unwrap();

        let Json(status_before) = status(State(st.clone())).await.unwrap();
        assert!(status_before.current_announcement.is_some());

        let Json(resp) = stop_announcement(State(st.clone())).await.unwrap();
        assert_eq!(
            resp.stopped,
            Some(AnnouncementTemplate::Safety { language: "english".into() })
        );
        let Json(resp) = stop_announcement(State(st)).await.unwrap();
        assert!(resp.stopped.is_none());
    }

    #[tokio::test]
    async fn volume_accepts_percent() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        let Json(resp) = set_volume(State(st.clone()), Ok(Json(VolumeRequest { volume: Some(65.0) })))
            .await
            .unwrap();
        assert_eq!(resp.volume_percent, 65);
        let Json(resp) = get_volume(State(st.clone())).await.unwrap();
        assert_eq!(resp.volume_percent, 65);

        let err = set_volume(State(st), Ok(Json(VolumeRequest::default())))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_and_config_respond() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        let Json(s) = status(State(st.clone())).await.unwrap();
        assert_eq!(s.status, "online");
        assert!(!s.audio_available);
        let Json(c) = config(State(st.clone())).await.unwrap();
        assert!(c.trains.is_empty());
        let Json(t) = test_audio(State(st)).await.unwrap();
        assert!(t.success);
    }

    #[tokio::test]
    async fn corrupt_schedule_file_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("json")).unwrap();
        fs::write(dir.path().join("json").join("cron.json"), "{ not json").unwrap();
        let err = get_schedule(State(state(dir.path()))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body().error, "Failed to load schedule");
    }

    #[tokio::test]
    async fn traversal_promo_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        let req = PromoRequest { file: Some("../../../secret".into()) };
        let err = announce_promo(State(st.clone()), Ok(Json(req))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.body().error.starts_with("Invalid file '../../../secret'"));
        assert_eq!(st.annunciator.queue_status().completed, 0);
    }

    #[tokio::test]
    async fn queue_endpoints_report_finished_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        for _ in 0..3 {
            st.annunciator.test_audio().unwrap().wait().unwrap();
        }

        let Json(q) = queue_status(State(st.clone())).await.unwrap();
        assert_eq!(q.completed, 3);
        assert_eq!(q.queued, 0);
        assert_eq!(q.workers, 2);

        let query = HistoryQuery { limit: Some("2".into()) };
        let Json(h) = queue_history(State(st.clone()), Query(query)).await.unwrap();
        assert_eq!(h.count, 2);
        assert_eq!(h.history[0].clips, vec!["chime"]);

        let query = HistoryQuery { limit: Some("lots".into()) };
        let Json(h) = queue_history(State(st), Query(query)).await.unwrap();
        assert_eq!(h.count, 3);
    }
}
