//! Request and response bodies for the HTTP API.

use crate::announcement::AnnouncementTemplate;
use crate::schedule::ScheduleDocument;
use crate::sequencer::PlaybackRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub schedule: ScheduleDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUpdateResponse {
    pub success: bool,
    pub message: String,
    pub active_jobs: usize,
}

/// Fields are optional so a missing one is reported by name instead of as a
/// parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationRequest {
    pub train_number: Option<String>,
    pub direction: Option<String>,
    pub destination: Option<String>,
    pub track_number: Option<String>,
}

impl From<StationRequest> for AnnouncementTemplate {
    fn from(r: StationRequest) -> Self {
        AnnouncementTemplate::Station {
            train_number: r.train_number.unwrap_or_default(),
            direction: r.direction.unwrap_or_default(),
            destination: r.destination.unwrap_or_default(),
            track_number: r.track_number.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromoRequest {
    pub file: Option<String>,
}

impl From<PromoRequest> for AnnouncementTemplate {
    fn from(r: PromoRequest) -> Self {
        AnnouncementTemplate::Promo {
            file: r.file.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SafetyRequest {
    pub language: Option<String>,
}

impl From<SafetyRequest> for AnnouncementTemplate {
    fn from(r: SafetyRequest) -> Self {
        AnnouncementTemplate::Safety {
            language: r.language.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceResponse {
    pub success: bool,
    pub message: String,
    pub announcement: AnnouncementTemplate,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub success: bool,
    pub stopped: Option<AnnouncementTemplate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeRequest {
    #[serde(default)]
    pub volume: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeResponse {
    pub success: bool,
    pub volume: f32,
    pub volume_percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// Kept as text so a bad value falls back to the default.
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<PlaybackRecord>,
    pub count: usize,
}
