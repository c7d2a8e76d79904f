// Request/response bodies for `/api/progress/{user_id}/{video_id}`.
//
// Field names are camelCase to stay compatible with existing player clients.

use serde::{Deserialize, Serialize};

use crate::tracking::Observation;
use crate::types::ProgressSnapshot;
use crate::validation::ValidationError;

/// Body of `POST /api/progress/{user_id}/{video_id}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    pub start: f64,
    pub end: f64,
    pub current_time: f64,
    pub video_duration: f64,
}

impl SaveProgressRequest {
    pub fn validate(&self) -> Result<Observation, ValidationError> {
        Observation::new(self.start, self.end, self.current_time, self.video_duration)
    }
}

/// Response to a successful save.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressResponse {
    pub progress: f64,
    pub last_position: f64,
}

/// Response to `GET /api/progress/{user_id}/{video_id}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub progress: f64,
    pub last_position: f64,
    pub total_duration: f64,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(snapshot: ProgressSnapshot) -> Self {
        Self {
            progress: snapshot.percent_watched,
            last_position: snapshot.last_position,
            total_duration: snapshot.total_duration,
        }
    }
}
