//! Records owned by the analysis backend, mirrored here for display.
//!
//! Field names follow the backend's JSON (camelCase, plus a couple of
//! all-caps `ID` suffixes), so most renames live in serde attributes.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    #[serde(rename = "researchID")]
    pub research_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(rename = "createdDatetime", default)]
    pub created_datetime: String,
    #[serde(default)]
    pub videos: Option<Vec<Video>>,
}

impl Patient {
    /// Case-insensitive substring match on the research ID. An empty query matches.
    pub fn matches_research_id(&self, query: &str) -> bool {
        let query = query.trim();
        query.is_empty()
            || self
                .research_id
                .to_lowercase()
                .contains(&query.to_lowercase())
    }

    pub fn video_count(&self) -> usize {
        self.videos.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStatus {
    pub id: i64,
    #[serde(rename = "videoID")]
    pub video_id: i64,
    pub status: String,
    #[serde(rename = "statusDatetime", default)]
    pub status_datetime: String,
    #[serde(default)]
    pub owner: String,
}

/// A processed video. `GET /video/{id}/info` returns the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: i64,
    pub file_path: String,
    #[serde(default)]
    pub upload_datetime: String,
    pub num_frames: usize,
    #[serde(default)]
    pub milli_seconds: f64,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub statuses: Vec<VideoStatus>,
}

pub type VideoMetadata = Video;

impl Video {
    /// Most recent processing status, `"Unknown"` when none was reported.
    pub fn latest_status(&self) -> &str {
        self.statuses
            .last()
            .map(|s| s.status.as_str())
            .unwrap_or("Unknown")
    }

    /// Upload date as `YYYY-MM-DD`, or the raw value when it is not ISO-8601.
    pub fn upload_date(&self) -> String {
        format_date(&self.upload_datetime)
    }

    pub fn matches_file_path(&self, query: &str) -> bool {
        self.file_path
            .to_lowercase()
            .contains(&query.trim().to_lowercase())
    }
}

pub fn format_date(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// One cell of a summary column: the backend mixes numbers and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryValue {
    Number(f64),
    Text(String),
}

impl SummaryValue {
    /// Numeric view; numeric strings parse, anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SummaryValue::Number(n) => Some(*n),
            SummaryValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbnormalStatus {
    pub is_abnormal: bool,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSummary {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: HashMap<String, Vec<SummaryValue>>,
    #[serde(default)]
    pub abnormal: Option<AbnormalStatus>,
}

impl VideoSummary {
    /// First value of a metric column.
    pub fn first(&self, key: &str) -> Option<&SummaryValue> {
        self.data.get(key).and_then(|values| values.first())
    }
}

/// Per-frame parameter series from `GET /video/{id}/params`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoParams {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: HashMap<String, Vec<f64>>,
}

impl VideoParams {
    pub fn series(&self, name: &str) -> &[f64] {
        self.data.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// SVG path markup drawn over one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationFrame {
    pub offset: usize,
    pub svg_paths: String,
}
