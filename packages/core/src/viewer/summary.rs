//! Blink analysis summary: which metrics the review screen shows and how
//! each value is formatted.

use crate::models::{SummaryValue, VideoSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Right,
    Left,
}

impl Eye {
    pub fn css_class(self) -> &'static str {
        match self {
            Eye::Right => "eye-right",
            Eye::Left => "eye-left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardSpec {
    pub title: &'static str,
    pub key: &'static str,
    pub unit: &'static str,
    pub precision: usize,
    pub eye: Eye,
}

#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub heading: &'static str,
    pub cards: &'static [CardSpec],
}

const fn card(
    title: &'static str,
    key: &'static str,
    unit: &'static str,
    precision: usize,
    eye: Eye,
) -> CardSpec {
    CardSpec {
        title,
        key,
        unit,
        precision,
        eye,
    }
}

pub const SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        heading: "Blink Count",
        cards: &[
            card("[R] Blinks", "r_n_blinks", "", 0, Eye::Right),
            card("[L] Blinks", "l_n_blinks", "", 0, Eye::Left),
            card("[R] Incomplete Blinks", "r_n_incomplete_blinks", "", 0, Eye::Right),
            card("[L] Incomplete Blinks", "l_n_incomplete_blinks", "", 0, Eye::Left),
        ],
    },
    SectionSpec {
        heading: "Amplitude",
        cards: &[
            card("[R] Max Amplitude", "r_blink_max_amp", "mm", 2, Eye::Right),
            card("[L] Max Amplitude", "l_blink_max_amp", "mm", 2, Eye::Left),
        ],
    },
    SectionSpec {
        heading: "Velocity (mm/sec)",
        cards: &[
            card("[R] Closing Peak", "r_close_peak_vel_mean", "", 1, Eye::Right),
            card("[L] Closing Peak", "l_close_peak_vel_mean", "", 1, Eye::Left),
            card("[R] Start-Opening", "r_early_open_peak_vel_mean", "", 1, Eye::Right),
            card("[L] Start-Opening", "l_early_open_peak_vel_mean", "", 1, Eye::Left),
            card("[R] End-Opening", "r_late_open_peak_vel_mean", "", 1, Eye::Right),
            card("[L] End-Opening", "l_late_open_peak_vel_mean", "", 1, Eye::Left),
            card("[R] Max Velocity", "r_max_vel_mean", "", 1, Eye::Right),
            card("[L] Max Velocity", "l_max_vel_mean", "", 1, Eye::Left),
        ],
    },
    SectionSpec {
        heading: "Closed-eye Coverage (mm²)",
        cards: &[
            card("[R] Min Coverage", "r_lagopthalmos_min_mm", "", 2, Eye::Right),
            card("[L] Min Coverage", "l_lagopthalmos_min_mm", "", 2, Eye::Left),
            card("[R] Max Coverage", "r_lagopthalmos_max_mm", "", 2, Eye::Right),
            card("[L] Max Coverage", "l_lagopthalmos_max_mm", "", 2, Eye::Left),
            card("[R] Mean Coverage", "r_lagopthalmos_mean_mm", "", 2, Eye::Right),
            card("[L] Mean Coverage", "l_lagopthalmos_mean_mm", "", 2, Eye::Left),
        ],
    },
];

/// `N/A` when missing, fixed precision when numeric, the raw text otherwise.
pub fn format_value(value: Option<&SummaryValue>, precision: usize) -> String {
    match value {
        None => "N/A".to_string(),
        Some(value) => match value.as_f64() {
            Some(number) if !number.is_nan() => format!("{:.*}", precision, number),
            _ => match value {
                SummaryValue::Text(text) => text.clone(),
                SummaryValue::Number(number) => number.to_string(),
            },
        },
    }
}

/// A card with its value already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryCard {
    pub title: &'static str,
    pub value: String,
    pub unit: &'static str,
    pub eye: Eye,
}

pub fn cards_for(section: &SectionSpec, summary: &VideoSummary) -> Vec<SummaryCard> {
    section
        .cards
        .iter()
        .map(|card| SummaryCard {
            title: card.title,
            value: format_value(summary.first(card.key), card.precision),
            unit: card.unit,
            eye: card.eye,
        })
        .collect()
}

/// One row of the patient's video comparison table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRow {
    pub close_peak_velocity: (String, String),
    pub max_amplitude: (String, String),
    pub abnormal_status: String,
    pub is_abnormal: bool,
}

impl ComparisonRow {
    /// Summary columns for a video; `None` means the summary could not be
    /// fetched, which renders as `N/A` throughout.
    pub fn from_summary(summary: Option<&VideoSummary>) -> Self {
        let pair = |right: &str, left: &str| match summary {
            Some(summary) => (
                format_value(summary.first(right), 2),
                format_value(summary.first(left), 2),
            ),
            None => ("N/A".to_string(), "N/A".to_string()),
        };

        let abnormal = summary.and_then(|s| s.abnormal.as_ref());
        Self {
            close_peak_velocity: pair("r_close_peak_vel_mean", "l_close_peak_vel_mean"),
            max_amplitude: pair("r_blink_max_amp", "l_blink_max_amp"),
            abnormal_status: abnormal
                .map(|a| a.status.clone())
                .unwrap_or_else(|| "N/A".to_string()),
            is_abnormal: abnormal.map(|a| a.is_abnormal).unwrap_or(false),
        }
    }
}
