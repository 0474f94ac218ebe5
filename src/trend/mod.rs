//! Longitudinal risk history: normalization of the history payload, velocity
//! and the background poller.

pub mod poller;
pub mod velocity;

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use tracing::warn;

use crate::api::types::{HistoryPayload, TrendRecord};

pub use self::poller::TrendPoller;
pub use self::velocity::{TrendStatus, TrendVelocity, VelocitySource};

/// One chart point, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    /// 1-based position in chronological order.
    pub index: usize,
    pub timestamp: String,
    /// `HH:MM` when the timestamp parses, otherwise the raw value.
    pub time_label: String,
    /// Score as a percentage.
    pub risk_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    records: Vec<TrendRecord>,
    velocity: TrendVelocity,
}

impl TrendSeries {
    /// Normalize either payload shape. Returns None for an empty history.
    pub fn from_payload(payload: HistoryPayload, limit: usize) -> Option<Self> {
        let (records, reported) = match payload {
            HistoryPayload::Bare(records) => (records, None),
            HistoryPayload::Wrapped {
                history,
                trend_analysis,
            } => (history, trend_analysis),
        };

        let mut records: Vec<TrendRecord> = records
            .into_iter()
            .filter(|r| {
                let ok = r.risk_assessment.score.is_finite();
                if !ok {
                    warn!("Skipping history record at {} without a usable score", r.timestamp);
                }
                ok
            })
            .collect();
        records.truncate(limit);
        if records.is_empty() {
            return None;
        }

        let velocity = match reported {
            Some(analysis) => TrendVelocity::reported(analysis.velocity, analysis.status),
            None => {
                let scores: Vec<f64> = records
                    .iter()
                    .rev()
                    .map(|r| r.risk_assessment.score)
                    .collect();
                TrendVelocity::derive(&scores)
            }
        };

        Some(Self { records, velocity })
    }

    /// Newest first, as received.
    pub fn records(&self) -> &[TrendRecord] {
        &self.records
    }

    pub fn chronological(&self) -> Vec<&TrendRecord> {
        self.records.iter().rev().collect()
    }

    pub fn latest(&self) -> Option<&TrendRecord> {
        self.records.first()
    }

    pub fn velocity(&self) -> &TrendVelocity {
        &self.velocity
    }

    pub fn chart_points(&self) -> Vec<TrendPoint> {
        self.chronological()
            .into_iter()
            .enumerate()
            .map(|(i, record)| TrendPoint {
                index: i + 1,
                timestamp: record.timestamp.clone(),
                time_label: time_label(&record.timestamp),
                risk_percent: record.risk_assessment.score * 100.0,
            })
            .collect()
    }
}

fn time_label(timestamp: &str) -> String {
    if let Ok(naive) = timestamp.parse::<NaiveDateTime>() {
        return naive.format("%H:%M").to_string();
    }
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => dt.format("%H:%M").to_string(),
        Err(_) => timestamp.to_string(),
    }
}
