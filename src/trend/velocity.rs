use serde::Serialize;

/// Scores considered when deriving velocity locally.
pub const VELOCITY_WINDOW: usize = 5;

const CRITICAL_SLOPE: f64 = 0.05;
const WARNING_SLOPE: f64 = 0.01;
const POSITIVE_SLOPE: f64 = -0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendStatus {
    InsufficientData,
    Critical,
    Warning,
    Positive,
    Stable,
}

impl TrendStatus {
    pub fn from_slope(slope: f64) -> Self {
        if slope > CRITICAL_SLOPE {
            TrendStatus::Critical
        } else if slope > WARNING_SLOPE {
            TrendStatus::Warning
        } else if slope < POSITIVE_SLOPE {
            TrendStatus::Positive
        } else {
            TrendStatus::Stable
        }
    }

    /// Classify a status string produced by the history service.
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("critical") {
            TrendStatus::Critical
        } else if lower.contains("warning") {
            TrendStatus::Warning
        } else if lower.contains("positive") {
            TrendStatus::Positive
        } else if lower.contains("insufficient") {
            TrendStatus::InsufficientData
        } else {
            TrendStatus::Stable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrendStatus::InsufficientData => "Insufficient Data",
            TrendStatus::Critical => "Critical: Rapid Risk Increase",
            TrendStatus::Warning => "Warning: Rising Risk",
            TrendStatus::Positive => "Positive: Risk Decreasing",
            TrendStatus::Stable => "Stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VelocitySource {
    Reported,
    Derived,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendVelocity {
    pub velocity: f64,
    pub status: TrendStatus,
    /// Text to show; the service's own wording when it supplied one.
    pub label: String,
    pub source: VelocitySource,
}

impl TrendVelocity {
    pub fn reported(velocity: f64, label: String) -> Self {
        Self {
            velocity,
            status: TrendStatus::from_label(&label),
            label,
            source: VelocitySource::Reported,
        }
    }

    /// Derive from scores in chronological order; only the last
    /// `VELOCITY_WINDOW` are used.
    pub fn derive(chronological_scores: &[f64]) -> Self {
        let start = chronological_scores.len().saturating_sub(VELOCITY_WINDOW);
        let (velocity, status) = match slope(&chronological_scores[start..]) {
            Some(slope) => (round4(slope), TrendStatus::from_slope(slope)),
            None => (0.0, TrendStatus::InsufficientData),
        };
        Self {
            velocity,
            status,
            label: status.label().to_string(),
            source: VelocitySource::Derived,
        }
    }
}

/// Least-squares slope of `values` against their index. None below two points.
pub fn slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    Some(num / den)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
