use serde::{Deserialize, Serialize};

use crate::error::RiskDashError;

use super::validation::validate_profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Case-insensitive parse of a form value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

/// Smoking history categories as the prediction service encodes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmokingHistory {
    #[serde(rename = "never")]
    Never,
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "former")]
    Former,
    #[serde(rename = "ever")]
    Ever,
    #[serde(rename = "not current")]
    NotCurrent,
    #[serde(rename = "No Info")]
    NoInfo,
}

impl SmokingHistory {
    /// Accepts the wire spelling plus common variants ("Not_Current", "no info").
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s
            .trim()
            .to_lowercase()
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "never" => Some(SmokingHistory::Never),
            "current" => Some(SmokingHistory::Current),
            "former" => Some(SmokingHistory::Former),
            "ever" => Some(SmokingHistory::Ever),
            "not current" => Some(SmokingHistory::NotCurrent),
            "no info" => Some(SmokingHistory::NoInfo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SmokingHistory::Never => "never",
            SmokingHistory::Current => "current",
            SmokingHistory::Former => "former",
            SmokingHistory::Ever => "ever",
            SmokingHistory::NotCurrent => "not current",
            SmokingHistory::NoInfo => "No Info",
        }
    }
}

/// The continuous risk factors a what-if scenario may adjust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TunableFeature {
    #[serde(rename = "bmi")]
    Bmi,
    #[serde(rename = "HbA1c_level")]
    HbA1c,
    #[serde(rename = "blood_glucose_level")]
    BloodGlucose,
}

impl TunableFeature {
    pub const ALL: [TunableFeature; 3] = [
        TunableFeature::Bmi,
        TunableFeature::HbA1c,
        TunableFeature::BloodGlucose,
    ];

    /// Wire field name.
    pub fn key(&self) -> &'static str {
        match self {
            TunableFeature::Bmi => "bmi",
            TunableFeature::HbA1c => "HbA1c_level",
            TunableFeature::BloodGlucose => "blood_glucose_level",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Unvalidated form input, shaped like the wire payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProfile {
    pub gender: String,
    pub age: f64,
    pub hypertension: i64,
    pub heart_disease: i64,
    pub smoking_history: String,
    pub bmi: f64,
    #[serde(rename = "HbA1c_level")]
    pub hba1c_level: f64,
    pub blood_glucose_level: f64,
}

/// A validated patient profile. Only constructible through validation, and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile")]
pub struct PatientProfile {
    gender: Gender,
    age: f64,
    hypertension: u8,
    heart_disease: u8,
    smoking_history: SmokingHistory,
    bmi: f64,
    #[serde(rename = "HbA1c_level")]
    hba1c_level: f64,
    blood_glucose_level: f64,
}

impl PatientProfile {
    /// Assembled by the validator once every field has been checked.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn from_checked(
        gender: Gender,
        age: f64,
        hypertension: u8,
        heart_disease: u8,
        smoking_history: SmokingHistory,
        bmi: f64,
        hba1c_level: f64,
        blood_glucose_level: f64,
    ) -> Self {
        Self {
            gender,
            age,
            hypertension,
            heart_disease,
            smoking_history,
            bmi,
            hba1c_level,
            blood_glucose_level,
        }
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn hypertension(&self) -> u8 {
        self.hypertension
    }

    pub fn heart_disease(&self) -> u8 {
        self.heart_disease
    }

    pub fn smoking_history(&self) -> SmokingHistory {
        self.smoking_history
    }

    pub fn bmi(&self) -> f64 {
        self.bmi
    }

    pub fn hba1c_level(&self) -> f64 {
        self.hba1c_level
    }

    pub fn blood_glucose_level(&self) -> f64 {
        self.blood_glucose_level
    }

    pub fn value_of(&self, feature: TunableFeature) -> f64 {
        match feature {
            TunableFeature::Bmi => self.bmi,
            TunableFeature::HbA1c => self.hba1c_level,
            TunableFeature::BloodGlucose => self.blood_glucose_level,
        }
    }

    pub fn to_raw(&self) -> RawProfile {
        RawProfile {
            gender: self.gender.as_str().to_string(),
            age: self.age,
            hypertension: i64::from(self.hypertension),
            heart_disease: i64::from(self.heart_disease),
            smoking_history: self.smoking_history.as_str().to_string(),
            bmi: self.bmi,
            hba1c_level: self.hba1c_level,
            blood_glucose_level: self.blood_glucose_level,
        }
    }
}

impl TryFrom<RawProfile> for PatientProfile {
    type Error = RiskDashError;

    fn try_from(raw: RawProfile) -> Result<Self, Self::Error> {
        validate_profile(&raw)
    }
}
