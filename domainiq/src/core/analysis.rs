//! Analysis payloads returned by providers and the local fallback
//!
//! The queue never looks inside an [`AnalysisResult`]; it only stores and
//! forwards it. The schema is fixed here so that every producer (remote
//! provider, heuristic fallback, tests) hands callers the same shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of every score field
pub const MAX_SCORE: u8 = 100;

/// Which collaborator produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    /// The external inference provider
    Provider,
    /// The local heuristic, used when the provider is unavailable or exhausted
    Fallback,
}

/// Coarse investment rating derived from the individual scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InvestmentGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
}

impl InvestmentGrade {
    /// Map an average score (0-100) onto a grade
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => InvestmentGrade::APlus,
            75..=89 => InvestmentGrade::A,
            60..=74 => InvestmentGrade::B,
            40..=59 => InvestmentGrade::C,
            _ => InvestmentGrade::D,
        }
    }
}

impl fmt::Display for InvestmentGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvestmentGrade::APlus => "A+",
            InvestmentGrade::A => "A",
            InvestmentGrade::B => "B",
            InvestmentGrade::C => "C",
            InvestmentGrade::D => "D",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for InvestmentGrade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A+" => Ok(InvestmentGrade::APlus),
            "A" => Ok(InvestmentGrade::A),
            "B" => Ok(InvestmentGrade::B),
            "C" => Ok(InvestmentGrade::C),
            "D" => Ok(InvestmentGrade::D),
            other => Err(format!("unknown investment grade: {other}")),
        }
    }
}

/// Scores for a single domain
///
/// # Example
///
/// ```
/// use domainiq::{AnalysisResult, AnalysisSource, InvestmentGrade};
/// use chrono::Utc;
///
/// let result = AnalysisResult {
///     domain: "example.com".to_string(),
///     brandability: 80,
///     memorability: 75,
///     seo_potential: 60,
///     rarity: 40,
///     investment_grade: InvestmentGrade::B,
///     estimated_value_usd: None,
///     summary: None,
///     source: AnalysisSource::Provider,
///     analyzed_at: Utc::now(),
/// };
/// assert!(result.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The analyzed domain (the queue key)
    pub domain: String,
    /// How easily the name works as a brand (0-100)
    pub brandability: u8,
    /// How easy the name is to remember and spell (0-100)
    pub memorability: u8,
    /// Keyword and search value (0-100)
    pub seo_potential: u8,
    /// Scarcity of comparable names (0-100)
    pub rarity: u8,
    /// Overall rating
    pub investment_grade: InvestmentGrade,
    /// Estimated resale value, when the producer offers one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value_usd: Option<u64>,
    /// Free-form rationale, when the producer offers one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Who produced the result
    pub source: AnalysisSource,
    /// When the result was produced
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Check the invariants every producer must uphold
    pub fn validate(&self) -> Result<(), String> {
        if self.domain.trim().is_empty() {
            return Err("domain is empty".into());
        }

        for (name, value) in [
            ("brandability", self.brandability),
            ("memorability", self.memorability),
            ("seo_potential", self.seo_potential),
            ("rarity", self.rarity),
        ] {
            if value > MAX_SCORE {
                return Err(format!("{name} out of range: {value}"));
            }
        }

        Ok(())
    }

    /// Mean of the four score fields
    pub fn average_score(&self) -> u8 {
        let sum = self.brandability as u32
            + self.memorability as u32
            + self.seo_potential as u32
            + self.rarity as u32;
        (sum / 4) as u8
    }

    pub fn is_fallback(&self) -> bool {
        self.source == AnalysisSource::Fallback
    }
}
