//! Local fallback analysis
//!
//! [`FallbackAnalyzer`] is what the queue answers with whenever the provider
//! cannot: quota exhausted, retries used up, or a non-retryable error.
//! [`HeuristicAnalyzer`] is a small deterministic scorer that needs nothing
//! but the domain name itself.

use super::analysis::{AnalysisResult, AnalysisSource, InvestmentGrade, MAX_SCORE};
use super::clock::{Clock, SystemClock};
use std::sync::Arc;

/// Failure of the local fallback; there is nothing left to degrade to
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fallback analysis failed: {0}")]
pub struct FallbackError(pub String);

/// Synchronous, offline analysis used when the provider is unavailable
pub trait FallbackAnalyzer: Send + Sync + 'static {
    fn heuristic(&self, key: &str) -> Result<AnalysisResult, FallbackError>;
}

impl<F: FallbackAnalyzer + ?Sized> FallbackAnalyzer for Arc<F> {
    fn heuristic(&self, key: &str) -> Result<AnalysisResult, FallbackError> {
        (**self).heuristic(key)
    }
}

const PREMIUM_TLDS: &[&str] = &["com", "io", "ai", "co", "net", "org"];

/// Scores a domain from its shape alone
///
/// Short, pronounceable, letters-only names on a common TLD score highest.
///
/// # Example
///
/// ```
/// use domainiq::{FallbackAnalyzer, HeuristicAnalyzer, AnalysisSource};
///
/// let analyzer = HeuristicAnalyzer::new();
/// let short = analyzer.heuristic("zap.io").unwrap();
/// let long = analyzer.heuristic("my-very-long-domain-name-2024.biz").unwrap();
///
/// assert_eq!(short.source, AnalysisSource::Fallback);
/// assert!(short.brandability > long.brandability);
/// ```
pub struct HeuristicAnalyzer {
    clock: Arc<dyn Clock>,
}

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` to timestamp results
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackAnalyzer for HeuristicAnalyzer {
    fn heuristic(&self, key: &str) -> Result<AnalysisResult, FallbackError> {
        let domain = key.trim().to_lowercase();
        let name = domain.trim_matches('.');
        if name.is_empty() {
            return Ok(self.unscored(domain));
        }
        let (label, tld) = match name.rsplit_once('.') {
            Some((label, tld)) => (label, tld),
            None => (name, ""),
        };

        let length = label.chars().count();
        let letters = label.chars().filter(|c| c.is_ascii_alphabetic()).count();
        let vowels = label.chars().filter(|c| "aeiouy".contains(*c)).count();
        let digits = label.chars().filter(|c| c.is_ascii_digit()).count();
        let hyphens = label.chars().filter(|c| *c == '-').count();

        let length_score = match length {
            1..=4 => 100,
            5..=6 => 85,
            7..=8 => 70,
            9..=12 => 50,
            _ => 30,
        };
        let noise_penalty = (digits * 10 + hyphens * 15) as i32;
        let vowel_ratio = if letters == 0 {
            0.0
        } else {
            vowels as f64 / letters as f64
        };
        // Pronounceable names sit around one vowel in three letters
        let pronounce_score = (100.0 - (vowel_ratio - 0.38).abs() * 200.0).max(0.0) as i32;
        let tld_bonus = if PREMIUM_TLDS.contains(&tld) { 10 } else { 0 };

        let brandability = clamp_score(length_score - noise_penalty + tld_bonus);
        let memorability = clamp_score((length_score + pronounce_score) / 2 - noise_penalty);
        let seo_potential = clamp_score(40 + tld_bonus * 2 + (letters as i32).min(10) * 2 - hyphens as i32 * 5);
        let rarity = clamp_score(length_score - 10 + tld_bonus - digits as i32 * 5);

        let mut result = AnalysisResult {
            domain,
            brandability,
            memorability,
            seo_potential,
            rarity,
            investment_grade: InvestmentGrade::D,
            estimated_value_usd: None,
            summary: Some("Estimated locally from the name's shape".to_string()),
            source: AnalysisSource::Fallback,
            analyzed_at: self.clock.now(),
        };
        result.investment_grade = InvestmentGrade::from_score(result.average_score());
        Ok(result)
    }
}

impl HeuristicAnalyzer {
    /// Lowest grade for keys with nothing to score, such as `"."`
    fn unscored(&self, domain: String) -> AnalysisResult {
        AnalysisResult {
            domain,
            brandability: 0,
            memorability: 0,
            seo_potential: 0,
            rarity: 0,
            investment_grade: InvestmentGrade::D,
            estimated_value_usd: None,
            summary: Some("Nothing to score in the name".to_string()),
            source: AnalysisSource::Fallback,
            analyzed_at: self.clock.now(),
        }
    }
}

fn clamp_score(value: i32) -> u8 {
    value.clamp(0, MAX_SCORE as i32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_premium_name_beats_noisy_name() {
        let analyzer = HeuristicAnalyzer::new();
        let good = analyzer.heuristic("nova.com").unwrap();
        let noisy = analyzer.heuristic("best-deals-4-u-2024.xyz").unwrap();

        assert!(good.brandability > noisy.brandability);
        assert!(good.memorability > noisy.memorability);
        assert!(good.investment_grade < noisy.investment_grade);
    }

    #[test]
    fn test_results_are_valid_and_marked_fallback() {
        let analyzer = HeuristicAnalyzer::new();
        for domain in ["a.io", "crab", "x1-2-3.net", "supercalifragilistic.museum"] {
            let result = analyzer.heuristic(domain).unwrap();
            assert!(result.validate().is_ok(), "{domain} produced invalid scores");
            assert!(result.is_fallback());
        }
    }

    #[test]
    fn test_is_deterministic_and_normalized() {
        let analyzer = HeuristicAnalyzer::new();
        let a = analyzer.heuristic("  Nova.COM ").unwrap();
        let b = analyzer.heuristic("nova.com").unwrap();
        assert_eq!(a.domain, "nova.com");
        assert_eq!(a.brandability, b.brandability);
        assert_eq!(a.rarity, b.rarity);
    }

    #[test]
    fn test_bare_tld_is_scored_as_a_name() {
        let analyzer = HeuristicAnalyzer::new();
        let result = analyzer.heuristic(".com").unwrap();
        assert_eq!(result.domain, ".com");
        assert!(result.validate().is_ok());
        assert!(result.brandability > 0);
    }

    #[test]
    fn test_dots_only_get_the_lowest_grade() {
        let analyzer = HeuristicAnalyzer::new();
        for key in [".", "..", " . "] {
            let result = analyzer.heuristic(key).unwrap();
            assert!(result.validate().is_ok(), "{key:?} produced invalid result");
            assert_eq!(result.investment_grade, InvestmentGrade::D);
            assert_eq!(result.average_score(), 0);
            assert!(result.is_fallback());
        }
    }
}
