//! Decision thresholds, sensitivity presets and severity banding

use crate::error::{CryError, Result as CryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named operating point for the cascade filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Favor recall: miss as few pain cases as possible
    High,
    #[default]
    Balanced,
    /// Favor precision: minimize false alarms
    Precise,
}

impl Sensitivity {
    pub const ALL: [Sensitivity; 3] = [Sensitivity::High, Sensitivity::Balanced, Sensitivity::Precise];

    pub fn name(&self) -> &'static str {
        match self {
            Sensitivity::High => "high",
            Sensitivity::Balanced => "balanced",
            Sensitivity::Precise => "precise",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sensitivity {
    type Err = CryError;

    fn from_str(s: &str) -> CryResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Sensitivity::High),
            "balanced" => Ok(Sensitivity::Balanced),
            "precise" => Ok(Sensitivity::Precise),
            _ => Err(CryError::InvalidSensitivity(s.to_string())),
        }
    }
}

/// Cascade filter cut per sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeCuts {
    pub high: f64,
    pub balanced: f64,
    pub precise: f64,
}

impl Default for CascadeCuts {
    fn default() -> Self {
        Self {
            high: 0.25,
            balanced: 0.365,
            precise: 0.50,
        }
    }
}

impl CascadeCuts {
    pub fn get(&self, sensitivity: Sensitivity) -> f64 {
        match sensitivity {
            Sensitivity::High => self.high,
            Sensitivity::Balanced => self.balanced,
            Sensitivity::Precise => self.precise,
        }
    }

    pub fn set(&mut self, sensitivity: Sensitivity, cut: f64) {
        match sensitivity {
            Sensitivity::High => self.high = cut,
            Sensitivity::Balanced => self.balanced = cut,
            Sensitivity::Precise => self.precise = cut,
        }
    }

    /// True when stricter presets never use a lower cut than looser ones
    pub fn is_ordered(&self) -> bool {
        self.high <= self.balanced && self.balanced <= self.precise
    }

    /// Raise inverted cuts so that high <= balanced <= precise.
    ///
    /// Returns the presets whose cut was changed.
    pub fn enforce_ordering(&mut self) -> Vec<Sensitivity> {
        let mut raised = Vec::new();
        if self.balanced < self.high {
            self.balanced = self.high;
            raised.push(Sensitivity::Balanced);
        }
        if self.precise < self.balanced {
            self.precise = self.balanced;
            raised.push(Sensitivity::Precise);
        }
        raised
    }
}

/// Coarse confidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Calibrated decision boundaries persisted alongside the stage models
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub primary_pain_cut: f64,
    pub cascade_cuts: CascadeCuts,
    pub confidence_low: f64,
    pub confidence_high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            primary_pain_cut: 0.5,
            cascade_cuts: CascadeCuts::default(),
            confidence_low: 0.4,
            confidence_high: 0.7,
        }
    }
}

impl Thresholds {
    /// Check the invariants every loaded or calibrated bundle must hold
    pub fn validate(&self) -> CryResult<()> {
        let cuts = [
            ("primary_pain_cut", self.primary_pain_cut),
            ("cascade_cuts.high", self.cascade_cuts.high),
            ("cascade_cuts.balanced", self.cascade_cuts.balanced),
            ("cascade_cuts.precise", self.cascade_cuts.precise),
            ("confidence_low", self.confidence_low),
            ("confidence_high", self.confidence_high),
        ];
        for (name, v) in cuts {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(CryError::InvalidThresholds(format!(
                    "{} = {} is outside [0, 1]",
                    name, v
                )));
            }
        }
        if self.confidence_low >= self.confidence_high {
            return Err(CryError::InvalidThresholds(format!(
                "confidence_low ({}) must be < confidence_high ({})",
                self.confidence_low, self.confidence_high
            )));
        }
        Ok(())
    }

    /// Cascade cut for the given preset
    pub fn cascade_cut(&self, sensitivity: Sensitivity) -> f64 {
        self.cascade_cuts.get(sensitivity)
    }

    /// Band a confidence into `Low`, `Medium` or `High`
    pub fn severity(&self, confidence: f64) -> Severity {
        if confidence >= self.confidence_high {
            Severity::High
        } else if confidence >= self.confidence_low {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bands() {
        let t = Thresholds::default();
        assert_eq!(t.severity(0.95), Severity::High);
        assert_eq!(t.severity(0.7), Severity::High);
        assert_eq!(t.severity(0.69), Severity::Medium);
        assert_eq!(t.severity(0.4), Severity::Medium);
        assert_eq!(t.severity(0.39), Severity::Low);
        assert_eq!(t.severity(0.0), Severity::Low);
    }

    #[test]
    fn test_sensitivity_parse() {
        assert_eq!("high".parse::<Sensitivity>().unwrap(), Sensitivity::High);
        assert_eq!(" Balanced ".parse::<Sensitivity>().unwrap(), Sensitivity::Balanced);
        assert_eq!("PRECISE".parse::<Sensitivity>().unwrap(), Sensitivity::Precise);
        assert!(matches!(
            "paranoid".parse::<Sensitivity>(),
            Err(CryError::InvalidSensitivity(_))
        ));
    }

    #[test]
    fn test_confidence_band_invariant() {
        let t = Thresholds {
            confidence_low: 0.7,
            confidence_high: 0.7,
            ..Thresholds::default()
        };
        assert!(t.validate().is_err());
        assert!(Thresholds::default().validate().is_ok());
    }

    #[test]
    fn test_enforce_ordering() {
        let mut cuts = CascadeCuts {
            high: 0.6,
            balanced: 0.4,
            precise: 0.3,
        };
        assert!(!cuts.is_ordered());
        let raised = cuts.enforce_ordering();
        assert_eq!(raised, vec![Sensitivity::Balanced, Sensitivity::Precise]);
        assert!(cuts.is_ordered());
        assert_eq!(cuts.balanced, 0.6);
        assert_eq!(cuts.precise, 0.6);
    }

    #[test]
    fn test_thresholds_json_shape() {
        let json = serde_json::to_value(Thresholds::default()).unwrap();
        assert_eq!(json["cascade_cuts"]["balanced"], 0.365);
        assert_eq!(json["primary_pain_cut"], 0.5);
    }
}
