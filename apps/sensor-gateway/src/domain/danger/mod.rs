//! Area Danger Classification
//!
//! Grades an area from its LPG, CO and H2S concentrations. The first
//! threshold band crossed by any gas decides the level.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Danger level of the monitored area, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DangerLevel {
    /// All gases within normal range.
    Safe,
    /// Slightly elevated.
    Low,
    /// Elevated; keep monitoring.
    Moderate,
    /// Hazardous concentrations.
    High,
    /// Immediately dangerous.
    Dangerous,
}

/// `(level, lpg, co, h2s)` lower bounds, checked most severe first.
const BANDS: [(DangerLevel, f64, f64, f64); 4] = [
    (DangerLevel::Dangerous, 900.0, 8.0, 1.0),
    (DangerLevel::High, 700.0, 6.0, 0.7),
    (DangerLevel::Moderate, 500.0, 4.0, 0.4),
    (DangerLevel::Low, 300.0, 2.0, 0.2),
];

impl DangerLevel {
    /// Classify gas concentrations (ppm). Bounds are exclusive.
    #[must_use]
    pub fn classify(lpg: f64, co: f64, h2s: f64) -> Self {
        BANDS
            .iter()
            .find(|(_, l, c, h)| lpg > *l || co > *c || h2s > *h)
            .map_or(Self::Safe, |(level, ..)| *level)
    }

    /// Level name as reported to dashboards.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "Safe",
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::Dangerous => "Dangerous",
        }
    }
}

impl fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
