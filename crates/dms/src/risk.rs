//! Risk and trend classification
//!
//! Both are fixed, ordered lists of band descriptors. The hysteresis scan in
//! [`RiskLevel::classify`] depends on that order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable description of one risk band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskBand {
    /// Plain classification range `[lo, hi)`
    pub lo: f64,
    pub hi: f64,
    /// Leaving this band requires dropping below `exit_lo`
    pub exit_lo: f64,
    /// Entering this band from elsewhere requires reaching `enter_hi`
    pub enter_hi: f64,
    pub label: &'static str,
    pub color: &'static str,
}

/// Fatigue risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// All levels, lowest first
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::VeryLow,
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn band(self) -> RiskBand {
        match self {
            RiskLevel::VeryLow => RiskBand {
                lo: 0.0,
                hi: 20.0,
                exit_lo: 18.0,
                enter_hi: 22.0,
                label: "Very low",
                color: "green",
            },
            RiskLevel::Low => RiskBand {
                lo: 20.0,
                hi: 40.0,
                exit_lo: 38.0,
                enter_hi: 42.0,
                label: "Low",
                color: "limegreen",
            },
            RiskLevel::Moderate => RiskBand {
                lo: 40.0,
                hi: 60.0,
                exit_lo: 58.0,
                enter_hi: 62.0,
                label: "Moderate",
                color: "orange",
            },
            RiskLevel::High => RiskBand {
                lo: 60.0,
                hi: 80.0,
                exit_lo: 78.0,
                enter_hi: 82.0,
                label: "High",
                color: "orangered",
            },
            RiskLevel::Critical => RiskBand {
                lo: 80.0,
                hi: 100.0,
                exit_lo: 98.0,
                enter_hi: 100.0,
                label: "Critical",
                color: "red",
            },
        }
    }

    pub fn label(self) -> &'static str {
        self.band().label
    }

    pub fn color(self) -> &'static str {
        self.band().color
    }

    /// Plain `[lo, hi)` containment
    fn containing(score: f64) -> Option<RiskLevel> {
        Self::ALL.into_iter().find(|level| {
            let band = level.band();
            band.lo <= score && score < band.hi
        })
    }

    /// Classify `score` with hysteresis against the previous level.
    ///
    /// Below the previous level's `exit_lo` the score is reclassified by
    /// containment. Otherwise the highest level whose `enter_hi` the score
    /// reaches wins, and failing that the previous level is kept. Without a
    /// previous level, plain containment is used, defaulting to `Critical`.
    pub fn classify(score: f64, previous: Option<RiskLevel>) -> RiskLevel {
        let Some(previous) = previous else {
            return Self::containing(score).unwrap_or(RiskLevel::Critical);
        };

        if score < previous.band().exit_lo {
            return Self::containing(score).unwrap_or(RiskLevel::Critical);
        }

        Self::ALL
            .into_iter()
            .rev()
            .find(|level| score >= level.band().enter_hi)
            .unwrap_or(previous)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Score trend over the recent history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLevel {
    UpFast,
    UpSlow,
    Stable,
    DownSlow,
    DownFast,
}

impl TrendLevel {
    pub const ALL: [TrendLevel; 5] = [
        TrendLevel::UpFast,
        TrendLevel::UpSlow,
        TrendLevel::Stable,
        TrendLevel::DownSlow,
        TrendLevel::DownFast,
    ];

    /// `[lo, hi)` range in score points per minute
    pub fn range(self) -> (f64, f64) {
        match self {
            TrendLevel::UpFast => (2.0, f64::INFINITY),
            TrendLevel::UpSlow => (0.5, 2.0),
            TrendLevel::Stable => (-0.5, 0.5),
            TrendLevel::DownSlow => (-2.0, -0.5),
            TrendLevel::DownFast => (f64::NEG_INFINITY, -2.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrendLevel::UpFast => "Rising fast",
            TrendLevel::UpSlow => "Rising",
            TrendLevel::Stable => "Stable",
            TrendLevel::DownSlow => "Falling",
            TrendLevel::DownFast => "Falling fast",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            TrendLevel::UpFast => "darkgreen",
            TrendLevel::UpSlow => "green",
            TrendLevel::Stable => "grey",
            TrendLevel::DownSlow => "orange",
            TrendLevel::DownFast => "red",
        }
    }

    /// Classify a slope given in score points per second
    pub fn classify(slope_per_sec: f64) -> TrendLevel {
        let per_minute = slope_per_sec * 60.0;
        Self::ALL
            .into_iter()
            .find(|level| {
                let (lo, hi) = level.range();
                lo <= per_minute && per_minute < hi
            })
            .unwrap_or(TrendLevel::Stable)
    }
}

impl fmt::Display for TrendLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
