//! Coarse network quality assessment for the final session report.
//!
//! The score is additive: measured throughput always contributes, and the
//! host-reported connection type and round-trip time contribute when known. The
//! total is normalised against the points that were actually available, so a host
//! that reports no hints is judged on throughput alone. The reported downlink
//! does not score; it only flags downloads that ran far below the link speed.

use serde::{Deserialize, Serialize};

/// Effective connection type as reported by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveConnectionType {
    /// Very slow cellular
    #[serde(rename = "slow-2g")]
    Slow2G,
    /// 2G cellular
    #[serde(rename = "2g")]
    TwoG,
    /// 3G cellular
    #[serde(rename = "3g")]
    ThreeG,
    /// 4G cellular or better
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveConnectionType {
    fn points(self) -> u32 {
        match self {
            EffectiveConnectionType::FourG => 30,
            EffectiveConnectionType::ThreeG => 15,
            EffectiveConnectionType::TwoG => 5,
            EffectiveConnectionType::Slow2G => 0,
        }
    }

    fn is_slow_cellular(self) -> bool {
        matches!(
            self,
            EffectiveConnectionType::Slow2G | EffectiveConnectionType::TwoG
        )
    }
}

/// Connection information the host may supply
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHints {
    /// Effective connection type
    #[serde(default)]
    pub effective_type: Option<EffectiveConnectionType>,
    /// Estimated round-trip time in milliseconds
    #[serde(default)]
    pub rtt_ms: Option<u32>,
    /// Estimated downlink bandwidth in megabits per second
    #[serde(default)]
    pub downlink_mbps: Option<f64>,
    /// Whether the user asked for reduced data usage
    #[serde(default)]
    pub save_data: bool,
}

/// Quality verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    /// Score of 80 or more
    Excellent,
    /// Score of 60 or more
    Good,
    /// Score of 40 or more
    Fair,
    /// Score of 20 or more
    Poor,
    /// Anything lower
    VeryPoor,
}

impl QualityLabel {
    fn from_score(score: u8) -> Self {
        match score {
            80.. => QualityLabel::Excellent,
            60..=79 => QualityLabel::Good,
            40..=59 => QualityLabel::Fair,
            20..=39 => QualityLabel::Poor,
            _ => QualityLabel::VeryPoor,
        }
    }

    /// Snake-case label, as used in analytics properties
    pub fn as_str(self) -> &'static str {
        match self {
            QualityLabel::Excellent => "excellent",
            QualityLabel::Good => "good",
            QualityLabel::Fair => "fair",
            QualityLabel::Poor => "poor",
            QualityLabel::VeryPoor => "very_poor",
        }
    }
}

impl std::fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a network quality assessment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkAssessment {
    /// Normalised score, 0 to 100
    pub score: u8,
    /// Verdict derived from the score
    pub label: QualityLabel,
    /// Measured aggregate throughput in bytes per second
    pub measured_speed_bps: u64,
    /// Hints the assessment was based on, if any
    pub hints: Option<ConnectionHints>,
    /// Human-readable suggestions for specific conditions
    pub recommendations: Vec<String>,
}

const SPEED_MAX_POINTS: u32 = 50;
const TYPE_MAX_POINTS: u32 = 30;
const RTT_MAX_POINTS: u32 = 20;

const HIGH_LATENCY_MS: u32 = 300;
/// Measured throughput below this share of the reported downlink points at the server side
const DOWNLINK_SHORTFALL_RATIO: f64 = 0.25;
const VERY_LOW_SPEED_BPS: u64 = 100 * 1024;

fn speed_points(speed_bps: u64) -> u32 {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    match speed_bps {
        s if s >= 10 * MB => 50,
        s if s >= 5 * MB => 40,
        s if s >= MB => 30,
        s if s >= 500 * KB => 20,
        s if s >= 100 * KB => 10,
        _ => 0,
    }
}

fn rtt_points(rtt_ms: u32) -> u32 {
    match rtt_ms {
        0..50 => 20,
        50..100 => 15,
        100..200 => 10,
        200..500 => 5,
        _ => 0,
    }
}

/// Assess network quality from measured throughput and optional host hints
pub fn assess(measured_speed_bps: u64, hints: Option<&ConnectionHints>) -> NetworkAssessment {
    let mut points = speed_points(measured_speed_bps);
    let mut available = SPEED_MAX_POINTS;
    let mut recommendations = Vec::new();

    if let Some(hints) = hints {
        if let Some(effective_type) = hints.effective_type {
            points += effective_type.points();
            available += TYPE_MAX_POINTS;
            if effective_type.is_slow_cellular() {
                recommendations.push(
                    "Slow cellular connection detected; a Wi-Fi connection will load much faster"
                        .to_string(),
                );
            }
        }
        if let Some(rtt) = hints.rtt_ms {
            points += rtt_points(rtt);
            available += RTT_MAX_POINTS;
            if rtt > HIGH_LATENCY_MS {
                recommendations.push(format!(
                    "High network latency ({rtt} ms); try a closer or more stable connection"
                ));
            }
        }
        if let Some(downlink) = hints.downlink_mbps
            && downlink > 0.0
        {
            let measured_mbps = measured_speed_bps as f64 * 8.0 / 1_000_000.0;
            if measured_speed_bps > 0 && measured_mbps < downlink * DOWNLINK_SHORTFALL_RATIO {
                recommendations.push(format!(
                    "Downloads ran at {measured_mbps:.1} Mbps on a {downlink:.1} Mbps link; \
                     the content server may be the bottleneck"
                ));
            }
        }
        if hints.save_data {
            recommendations.push(
                "Data saver is enabled; disabling it may speed up large downloads".to_string(),
            );
        }
    }

    if measured_speed_bps > 0 && measured_speed_bps < VERY_LOW_SPEED_BPS {
        recommendations.push(
            "Download speed is very low; close other applications using the network".to_string(),
        );
    }

    let score = ((points * 100) / available).min(100) as u8;

    NetworkAssessment {
        score,
        label: QualityLabel::from_score(score),
        measured_speed_bps,
        hints: hints.cloned(),
        recommendations,
    }
}
