//! Quality monitor (§4.6): rolling samples reduced to latency EMA, jitter,
//! loss, bandwidth, stability and a synthetic quality score, plus the
//! recommendation mapping that feeds back into transmission decisions.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const MAX_SAMPLES: usize = 1000;
const HISTORY_WINDOW: Duration = Duration::from_secs(60);
const JITTER_WINDOW: usize = 60;
const LATENCY_EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct QualitySample {
    pub at: Instant,
    pub latency_millis: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packet_lost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Normal,
    IncreaseFrequency,
    ThrottleBack,
    ChangeCompression,
    Reconnect,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QualityMetrics {
    pub latency_millis: f64,
    pub jitter_millis: f64,
    pub packet_loss_percent: f64,
    pub bandwidth_up_kbps: f64,
    pub bandwidth_down_kbps: f64,
    pub connection_stability: u32,
    pub quality_score: u32,
}

impl QualityMetrics {
    pub fn recommendation(&self) -> Recommendation {
        match self.quality_score {
            80..=100 => Recommendation::Normal,
            60..=79 => {
                if self.packet_loss_percent < 1.0 {
                    Recommendation::IncreaseFrequency
                } else {
                    Recommendation::ThrottleBack
                }
            }
            40..=59 => Recommendation::ThrottleBack,
            20..=39 => Recommendation::ChangeCompression,
            _ => Recommendation::Reconnect,
        }
    }

    /// The lesser of the up/down estimates, a conservative advisory figure
    /// for how much the application should plan to send.
    pub fn predicted_bandwidth_kbps(&self) -> f64 {
        self.bandwidth_up_kbps.min(self.bandwidth_down_kbps)
    }

    /// Scales a base heartbeat/send interval by the current recommendation.
    /// Advisory only — nothing in the send path consults this automatically.
    pub fn predicted_optimal_interval(&self, base: Duration) -> Duration {
        match self.recommendation() {
            Recommendation::Normal => base,
            Recommendation::IncreaseFrequency => base / 2,
            Recommendation::ThrottleBack | Recommendation::ChangeCompression => base * 2,
            Recommendation::Reconnect => base,
        }
    }
}

pub struct QualityMonitor {
    samples: VecDeque<QualitySample>,
    last_sample_at: Option<Instant>,
    latency_ema: Option<f64>,
    packets_lost: u64,
    packets_received: u64,
    connection_changes: u32,
}

impl Default for QualityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityMonitor {
    pub fn new() -> Self {
        QualityMonitor {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            last_sample_at: None,
            latency_ema: None,
            packets_lost: 0,
            packets_received: 0,
            connection_changes: 0,
        }
    }

    pub fn record_connection_event(&mut self) {
        self.connection_changes += 1;
    }

    /// Appends a sample, enforcing the at-most-once-per-second cadence and
    /// the bounded, drop-oldest, 60-second rolling window.
    pub fn record_sample(&mut self, now: Instant, sample: QualitySample) {
        if let Some(last) = self.last_sample_at {
            if now.duration_since(last) < Duration::from_secs(1) {
                return;
            }
        }
        self.last_sample_at = Some(now);

        self.latency_ema = Some(match self.latency_ema {
            None => sample.latency_millis,
            Some(prev) => LATENCY_EMA_ALPHA * sample.latency_millis + (1.0 - LATENCY_EMA_ALPHA) * prev,
        });

        if sample.packet_lost {
            self.packets_lost += 1;
        } else {
            self.packets_received += 1;
        }

        self.samples.push_back(sample);
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > HISTORY_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn jitter(&self) -> f64 {
        let recent: Vec<f64> = self
            .samples
            .iter()
            .rev()
            .take(JITTER_WINDOW)
            .map(|s| s.latency_millis)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        recent.iter().map(|v| (v - mean).abs()).sum::<f64>() / recent.len() as f64
    }

    fn bandwidth_kbps(&self) -> (f64, f64) {
        if self.samples.is_empty() {
            return (0.0, 0.0);
        }
        let window_secs = self
            .samples
            .back()
            .unwrap()
            .at
            .duration_since(self.samples.front().unwrap().at)
            .as_secs_f64()
            .max(1.0);
        let bytes_sent: u64 = self.samples.iter().map(|s| s.bytes_sent).sum();
        let bytes_received: u64 = self.samples.iter().map(|s| s.bytes_received).sum();
        (
            bytes_sent as f64 * 8.0 / 1000.0 / window_secs,
            bytes_received as f64 * 8.0 / 1000.0 / window_secs,
        )
    }

    fn packet_loss_percent(&self) -> f64 {
        let total = self.packets_lost + self.packets_received;
        if total == 0 {
            0.0
        } else {
            self.packets_lost as f64 * 100.0 / total as f64
        }
    }

    fn stability(&self) -> u32 {
        100u32.saturating_sub((self.connection_changes * 20).min(100))
    }

    /// Reduces the current rolling window to a [`QualityMetrics`] snapshot,
    /// using the §4.6 weighted-clamp formula for `qualityScore`.
    pub fn metrics(&self) -> QualityMetrics {
        let latency = self.latency_ema.unwrap_or(0.0);
        let jitter = self.jitter();
        let loss = self.packet_loss_percent();
        let stability = self.stability();
        let (up, down) = self.bandwidth_kbps();

        let score = 100.0
            - (latency / 5.0).clamp(0.0, 40.0)
            - (loss * 2.0).clamp(0.0, 30.0)
            - (jitter / 2.0).clamp(0.0, 20.0)
            - ((100.0 - stability as f64) / 10.0).clamp(0.0, 10.0);

        QualityMetrics {
            latency_millis: latency,
            jitter_millis: jitter,
            packet_loss_percent: loss,
            bandwidth_up_kbps: up,
            bandwidth_down_kbps: down,
            connection_stability: stability,
            quality_score: score.clamp(0.0, 100.0).round() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(at: Instant, latency: f64, lost: bool) -> QualitySample {
        QualitySample {
            at,
            latency_millis: latency,
            bytes_sent: 100,
            bytes_received: 100,
            packet_lost: lost,
        }
    }

    #[test]
    fn first_sample_seeds_ema() {
        let mut monitor = QualityMonitor::new();
        let now = Instant::now();
        monitor.record_sample(now, sample(now, 20.0, false));
        assert_eq!(monitor.metrics().latency_millis, 20.0);
    }

    #[test]
    fn samples_within_the_same_second_are_coalesced() {
        let mut monitor = QualityMonitor::new();
        let now = Instant::now();
        monitor.record_sample(now, sample(now, 10.0, false));
        monitor.record_sample(now, sample(now, 1000.0, false));
        assert_eq!(monitor.metrics().latency_millis, 10.0);
    }

    #[test]
    fn quality_score_matches_spec_scenario() {
        // latency EMA=50ms, loss=5%, jitter=10ms, stability=100
        // score = 100 - 10 - 10 - 5 - 0 = 75
        let mut monitor = QualityMonitor::new();
        monitor.latency_ema = Some(50.0);
        monitor.packets_lost = 5;
        monitor.packets_received = 95;
        let base = Instant::now();
        for i in 0..4u64 {
            monitor.samples.push_back(sample(
                base + Duration::from_millis(i * 10),
                50.0 + if i % 2 == 0 { 10.0 } else { -10.0 },
                false,
            ));
        }
        let metrics = monitor.metrics();
        assert_eq!(metrics.quality_score, 75);
        assert_eq!(metrics.recommendation(), Recommendation::ThrottleBack);
    }

    #[test]
    fn recommendation_mapping() {
        let mut m = QualityMetrics {
            quality_score: 90,
            ..Default::default()
        };
        assert_eq!(m.recommendation(), Recommendation::Normal);
        m.quality_score = 70;
        m.packet_loss_percent = 0.0;
        assert_eq!(m.recommendation(), Recommendation::IncreaseFrequency);
        m.packet_loss_percent = 2.0;
        assert_eq!(m.recommendation(), Recommendation::ThrottleBack);
        m.quality_score = 45;
        assert_eq!(m.recommendation(), Recommendation::ThrottleBack);
        m.quality_score = 30;
        assert_eq!(m.recommendation(), Recommendation::ChangeCompression);
        m.quality_score = 10;
        assert_eq!(m.recommendation(), Recommendation::Reconnect);
    }
}
