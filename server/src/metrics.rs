// Metrics collection and tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Samples kept for percentile estimates.
const WINDOW: usize = 1000;

/// Running latency statistics over a sliding window of samples.
#[derive(Debug)]
pub struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
    window: Mutex<VecDeque<u64>>,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
            window: Mutex::new(VecDeque::with_capacity(WINDOW)),
        }
    }
}

impl LatencyStats {
    pub fn record(&self, latency: Duration) {
        let ms = latency.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
        if let Ok(mut window) = self.window.lock() {
            if window.len() == WINDOW {
                window.pop_front();
            }
            window.push_back(ms);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn avg_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.total_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn percentile_ms(&self, p: u8) -> u64 {
        let Ok(window) = self.window.lock() else {
            return 0;
        };
        if window.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            count: self.count(),
            avg_ms: self.avg_ms(),
            max_ms: self.max_ms.load(Ordering::Relaxed),
            p50_ms: self.percentile_ms(50),
            p95_ms: self.percentile_ms(95),
            p99_ms: self.percentile_ms(99),
        }
    }
}

/// Per-endpoint counters
#[derive(Debug, Default)]
pub struct EndpointMetrics {
    errors: AtomicU64,
    latency: LatencyStats,
}

impl EndpointMetrics {
    pub fn record_success(&self, latency: Duration) {
        self.latency.record(latency);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        let errors = self.errors.load(Ordering::Relaxed);
        EndpointSnapshot {
            request_count: self.latency.count() + errors,
            error_count: errors,
            latency: self.latency.snapshot(),
        }
    }
}

/// Counters shared by every handler.
#[derive(Debug)]
pub struct AppMetrics {
    started: Instant,
    pub tts: EndpointMetrics,
    pub stream: EndpointMetrics,
    /// Stream creation to first chunk sent.
    pub first_chunk: LatencyStats,
    chunks: AtomicU64,
    /// Native-rate samples sent as stream chunks.
    stream_samples: AtomicU64,
    /// Post-processed samples returned by `POST /tts`.
    tts_samples: AtomicU64,
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            tts: EndpointMetrics::default(),
            stream: EndpointMetrics::default(),
            first_chunk: LatencyStats::default(),
            chunks: AtomicU64::new(0),
            stream_samples: AtomicU64::new(0),
            tts_samples: AtomicU64::new(0),
        }
    }
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_chunk(&self, samples: usize) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.stream_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_tts_samples(&self, samples: usize) {
        self.tts_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsResponse {
        MetricsResponse {
            timestamp: Utc::now(),
            uptime_seconds: self.started.elapsed().as_secs(),
            system: SystemMetrics::collect(),
            endpoints: EndpointsSnapshot {
                tts: self.tts.snapshot(),
                stream: self.stream.snapshot(),
            },
            synthesis: SynthesisSnapshot {
                chunks: self.chunks.load(Ordering::Relaxed),
                stream_samples: self.stream_samples.load(Ordering::Relaxed),
                tts_samples: self.tts_samples.load(Ordering::Relaxed),
                first_chunk: self.first_chunk.snapshot(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub system: SystemMetrics,
    pub endpoints: EndpointsSnapshot,
    pub synthesis: SynthesisSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
}

impl SystemMetrics {
    fn collect() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let memory_used = system.used_memory();
        let memory_total = system.total_memory();
        let memory_usage_percent = if memory_total > 0 {
            (memory_used as f64 / memory_total as f64 * 100.0) as f32
        } else {
            0.0
        };
        Self {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EndpointsSnapshot {
    pub tts: EndpointSnapshot,
    pub stream: EndpointSnapshot,
}

#[derive(Debug, Serialize)]
pub struct EndpointSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub latency: LatencySnapshot,
}

#[derive(Debug, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SynthesisSnapshot {
    pub chunks: u64,
    pub stream_samples: u64,
    pub tts_samples: u64,
    pub first_chunk: LatencySnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats() {
        let stats = LatencyStats::default();
        assert_eq!(stats.percentile_ms(50), 0);
        for ms in 1..=100 {
            stats.record(Duration::from_millis(ms));
        }
        let snap = stats.snapshot();
        assert_eq!(snap.count, 100);
        assert_eq!(snap.max_ms, 100);
        assert!((snap.avg_ms - 50.5).abs() < 1e-9);
        assert_eq!(snap.p50_ms, 51);
        assert_eq!(snap.p99_ms, 100);
    }

    #[test]
    fn test_window_is_bounded() {
        let stats = LatencyStats::default();
        for _ in 0..WINDOW + 10 {
            stats.record(Duration::from_millis(3));
        }
        assert_eq!(stats.window.lock().unwrap().len(), WINDOW);
        assert_eq!(stats.count(), (WINDOW + 10) as u64);
    }

    #[test]
    fn test_endpoint_counts_errors() {
        let metrics = AppMetrics::new();
        metrics.tts.record_success(Duration::from_millis(10));
        metrics.tts.record_error();
        metrics.record_chunk(300);
        metrics.record_chunk(200);
        metrics.record_tts_samples(160);
        let snap = metrics.snapshot();
        assert_eq!(snap.endpoints.tts.request_count, 2);
        assert_eq!(snap.endpoints.tts.error_count, 1);
        assert_eq!(snap.synthesis.chunks, 2);
        assert_eq!(snap.synthesis.stream_samples, 500);
        assert_eq!(snap.synthesis.tts_samples, 160);
    }
}
