use crate::traits::MetricsSink;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};

pub const DURATION_BUCKETS: [f64; 9] = [0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0];

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn observe_extraction_duration(&self, _seconds: f64) {}
    fn increment_documents_processed(&self, _status: &str) {}
    fn increment_llm_error(&self, _provider: &str, _error_type: &str) {}
    fn add_upload_bytes(&self, _bytes: u64) {}
}

/// Fixed-bucket histogram; `bucket_counts[i]` is cumulative up to `DURATION_BUCKETS[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurationHistogram {
    pub bucket_counts: [u64; DURATION_BUCKETS.len()],
    pub sum: f64,
    pub count: u64,
}

impl DurationHistogram {
    pub fn observe(&mut self, seconds: f64) {
        for (bound, slot) in DURATION_BUCKETS.iter().zip(self.bucket_counts.iter_mut()) {
            if seconds <= *bound {
                *slot += 1;
            }
        }
        self.sum += seconds;
        self.count += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub documents_processed: BTreeMap<String, u64>,
    pub llm_errors: BTreeMap<(String, String), u64>,
    pub durations: DurationHistogram,
    pub upload_bytes: u64,
}

/// Process-lifetime counters kept in memory, renderable as Prometheus text.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    state: Mutex<MetricsSnapshot>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }

    pub fn documents_processed(&self, status: &str) -> u64 {
        self.lock()
            .documents_processed
            .get(status)
            .copied()
            .unwrap_or(0)
    }

    pub fn llm_errors(&self, provider: &str, error_type: &str) -> u64 {
        self.lock()
            .llm_errors
            .get(&(provider.to_string(), error_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn duration_count(&self) -> u64 {
        self.lock().durations.count
    }

    pub fn render_prometheus(&self) -> String {
        let state = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "# HELP document_processing_total Total number of documents processed");
        let _ = writeln!(out, "# TYPE document_processing_total counter");
        for (status, count) in &state.documents_processed {
            let _ = writeln!(out, "document_processing_total{{status=\"{status}\"}} {count}");
        }

        let _ = writeln!(
            out,
            "# HELP llm_extraction_duration_seconds Time spent on LLM extraction in seconds"
        );
        let _ = writeln!(out, "# TYPE llm_extraction_duration_seconds histogram");
        let histogram = &state.durations;
        for (bucket, cumulative) in DURATION_BUCKETS.iter().zip(histogram.bucket_counts) {
            let _ = writeln!(
                out,
                "llm_extraction_duration_seconds_bucket{{le=\"{bucket:?}\"}} {cumulative}"
            );
        }
        let _ = writeln!(
            out,
            "llm_extraction_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            histogram.count
        );
        let _ = writeln!(out, "llm_extraction_duration_seconds_sum {}", histogram.sum);
        let _ = writeln!(out, "llm_extraction_duration_seconds_count {}", histogram.count);

        let _ = writeln!(out, "# HELP file_upload_bytes Total bytes uploaded");
        let _ = writeln!(out, "# TYPE file_upload_bytes counter");
        let _ = writeln!(out, "file_upload_bytes {}", state.upload_bytes);

        let _ = writeln!(out, "# HELP llm_errors_total LLM API errors by provider and type");
        let _ = writeln!(out, "# TYPE llm_errors_total counter");
        for ((provider, error_type), count) in &state.llm_errors {
            let _ = writeln!(
                out,
                "llm_errors_total{{provider=\"{provider}\",error_type=\"{error_type}\"}} {count}"
            );
        }

        out
    }
}

impl MetricsSink for InMemoryMetrics {
    fn observe_extraction_duration(&self, seconds: f64) {
        self.lock().durations.observe(seconds);
    }

    fn increment_documents_processed(&self, status: &str) {
        *self
            .lock()
            .documents_processed
            .entry(status.to_string())
            .or_insert(0) += 1;
    }

    fn increment_llm_error(&self, provider: &str, error_type: &str) {
        *self
            .lock()
            .llm_errors
            .entry((provider.to_string(), error_type.to_string()))
            .or_insert(0) += 1;
    }

    fn add_upload_bytes(&self, bytes: u64) {
        self.lock().upload_bytes += bytes;
    }
}
