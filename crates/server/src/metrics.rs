//! Prometheus metrics

use std::sync::OnceLock;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use voice_journal_pipeline::TurnReport;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Only the first call installs; later calls return the same handle.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Some(handle);
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let handle = METRICS_HANDLE.get_or_init(|| handle);
            register_default_metrics();
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

fn register_default_metrics() {
    for endpoint in ["sse", "ws"] {
        counter!("voice_journal_turns_started_total", "endpoint" => endpoint).absolute(0);
    }
    for outcome in [
        "completed",
        "model_failed",
        "persistence_failed",
        "timed_out",
        "cancelled",
    ] {
        counter!("voice_journal_turns_finished_total", "outcome" => outcome).absolute(0);
    }
    counter!("voice_journal_sentences_synthesized_total").absolute(0);
    counter!("voice_journal_synthesis_failures_total").absolute(0);
    counter!("voice_journal_events_dropped_total").absolute(0);
}

pub fn record_turn_started(endpoint: &'static str) {
    counter!("voice_journal_turns_started_total", "endpoint" => endpoint).increment(1);
}

pub fn record_turn_finished(report: &TurnReport) {
    counter!("voice_journal_turns_finished_total", "outcome" => report.outcome.as_str())
        .increment(1);

    let failed = report.failed_sentences.len();
    let synthesized = report.total_sentences.saturating_sub(failed);
    counter!("voice_journal_sentences_synthesized_total").increment(synthesized as u64);
    counter!("voice_journal_synthesis_failures_total").increment(failed as u64);

    if let Some(ttft) = report.time_to_first_token {
        histogram!("voice_journal_first_token_seconds").record(ttft.as_secs_f64());
    }
    if let Some(ttfa) = report.time_to_first_audio {
        histogram!("voice_journal_first_audio_seconds").record(ttfa.as_secs_f64());
    }
    histogram!("voice_journal_turn_latency_seconds").record(report.latency.as_secs_f64());
}

pub fn record_turn_cancelled() {
    counter!("voice_journal_turns_finished_total", "outcome" => "cancelled").increment(1);
}

pub fn record_events_dropped(count: u64) {
    if count > 0 {
        counter!("voice_journal_events_dropped_total").increment(count);
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics disabled\n".to_string(),
        ),
    }
}
