//! Metrics collection for `retrodrive`.
//!
//! Prometheus-compatible metrics for the phase engine and the generation
//! proxy, with typed convenience functions for recording measurements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::RetroDriveError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Maximum length for phase and step name labels.
const MAX_LABEL_LEN: usize = 64;

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`.  When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `RetroDriveError::Io` if the recorder or HTTP listener
/// cannot be installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), RetroDriveError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| RetroDriveError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!("retrodrive_ticks_total", "Total number of phase ticks");
    describe_counter!(
        "retrodrive_steps_fired_total",
        "Steps whose condition held and whose action ran"
    );
    describe_counter!(
        "retrodrive_phase_transitions_total",
        "Total number of phase transitions"
    );
    describe_gauge!(
        "retrodrive_current_phase",
        "Currently active phase (1 = active)"
    );
    describe_counter!("retrodrive_stalls_total", "Phases that hit their tick budget");
    describe_counter!(
        "retrodrive_generation_requests_total",
        "Generation requests by backend and outcome"
    );
    describe_counter!(
        "retrodrive_fallbacks_total",
        "Generation requests answered with fallback text"
    );
    describe_histogram!(
        "retrodrive_generation_duration_ms",
        "Generation latency in milliseconds"
    );
}

/// Records one tick of the given phase.
pub fn record_tick(phase: &str) {
    counter!("retrodrive_ticks_total", "phase" => sanitize_label(phase)).increment(1);
}

/// Records a step whose action ran.
pub fn record_step_fired(phase: &str, step: &str) {
    counter!(
        "retrodrive_steps_fired_total",
        "phase" => sanitize_label(phase),
        "step" => sanitize_label(step),
    )
    .increment(1);
}

/// Records a phase transition.
pub fn record_phase_transition(from: &str, to: &str) {
    counter!(
        "retrodrive_phase_transitions_total",
        "from" => sanitize_label(from),
        "to" => sanitize_label(to)
    )
    .increment(1);
}

/// Sets the currently active phase gauge.
///
/// Zeros out the previous phase label (if any) before setting the new one.
pub fn set_current_phase(phase_name: &str, previous_phase: Option<&str>) {
    if let Some(prev) = previous_phase {
        gauge!("retrodrive_current_phase", "phase_name" => sanitize_label(prev)).set(0.0);
    }
    gauge!("retrodrive_current_phase", "phase_name" => sanitize_label(phase_name)).set(1.0);
}

/// Records a phase stall.
pub fn record_stall(phase: &str) {
    counter!("retrodrive_stalls_total", "phase" => sanitize_label(phase)).increment(1);
}

/// Records a generation request outcome and latency.
///
/// `outcome` is `"success"` or a backend error label.
pub fn record_generation(backend: &str, outcome: &str, used_fallback: bool, duration: Duration) {
    counter!(
        "retrodrive_generation_requests_total",
        "backend" => sanitize_label(backend),
        "outcome" => sanitize_label(outcome),
    )
    .increment(1);
    if used_fallback {
        counter!("retrodrive_fallbacks_total", "backend" => sanitize_label(backend)).increment(1);
    }
    histogram!("retrodrive_generation_duration_ms", "backend" => sanitize_label(backend))
        .record(duration.as_secs_f64() * 1000.0);
}

/// Sanitizes a name for use as a metrics label.
///
/// Truncates to [`MAX_LABEL_LEN`] characters and replaces any characters
/// invalid in Prometheus labels with underscores.
fn sanitize_label(name: &str) -> String {
    name.chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_label("phase1"), "phase1");
        assert_eq!(sanitize_label("click:confirm"), "click_confirm");
        assert_eq!(sanitize_label(&"x".repeat(500)).len(), MAX_LABEL_LEN);
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // metrics macros silently no-op when no global recorder is installed
        record_tick("phase1");
        record_step_fired("phase1", "confirm");
        record_phase_transition("phase1", "phase2");
        set_current_phase("phase2", Some("phase1"));
        record_stall("phase3");
        record_generation("ollama", "network", true, Duration::from_millis(15));
    }
}
