use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keep this many latency samples for the average
const DURATION_WINDOW: usize = 1000;

pub struct Metrics {
    pub requests_total: Arc<RwLock<u64>>,
    pub detections_total: Arc<RwLock<u64>>,
    pub signs_total: Arc<RwLock<u64>>,
    pub errors_total: Arc<RwLock<u64>>,
    pub detection_duration: Arc<RwLock<Vec<f64>>>,
    pub model_loaded: Arc<RwLock<bool>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_model_loaded(false)
    }

    /// Metrics for a server whose model may already be in memory
    pub fn with_model_loaded(loaded: bool) -> Self {
        gauge!("signwatch_model_loaded").set(if loaded { 1.0 } else { 0.0 });
        Self {
            requests_total: Arc::new(RwLock::new(0)),
            detections_total: Arc::new(RwLock::new(0)),
            signs_total: Arc::new(RwLock::new(0)),
            errors_total: Arc::new(RwLock::new(0)),
            detection_duration: Arc::new(RwLock::new(Vec::new())),
            model_loaded: Arc::new(RwLock::new(loaded)),
        }
    }

    pub async fn record_request(&self) {
        *self.requests_total.write().await += 1;
        counter!("signwatch_requests_total").increment(1);
    }

    /// One analysed image that produced `signs` detections
    pub async fn record_detection(&self, duration_ms: f64, signs: usize) {
        *self.detections_total.write().await += 1;
        *self.signs_total.write().await += signs as u64;

        let mut durations = self.detection_duration.write().await;
        durations.push(duration_ms);
        if durations.len() > DURATION_WINDOW {
            durations.remove(0);
        }

        counter!("signwatch_detections_total").increment(1);
        counter!("signwatch_signs_detected_total").increment(signs as u64);
        histogram!("signwatch_detection_duration_ms").record(duration_ms);
    }

    pub async fn record_error(&self, code: &str) {
        *self.errors_total.write().await += 1;
        counter!("signwatch_errors_total", "code" => code.to_string()).increment(1);
    }

    pub async fn set_model_loaded(&self, loaded: bool) {
        *self.model_loaded.write().await = loaded;
        gauge!("signwatch_model_loaded").set(if loaded { 1.0 } else { 0.0 });
    }

    pub async fn average_duration_ms(&self) -> f64 {
        let durations = self.detection_duration.read().await;
        if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        }
    }

    pub async fn get_prometheus_metrics(&self) -> String {
        format!(
            "# HELP signwatch_requests_total Total number of API requests\n\
             # TYPE signwatch_requests_total counter\n\
             signwatch_requests_total {}\n\
             # HELP signwatch_detections_total Images analysed\n\
             # TYPE signwatch_detections_total counter\n\
             signwatch_detections_total {}\n\
             # HELP signwatch_signs_detected_total Traffic signs found across all images\n\
             # TYPE signwatch_signs_detected_total counter\n\
             signwatch_signs_detected_total {}\n\
             # HELP signwatch_errors_total Failed API requests\n\
             # TYPE signwatch_errors_total counter\n\
             signwatch_errors_total {}\n\
             # HELP signwatch_detection_duration_ms_avg Mean detection latency over recent requests\n\
             # TYPE signwatch_detection_duration_ms_avg gauge\n\
             signwatch_detection_duration_ms_avg {:.3}\n\
             # HELP signwatch_model_loaded Whether the detector weights are in memory\n\
             # TYPE signwatch_model_loaded gauge\n\
             signwatch_model_loaded {}\n",
            *self.requests_total.read().await,
            *self.detections_total.read().await,
            *self.signs_total.read().await,
            *self.errors_total.read().await,
            self.average_duration_ms().await,
            u8::from(*self.model_loaded.read().await),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
