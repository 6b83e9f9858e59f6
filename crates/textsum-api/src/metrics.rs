//! Prometheus registry behind `/metrics`.
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct ApiMetrics {
    registry: Registry,
    /// Requests by route and status code
    pub requests: IntCounterVec,
    /// Pipeline runs by outcome (`succeeded`, `aborted`, `error`)
    pub pipeline_runs: IntCounterVec,
    pub prediction_seconds: Histogram,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("textsum".to_string()), None)?;

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )?;
        let pipeline_runs = IntCounterVec::new(
            Opts::new("pipeline_runs_total", "Training pipeline runs by outcome"),
            &["outcome"],
        )?;
        let prediction_seconds = Histogram::with_opts(HistogramOpts::new(
            "prediction_seconds",
            "Wall time of one prediction, model loading included",
        ))?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(pipeline_runs.clone()))?;
        registry.register(Box::new(prediction_seconds.clone()))?;

        Ok(Self {
            registry,
            requests,
            pipeline_runs,
            prediction_seconds,
        })
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
