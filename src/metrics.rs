use lazy_static::lazy_static;
use log::warn;
use prometheus::core::Collector;
use prometheus::{Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Once;
use std::time::{Duration, Instant};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref CPU_INSTRUCTIONS_TOTAL: Counter = Counter::new(
        "apple1_cpu_instructions_total", "Total number of CPU instructions executed"
    ).expect("Failed to create CPU instructions counter");

    pub static ref CPU_CYCLES_TOTAL: Counter = Counter::new(
        "apple1_cpu_cycles_total", "Total number of CPU cycles executed"
    ).expect("Failed to create CPU cycles counter");

    /// Interrupts serviced, by kind ("irq" or "nmi")
    pub static ref INTERRUPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("apple1_interrupts_total", "Interrupts serviced by the CPU"),
        &["kind"]
    ).expect("Failed to create interrupts counter");

    pub static ref SYNC_INTERVALS_TOTAL: Counter = Counter::new(
        "apple1_sync_intervals_total", "Pacing intervals run by the execution thread"
    ).expect("Failed to create sync intervals counter");

    /// Intervals that overran their budget and got the minimum sleep
    pub static ref LATE_INTERVALS_TOTAL: Counter = Counter::new(
        "apple1_late_intervals_total", "Pacing intervals that started behind schedule"
    ).expect("Failed to create late intervals counter");

    pub static ref TARGET_FREQUENCY_KHZ: Gauge = Gauge::new(
        "apple1_target_frequency_khz", "Emulated CPU frequency in kHz"
    ).expect("Failed to create target frequency gauge");

    /// Resets by kind ("soft" or "hard")
    pub static ref RESETS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("apple1_resets_total", "Machine resets"),
        &["kind"]
    ).expect("Failed to create resets counter");

    pub static ref KEYBOARD_BYTES_TOTAL: Counter = Counter::new(
        "apple1_keyboard_bytes_total", "Bytes handed to the keyboard port"
    ).expect("Failed to create keyboard bytes counter");

    pub static ref DISPLAY_BYTES_TOTAL: Counter = Counter::new(
        "apple1_display_bytes_total", "Bytes consumed from the display port"
    ).expect("Failed to create display bytes counter");

    /// Counter for API requests by endpoint and method
    pub static ref API_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("apple1_api_requests_total", "Total number of control API requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create API requests counter");

    pub static ref API_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("apple1_api_request_duration_seconds", "Control API request duration")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["method", "endpoint"]
    ).expect("Failed to create API request duration histogram");
}

static INIT: Once = Once::new();

/// Registers every collector with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(CPU_INSTRUCTIONS_TOTAL.clone()),
            Box::new(CPU_CYCLES_TOTAL.clone()),
            Box::new(INTERRUPTS_TOTAL.clone()),
            Box::new(SYNC_INTERVALS_TOTAL.clone()),
            Box::new(LATE_INTERVALS_TOTAL.clone()),
            Box::new(TARGET_FREQUENCY_KHZ.clone()),
            Box::new(RESETS_TOTAL.clone()),
            Box::new(KEYBOARD_BYTES_TOTAL.clone()),
            Box::new(DISPLAY_BYTES_TOTAL.clone()),
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(API_REQUEST_DURATION.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Record the work done in one pacing interval
pub fn record_interval(instructions: u64, cycles: u64, late: bool) {
    CPU_INSTRUCTIONS_TOTAL.inc_by(instructions as f64);
    CPU_CYCLES_TOTAL.inc_by(cycles as f64);
    SYNC_INTERVALS_TOTAL.inc();
    if late {
        LATE_INTERVALS_TOTAL.inc();
    }
}

pub fn record_interrupt(kind: &str) {
    INTERRUPTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_reset(kind: &str) {
    RESETS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn set_target_frequency(khz: u32) {
    TARGET_FREQUENCY_KHZ.set(khz as f64);
}

pub fn record_keyboard_byte() {
    KEYBOARD_BYTES_TOTAL.inc();
}

pub fn record_display_byte() {
    DISPLAY_BYTES_TOTAL.inc();
}

/// Record an API request
pub fn record_api_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    API_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    API_REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Prometheus text exposition of everything in [`REGISTRY`].
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
