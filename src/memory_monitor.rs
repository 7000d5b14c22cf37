//! A host-side source of memory-pressure warnings for platforms that don't deliver one.
//!
//! [SystemMemoryMonitor] samples system memory on a background thread and calls
//! [MemoryPressureNotifier::notify] when utilization rises to the configured threshold.  It fires once per crossing: the
//! next warning needs utilization to drop back below the threshold first.
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::*;

#[derive(Debug, Clone, PartialEq, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct MemoryMonitorConfig {
    /// How long to sleep between samples.
    #[builder(default = "Duration::from_secs(5)")]
    pub poll_interval: Duration,
    /// Fraction of system memory in use, in `(0, 1]`, at which to warn.
    #[builder(default = "0.9")]
    pub pressure_threshold: f64,
}

impl MemoryMonitorConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(t) = self.pressure_threshold {
            if !(t > 0.0 && t <= 1.0) {
                return Err(format!("pressure_threshold must be in (0, 1], got {}", t));
            }
        }
        if self.poll_interval == Some(Duration::ZERO) {
            return Err("poll_interval must be non-zero".to_string());
        }
        Ok(())
    }
}

impl Default for MemoryMonitorConfig {
    fn default() -> MemoryMonitorConfig {
        MemoryMonitorConfig {
            poll_interval: Duration::from_secs(5),
            pressure_threshold: 0.9,
        }
    }
}

impl From<MemoryMonitorConfigBuilderError> for ConfigError {
    fn from(e: MemoryMonitorConfigBuilderError) -> ConfigError {
        ConfigError::InvalidConfiguration(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemorySample {
    pub fn utilization(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Reads current memory usage.  Returns `None` when no reading is available.
pub trait MemorySampler {
    fn sample(&mut self) -> Option<MemorySample>;
}

/// Samples the whole system's memory via `sysinfo`.
pub struct SysinfoSampler {
    system: sysinfo::System,
}

impl SysinfoSampler {
    pub fn new() -> SysinfoSampler {
        SysinfoSampler {
            system: sysinfo::System::new(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> SysinfoSampler {
        SysinfoSampler::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn sample(&mut self) -> Option<MemorySample> {
        self.system.refresh_memory();
        let total_bytes = self.system.total_memory();
        if total_bytes == 0 {
            return None;
        }
        Some(MemorySample {
            used_bytes: total_bytes.saturating_sub(self.system.available_memory()),
            total_bytes,
        })
    }
}

/// Edge detection over a stream of samples.
#[derive(Debug)]
struct PressureDetector {
    threshold: f64,
    pressured: bool,
}

impl PressureDetector {
    fn new(threshold: f64) -> PressureDetector {
        PressureDetector {
            threshold,
            pressured: false,
        }
    }

    /// Returns true when this sample starts a new period of pressure.
    fn observe(&mut self, sample: MemorySample) -> bool {
        let now = sample.utilization() >= self.threshold;
        let fire = now && !self.pressured;
        self.pressured = now;
        fire
    }
}

pub struct SystemMemoryMonitor {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SystemMemoryMonitor {
    /// Start watching system memory, warning `notifier` on each crossing.
    pub fn spawn(
        notifier: Arc<MemoryPressureNotifier>,
        config: MemoryMonitorConfig,
    ) -> std::io::Result<SystemMemoryMonitor> {
        SystemMemoryMonitor::spawn_with_sampler(notifier, config, SysinfoSampler::new())
    }

    pub fn spawn_with_sampler<S: MemorySampler + Send + 'static>(
        notifier: Arc<MemoryPressureNotifier>,
        config: MemoryMonitorConfig,
        mut sampler: S,
    ) -> std::io::Result<SystemMemoryMonitor> {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("memory-monitor".to_string())
            .spawn(move || {
                let mut detector = PressureDetector::new(config.pressure_threshold);
                loop {
                    if let Some(sample) = sampler.sample() {
                        if detector.observe(sample) {
                            tracing::info!(
                                utilization = sample.utilization(),
                                threshold = config.pressure_threshold,
                                "System memory pressure detected"
                            );
                            notifier.notify();
                        }
                    }

                    match stop_rx.recv_timeout(config.poll_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        // Asked to stop, or the monitor was dropped.
                        _ => break,
                    }
                }
            })?;

        Ok(SystemMemoryMonitor {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop sampling and wait for the background thread to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.stop.send(());
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                tracing::warn!("Memory monitor thread panicked");
            }
        }
    }
}

impl Drop for SystemMemoryMonitor {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
