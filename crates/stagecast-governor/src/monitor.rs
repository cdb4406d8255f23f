//! Periodic host sampling, request accounting, and threshold alerts.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stagecast_core::{config::MonitorConfig, BroadcastSink};
use stagecast_protocol::notifications::{PERFORMANCE_METRICS, ROOM_ADMIN};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    alert::{Alert, AlertKind, HealthStatus},
    error::SamplingError,
    ring::RingBuffer,
    sampler::{SystemReading, SystemSampler},
};

pub const SAMPLE_CAPACITY: usize = 60;
pub const RESPONSE_TIME_CAPACITY: usize = 100;
pub const ALERT_CAPACITY: usize = 50;
/// Alerts included in each snapshot, newest last.
pub const SNAPSHOT_ALERTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub sampled_at: DateTime<Utc>,
}

impl MetricSample {
    fn new(reading: SystemReading, sampled_at: DateTime<Utc>) -> Self {
        Self {
            cpu_percent: reading.cpu_percent,
            mem_percent: reading.mem_percent,
            disk_percent: reading.disk_percent,
            sampled_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSnapshot {
    pub active_connections: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate_percent: f64,
    pub avg_response_time_ms: f64,
}

/// Point-in-time view published to the admin room on every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub system: SystemSnapshot,
    pub application: ApplicationSnapshot,
    pub alerts: Vec<Alert>,
    pub health_status: HealthStatus,
}

/// Values every rule and the classification are evaluated against.
struct Readings {
    latest: Option<MetricSample>,
    total_requests: u64,
    total_errors: u64,
    error_rate_percent: f64,
    avg_response_time_ms: f64,
}

struct Control {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Shared {
    config: MonitorConfig,
    dedup_window: chrono::Duration,
    sink: Arc<dyn BroadcastSink>,
    sampler: Mutex<Box<dyn SystemSampler>>,
    samples: Mutex<RingBuffer<MetricSample>>,
    response_times: Mutex<RingBuffer<f64>>,
    alerts: Mutex<VecDeque<Alert>>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    active_connections: AtomicUsize,
    started: Instant,
    control: Mutex<Option<Control>>,
}

/// Health monitor handle. Cloning yields another handle to the same monitor.
///
/// Request accounting is lock-free for the counters; the rings and the alert
/// list each sit behind their own lock and no method holds two at once.
#[derive(Clone)]
pub struct HealthMonitor {
    shared: Arc<Shared>,
}

impl HealthMonitor {
    pub fn new(
        config: MonitorConfig,
        sampler: Box<dyn SystemSampler>,
        sink: Arc<dyn BroadcastSink>,
    ) -> Self {
        let dedup_window = chrono::Duration::from_std(config.alert_dedup_window())
            .unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            shared: Arc::new(Shared {
                config,
                dedup_window,
                sink,
                sampler: Mutex::new(sampler),
                samples: Mutex::new(RingBuffer::new(SAMPLE_CAPACITY)),
                response_times: Mutex::new(RingBuffer::new(RESPONSE_TIME_CAPACITY)),
                alerts: Mutex::new(VecDeque::with_capacity(ALERT_CAPACITY)),
                total_requests: AtomicU64::new(0),
                total_errors: AtomicU64::new(0),
                active_connections: AtomicUsize::new(0),
                started: Instant::now(),
                control: Mutex::new(None),
            }),
        }
    }

    /// Spawn the sampling loop unless it is already running. Must be called
    /// from within a Tokio runtime.
    pub fn start(&self) {
        let mut control = lock(&self.shared.control);
        if control.as_ref().is_some_and(|c| !c.handle.is_finished()) {
            return;
        }
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::clone(&self.shared), rx));
        *control = Some(Control {
            shutdown: tx,
            handle,
        });
        info!(
            interval_secs = self.shared.config.sample_interval().as_secs(),
            "health monitor started"
        );
    }

    /// Signal the sampling loop to exit. Takes effect at the loop's next
    /// await point; no further ticks run.
    pub fn stop(&self) {
        if let Some(control) = lock(&self.shared.control).take() {
            let _ = control.shutdown.send(true);
            info!("health monitor stop requested");
        }
    }

    /// `stop()`, then wait for the loop task to finish.
    pub async fn shutdown(&self) {
        let control = lock(&self.shared.control).take();
        if let Some(control) = control {
            let _ = control.shutdown.send(true);
            if let Err(e) = control.handle.await {
                error!(error = %e, "health monitor loop terminated abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.control)
            .as_ref()
            .is_some_and(|c| !c.handle.is_finished())
    }

    /// Account one handled request.
    pub fn record_request(&self, response_time_ms: f64, is_error: bool) {
        self.shared.total_requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.shared.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        lock(&self.shared.response_times).push(response_time_ms.max(0.0));
    }

    /// Gauge published by whoever owns the connection registry.
    pub fn set_active_connections(&self, count: usize) {
        self.shared
            .active_connections
            .store(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.shared.snapshot_at(Utc::now())
    }

    #[cfg(test)]
    fn tick_at(&self, now: DateTime<Utc>) -> HealthSnapshot {
        let reading = lock(&self.shared.sampler).sample();
        self.shared.evaluate(reading, now)
    }
}

impl Shared {
    /// Record one sampler result, evaluate the rules, publish. A failed
    /// sample keeps the previous readings.
    fn evaluate(
        &self,
        reading: Result<SystemReading, SamplingError>,
        now: DateTime<Utc>,
    ) -> HealthSnapshot {
        match reading {
            Ok(reading) => {
                lock(&self.samples).push(MetricSample::new(reading, now));
            }
            Err(e) => warn!(error = %e, "system sample failed; keeping last values"),
        }

        let readings = self.readings();
        for (kind, message) in self.breaches(&readings) {
            self.raise(kind, message, now);
        }

        let snapshot = self.snapshot_from(&readings, now);
        self.publish(&snapshot);
        snapshot
    }

    fn readings(&self) -> Readings {
        let latest = lock(&self.samples).latest().copied();
        let avg_response_time_ms = lock(&self.response_times).mean();
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_errors = self.total_errors.load(Ordering::Relaxed);
        let error_rate_percent = if total_requests == 0 {
            0.0
        } else {
            total_errors as f64 / total_requests as f64 * 100.0
        };
        Readings {
            latest,
            total_requests,
            total_errors,
            error_rate_percent,
            avg_response_time_ms,
        }
    }

    fn breaches(&self, r: &Readings) -> Vec<(AlertKind, String)> {
        let cfg = &self.config;
        let mut out = Vec::new();
        if let Some(sample) = r.latest {
            if sample.cpu_percent > cfg.cpu_high_percent {
                out.push((
                    AlertKind::CpuHigh,
                    format!(
                        "CPU usage at {:.1}% (threshold {:.0}%)",
                        sample.cpu_percent, cfg.cpu_high_percent
                    ),
                ));
            }
            if sample.mem_percent > cfg.memory_high_percent {
                out.push((
                    AlertKind::MemoryHigh,
                    format!(
                        "memory usage at {:.1}% (threshold {:.0}%)",
                        sample.mem_percent, cfg.memory_high_percent
                    ),
                ));
            }
        }
        if self.error_rate_breached(r) {
            out.push((
                AlertKind::ErrorRateHigh,
                format!(
                    "error rate at {:.1}% over {} requests (threshold {:.0}%)",
                    r.error_rate_percent, r.total_requests, cfg.error_rate_high_percent
                ),
            ));
        }
        if r.avg_response_time_ms > cfg.response_time_high_ms {
            out.push((
                AlertKind::ResponseTimeHigh,
                format!(
                    "average response time {:.0}ms (threshold {:.0}ms)",
                    r.avg_response_time_ms, cfg.response_time_high_ms
                ),
            ));
        }
        out
    }

    fn error_rate_breached(&self, r: &Readings) -> bool {
        r.total_requests > 0 && r.error_rate_percent > self.config.error_rate_high_percent
    }

    fn classify(&self, r: &Readings) -> HealthStatus {
        if self.error_rate_breached(r) {
            return HealthStatus::Critical;
        }
        let Some(sample) = r.latest else {
            return HealthStatus::Unknown;
        };
        let cfg = &self.config;
        if sample.cpu_percent > cfg.cpu_high_percent
            || sample.mem_percent > cfg.memory_high_percent
            || r.avg_response_time_ms > cfg.response_time_high_ms
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }

    /// Record an alert unless one of the same kind was raised inside the
    /// dedup window. Returns whether it was recorded.
    fn raise(&self, kind: AlertKind, message: String, now: DateTime<Utc>) -> bool {
        let mut alerts = lock(&self.alerts);
        let duplicate = alerts
            .iter()
            .rev()
            .any(|a| a.kind == kind && now.signed_duration_since(a.raised_at) < self.dedup_window);
        if duplicate {
            debug!(%kind, "alert suppressed inside dedup window");
            return false;
        }
        let severity = kind.severity();
        warn!(%kind, ?severity, %message, "health alert raised");
        alerts.push_back(Alert {
            kind,
            message,
            severity,
            raised_at: now,
        });
        while alerts.len() > ALERT_CAPACITY {
            alerts.pop_front();
        }
        true
    }

    fn snapshot_at(&self, now: DateTime<Utc>) -> HealthSnapshot {
        let readings = self.readings();
        self.snapshot_from(&readings, now)
    }

    fn snapshot_from(&self, r: &Readings, now: DateTime<Utc>) -> HealthSnapshot {
        let latest = r.latest.unwrap_or(MetricSample {
            cpu_percent: 0.0,
            mem_percent: 0.0,
            disk_percent: 0.0,
            sampled_at: now,
        });
        let alerts = {
            let alerts = lock(&self.alerts);
            let skip = alerts.len().saturating_sub(SNAPSHOT_ALERTS);
            alerts.iter().skip(skip).cloned().collect()
        };
        HealthSnapshot {
            timestamp: now,
            system: SystemSnapshot {
                cpu_percent: latest.cpu_percent,
                mem_percent: latest.mem_percent,
                disk_percent: latest.disk_percent,
                uptime_seconds: self.started.elapsed().as_secs(),
            },
            application: ApplicationSnapshot {
                active_connections: self.active_connections.load(Ordering::Relaxed),
                total_requests: r.total_requests,
                total_errors: r.total_errors,
                error_rate_percent: r.error_rate_percent,
                avg_response_time_ms: r.avg_response_time_ms,
            },
            alerts,
            health_status: self.classify(r),
        }
    }

    fn publish(&self, snapshot: &HealthSnapshot) {
        let payload = match serde_json::to_value(snapshot) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "health snapshot could not be encoded");
                return;
            }
        };
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.sink.emit(PERFORMANCE_METRICS, payload, Some(ROOM_ADMIN))
        }));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "health snapshot publish failed"),
            Err(_) => error!("broadcast sink panicked while publishing health snapshot"),
        }
    }
}

/// Sampling loop. Ticks immediately, then every `sample_interval` until the
/// shutdown signal flips or its sender is dropped.
async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(shared.config.sample_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let reading = sample_blocking(&shared).await;
                let snapshot = shared.evaluate(reading, Utc::now());
                debug!(status = %snapshot.health_status, "health tick");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("health monitor stopped");
}

/// Run the sampler on the blocking pool. A sysinfo refresh walks every mount
/// and must not hold a runtime worker.
async fn sample_blocking(shared: &Arc<Shared>) -> Result<SystemReading, SamplingError> {
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || lock(&shared.sampler).sample())
        .await
        .unwrap_or_else(|e| {
            Err(SamplingError::Unavailable {
                indicator: "sampler",
                reason: e.to_string(),
            })
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
