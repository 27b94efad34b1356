use crate::client::{CarrierClient, CarrierClientError};
use crate::services::ingest::{write_energy_usage, write_odu_status};
use crate::transport::HttpTransport;
use chrono::Utc;
use diesel::SqliteConnection;
use log::{debug, info, warn};
use rand::Rng;
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::future::Future;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub const MAX_BACKOFF: Duration = Duration::from_secs(600);
/// Upper bound of the random extra delay, as a fraction of the backoff.
const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub energy_interval: Duration,
    /// Consecutive retryable failures tolerated before giving up.
    pub max_retries: NonZeroU32,
    pub max_backoff: Duration,
    /// Stop after this many successful ticks (`None` = until shut down).
    pub max_ticks: Option<u64>,
}

/// Lets another thread stop the loop, including mid-sleep.
#[derive(Debug, Default)]
pub struct Shutdown {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cv.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`; returns `true` if shutdown was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Trigger `shutdown` from a background thread once `signal` resolves
/// (e.g. `tokio::signal::ctrl_c()`).
pub fn trigger_when<F>(shutdown: Arc<Shutdown>, signal: F) -> Result<thread::JoinHandle<()>, String>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("signal runtime failed: {}", e))?;
    thread::Builder::new()
        .name("shutdown-signal".to_string())
        .spawn(move || match runtime.block_on(signal) {
            Ok(()) => {
                info!("Shutdown requested; stopping after the current tick");
                shutdown.trigger();
            }
            Err(e) => warn!("Unable to listen for shutdown signal: {}", e),
        })
        .map_err(|e| format!("spawning signal thread failed: {}", e))
}

/// `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

fn with_jitter(delay: Duration) -> Duration {
    let extra = rand::rng().random_range(0.0..=JITTER_FRACTION);
    delay + delay.mul_f64(extra)
}

/// What one tick has fetched and written so far. Kept across retries of the
/// same tick so finished systems are not fetched or stored twice.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub odu_rows: usize,
    pub energy_rows: usize,
    status_done: BTreeSet<String>,
    energy_done: BTreeSet<String>,
}

/// Poll every system until shut down, `max_ticks` is reached, a fatal error
/// occurs, or retryable errors persist past `max_retries`.
pub fn run_loop<T: HttpTransport>(
    mut store: Option<&mut SqliteConnection>,
    client: &CarrierClient<T>,
    serials: &[String],
    settings: &PollSettings,
    shutdown: &Shutdown,
) -> Result<u64, String> {
    let mut ticks: u64 = 0;
    let mut failures: u32 = 0;
    let mut last_energy: Option<Instant> = None;
    let mut report = TickReport::default();

    while !shutdown.is_triggered() {
        let tick_start = Instant::now();
        let energy_due = last_energy.is_none_or(|t| t.elapsed() >= settings.energy_interval);

        let delay = match collect_tick(store.as_deref_mut(), client, serials, energy_due, &mut report) {
            Ok(()) => {
                let report = std::mem::take(&mut report);
                failures = 0;
                ticks += 1;
                if energy_due {
                    last_energy = Some(tick_start);
                }
                info!(
                    "Tick {}: {} system(s), {} odu_status row(s), {} energy row(s)",
                    ticks,
                    serials.len(),
                    report.odu_rows,
                    report.energy_rows
                );
                if settings.max_ticks.is_some_and(|max| ticks >= max) {
                    break;
                }
                // Maintain steady cadence
                settings.interval.saturating_sub(tick_start.elapsed())
            }
            Err(e) if e.is_retryable() => {
                failures += 1;
                if failures > settings.max_retries.get() {
                    return Err(format!("giving up after {} consecutive failures: {}", failures, e));
                }
                let delay = with_jitter(backoff_delay(settings.interval, failures, settings.max_backoff));
                warn!(
                    "Poll failed ({}/{}), retrying in {}s: {}",
                    failures,
                    settings.max_retries,
                    delay.as_secs(),
                    e
                );
                delay
            }
            Err(e) => return Err(format!("poll failed: {}", e)),
        };

        if shutdown.wait(delay) {
            break;
        }
    }

    info!("Polling stopped after {} tick(s)", ticks);
    Ok(ticks)
}

/// Fetch (and store) every system not yet done in `report`.
pub fn collect_tick<T: HttpTransport>(
    mut store: Option<&mut SqliteConnection>,
    client: &CarrierClient<T>,
    serials: &[String],
    include_energy: bool,
    report: &mut TickReport,
) -> Result<(), CarrierClientError> {
    for serial in serials {
        if !report.status_done.contains(serial) {
            let status = client.get_odu_status(serial)?;
            debug!(
                "{}: {} opmode={} oat={} comprpm={}",
                serial, status.timestamp, status.opmode, status.oat, status.comprpm
            );
            if let Some(conn) = store.as_deref_mut() {
                report.odu_rows += write_odu_status(conn, &status).map_err(store_error)?;
            }
            report.status_done.insert(serial.clone());
        }

        if include_energy && !report.energy_done.contains(serial) {
            let energy = client.get_energy(serial)?;
            if let Some(conn) = store.as_deref_mut() {
                report.energy_rows += write_energy_usage(conn, &energy, Utc::now()).map_err(store_error)?;
            }
            report.energy_done.insert(serial.clone());
        }
    }

    Ok(())
}

// Store failures are fatal.
fn store_error(message: String) -> CarrierClientError {
    CarrierClientError::InvalidRequest(format!("store: {}", message))
}
