//! Idle-shutdown supervisor.
//!
//! Owns the worker's single piece of process-wide state: the busy/idle flag
//! and the time of the last idle mark. A background watchdog checks on a
//! fixed interval and initiates a graceful exit once the worker has been
//! idle past the threshold. The busy flag and idle mark live under one lock
//! so the watchdog can never fire mid-job, whatever the interleaving of
//! marks and ticks.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct SupervisorState {
    busy: bool,
    last_idle_mark: Instant,
    jobs_processed: u64,
}

/// Handle to the worker's busy/idle state machine. Cheap to clone; all
/// clones share the same state.
#[derive(Clone)]
pub struct IdleShutdown {
    state: Arc<Mutex<SupervisorState>>,
    started_at: Instant,
    idle_threshold: Duration,
}

/// Point-in-time view for the status endpoint.
#[derive(Debug, Clone)]
pub struct SupervisorSnapshot {
    pub busy: bool,
    pub uptime: Duration,
    pub jobs_processed: u64,
}

impl IdleShutdown {
    pub fn new(idle_threshold: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SupervisorState {
                busy: false,
                last_idle_mark: Instant::now(),
                jobs_processed: 0,
            })),
            started_at: Instant::now(),
            idle_threshold,
        }
    }

    /// Mark the worker busy. Must precede any possibility of acknowledging
    /// the job's queue message.
    pub fn mark_busy(&self) {
        let mut state = self.state.lock().unwrap();
        state.busy = true;
    }

    /// Mark the worker idle again, re-arming the idle timer. Only called
    /// once the job has reached a terminal state.
    pub fn mark_idle(&self) {
        let mut state = self.state.lock().unwrap();
        state.busy = false;
        state.last_idle_mark = Instant::now();
    }

    pub fn record_job(&self) {
        let mut state = self.state.lock().unwrap();
        state.jobs_processed += 1;
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap().busy
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        let state = self.state.lock().unwrap();
        SupervisorSnapshot {
            busy: state.busy,
            uptime: self.started_at.elapsed(),
            jobs_processed: state.jobs_processed,
        }
    }

    /// Whether the idle threshold has elapsed. Busy and the idle mark are
    /// read under the same lock, so a tick can never observe a stale idle
    /// mark alongside a fresh busy flag.
    fn should_shutdown(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.busy && state.last_idle_mark.elapsed() >= self.idle_threshold
    }

    /// Spawn the watchdog. Sends one message on `shutdown_tx` when the
    /// worker has sat idle past the threshold, then exits.
    pub fn spawn_watchdog(
        &self,
        check_interval: Duration,
        shutdown_tx: mpsc::Sender<()>,
    ) -> tokio::task::JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if supervisor.should_shutdown() {
                    tracing::info!(
                        idle_threshold_secs = supervisor.idle_threshold.as_secs(),
                        jobs_processed = supervisor.snapshot().jobs_processed,
                        "Idle threshold exceeded, initiating shutdown"
                    );
                    let _ = shutdown_tx.send(()).await;
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_supervisor_is_idle_but_within_threshold() {
        let supervisor = IdleShutdown::new(Duration::from_secs(600));
        assert!(!supervisor.is_busy());
        assert!(!supervisor.should_shutdown());
    }

    #[test]
    fn never_fires_while_busy() {
        let supervisor = IdleShutdown::new(Duration::ZERO);
        supervisor.mark_busy();
        // Zero threshold: any tick would fire if the busy flag were ignored.
        assert!(!supervisor.should_shutdown());
    }

    #[test]
    fn fires_once_idle_past_threshold() {
        let supervisor = IdleShutdown::new(Duration::ZERO);
        supervisor.mark_busy();
        supervisor.mark_idle();
        assert!(supervisor.should_shutdown());
    }

    #[test]
    fn busy_idle_busy_interleaving_keeps_it_armed_off() {
        let supervisor = IdleShutdown::new(Duration::ZERO);
        supervisor.mark_busy();
        supervisor.mark_idle();
        supervisor.mark_busy();
        assert!(!supervisor.should_shutdown());
        supervisor.mark_idle();
        assert!(supervisor.should_shutdown());
    }

    #[test]
    fn job_counter_accumulates() {
        let supervisor = IdleShutdown::new(Duration::from_secs(600));
        supervisor.record_job();
        supervisor.record_job();
        assert_eq!(supervisor.snapshot().jobs_processed, 2);
    }

    #[tokio::test]
    async fn watchdog_sends_shutdown_when_idle() {
        let supervisor = IdleShutdown::new(Duration::ZERO);
        let (tx, mut rx) = mpsc::channel(1);
        supervisor.spawn_watchdog(Duration::from_millis(5), tx);
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("watchdog should have fired")
            .expect("channel open");
    }

    #[tokio::test]
    async fn watchdog_stays_quiet_while_busy() {
        let supervisor = IdleShutdown::new(Duration::ZERO);
        supervisor.mark_busy();
        let (tx, mut rx) = mpsc::channel(1);
        supervisor.spawn_watchdog(Duration::from_millis(5), tx);
        let fired = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(fired.is_err(), "watchdog must not fire while busy");
    }
}
