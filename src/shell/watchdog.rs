//! Periodic liveness timer.
//!
//! Each session owns one [`Ticker`] and re-arms it whenever a batch becomes
//! active. The ticker only keeps time; the decision to time out or declare
//! the shell dead is made by the session in its tick handler, under its own
//! lock.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Whether a ticker should keep running after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Keep ticking.
    Continue,
    /// Stop; the handler will not be called again.
    Stop,
}

/// Watchdog bookkeeping kept inside the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchdogState {
    /// Ticks allowed per batch; 0 disables the watchdog.
    pub timeout: u32,
    /// Ticks counted for the active batch.
    pub elapsed: u32,
}

/// What a watchdog tick concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The batch may keep running.
    Healthy,
    /// The batch exceeded its allowance.
    TimedOut,
    /// The shell is no longer running.
    Dead,
}

impl WatchdogState {
    /// Resets the tick count for a newly activated batch.
    pub fn reset(&mut self) {
        self.elapsed = 0;
    }

    /// Returns `true` if a ticker should run at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.timeout > 0
    }

    /// Accounts for one tick.
    pub fn tick(&mut self, alive: bool) -> Verdict {
        if !alive {
            return Verdict::Dead;
        }
        self.elapsed = self.elapsed.saturating_add(1);
        if self.elapsed > self.timeout {
            Verdict::TimedOut
        } else {
            Verdict::Healthy
        }
    }
}

#[derive(Default)]
struct Schedule {
    stopped: bool,
    armed: bool,
    epoch: u64,
}

#[derive(Default)]
struct Signal {
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

impl Signal {
    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A long-lived thread calling a handler at a fixed period while armed.
///
/// Every [`Ticker::arm`] starts a new epoch: the first tick of an epoch comes
/// one full period after arming, and the handler receives the epoch it fires
/// for so that a tick racing a re-arm can be recognised as stale.
pub struct Ticker {
    signal: Arc<Signal>,
}

impl Ticker {
    /// Starts the ticker thread, disarmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be created.
    pub fn start<F>(name: &str, period: Duration, mut on_tick: F) -> std::io::Result<Self>
    where
        F: FnMut(u64) -> Tick + Send + 'static,
    {
        let signal = Arc::new(Signal::default());
        let thread_signal = Arc::clone(&signal);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || tick_loop(&thread_signal, period, &mut on_tick))?;
        Ok(Self { signal })
    }

    /// Restarts the period and returns the new epoch.
    pub fn arm(&self) -> u64 {
        let mut schedule = self.signal.lock();
        schedule.epoch = schedule.epoch.wrapping_add(1);
        schedule.armed = true;
        self.signal.wake.notify_all();
        schedule.epoch
    }

    /// Pauses ticking until the next [`Ticker::arm`].
    pub fn disarm(&self) {
        let mut schedule = self.signal.lock();
        schedule.armed = false;
        schedule.epoch = schedule.epoch.wrapping_add(1);
        self.signal.wake.notify_all();
    }

    /// Ends the thread. A tick already in progress still completes.
    pub fn stop(&self) {
        self.signal.lock().stopped = true;
        self.signal.wake.notify_all();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop<F>(signal: &Signal, period: Duration, on_tick: &mut F)
where
    F: FnMut(u64) -> Tick,
{
    let mut due: Option<(u64, Instant)> = None;
    loop {
        let epoch = {
            let mut schedule = signal.lock();
            loop {
                if schedule.stopped {
                    return;
                }
                if !schedule.armed {
                    due = None;
                    schedule = signal.wake.wait(schedule).unwrap_or_else(PoisonError::into_inner);
                    continue;
                }
                let at = match due {
                    Some((epoch, at)) if epoch == schedule.epoch => at,
                    _ => Instant::now() + period,
                };
                due = Some((schedule.epoch, at));
                match at.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => {
                        schedule = signal
                            .wake
                            .wait_timeout(schedule, left)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                    _ => break schedule.epoch,
                }
            }
        };
        if on_tick(epoch) == Tick::Stop {
            return;
        }
        if let Some((_, at)) = due.as_mut() {
            *at += period;
        }
    }
}
