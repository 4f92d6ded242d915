//! Timed benchmark loop
//!
//! Repeats one complete cycle until the budget runs out, counting the cycles
//! that succeed. The first failing cycle stops the run.
//!
//! ```text
//! Idle --run--> Running --deadline reached--> Finished
//!                  |
//!                  +----cycle failed------> Failed
//! ```

use crate::{Error, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Default run time in seconds
pub const DEFAULT_TIME_SECS: u64 = 30;

/// Source of the current time
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Benchmark settings, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkConfig {
    duration: Duration,
    client_auth: bool,
}

impl BenchmarkConfig {
    /// `secs` must be at least 1
    pub fn new(secs: u64, client_auth: bool) -> Result<Self> {
        if secs == 0 {
            return Err(Error::Config(format!("Invalid time [{}]", secs)));
        }
        Ok(BenchmarkConfig { duration: Duration::from_secs(secs), client_auth })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn client_auth(&self) -> bool {
        self.client_auth
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig { duration: Duration::from_secs(DEFAULT_TIME_SECS), client_auth: false }
    }
}

/// When a run ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunBudget {
    /// Stop at the first cycle boundary at or past this much time
    Duration(Duration),
    /// Stop after this many successful cycles
    Cycles(u64),
}

impl From<&BenchmarkConfig> for RunBudget {
    fn from(config: &BenchmarkConfig) -> Self {
        RunBudget::Duration(config.duration)
    }
}

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Finished,
    Failed,
}

/// Outcome of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkResult {
    /// Completed cycles
    pub count: u64,
    /// Reporting window: the configured duration for timed runs, the
    /// measured time for counted runs
    pub window: Duration,
    /// Measured wall time of the run
    pub elapsed: Duration,
}

impl BenchmarkResult {
    /// Cycles per second over the reporting window
    pub fn rate(&self) -> f64 {
        if self.count == 0 || self.window.is_zero() {
            return 0.0;
        }
        self.count as f64 / self.window.as_secs_f64()
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} TLS connections in {} secs", self.count, self.window.as_secs())?;
        write!(f, "{:.2} connections/sec", self.rate())
    }
}

/// Sequential cycle runner
#[derive(Debug)]
pub struct BenchmarkLoop<C: Clock = SystemClock> {
    budget: RunBudget,
    clock: C,
    state: LoopState,
    count: u64,
}

impl BenchmarkLoop<SystemClock> {
    pub fn new(budget: RunBudget) -> Self {
        Self::with_clock(budget, SystemClock)
    }
}

impl<C: Clock> BenchmarkLoop<C> {
    pub fn with_clock(budget: RunBudget, clock: C) -> Self {
        BenchmarkLoop { budget, clock, state: LoopState::Idle, count: 0 }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Cycles completed so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Run cycles until the budget is spent or one fails
    ///
    /// `cycle` receives the index of the cycle about to run. A loop runs only
    /// once; calling `run` again is an error.
    pub fn run<F>(&mut self, mut cycle: F) -> Result<BenchmarkResult>
    where
        F: FnMut(u64) -> Result<()>,
    {
        if self.state != LoopState::Idle {
            return Err(Error::Config(format!("benchmark loop already {:?}", self.state)));
        }

        self.state = LoopState::Running;
        let start = self.clock.now();
        let deadline = match self.budget {
            RunBudget::Duration(d) => Some(start + d),
            RunBudget::Cycles(_) => None,
        };

        loop {
            let done = match (self.budget, deadline) {
                (_, Some(deadline)) => self.clock.now() >= deadline,
                (RunBudget::Cycles(n), None) => self.count >= n,
                (RunBudget::Duration(_), None) => true,
            };
            if done {
                break;
            }

            if let Err(e) = cycle(self.count) {
                self.state = LoopState::Failed;
                tracing::error!(stage = e.stage(), completed = self.count, error = %e, "TLS connection failed");
                return Err(e);
            }
            self.count += 1;
        }

        self.state = LoopState::Finished;
        let elapsed = self.clock.now().saturating_duration_since(start);
        let window = match self.budget {
            RunBudget::Duration(d) => d,
            RunBudget::Cycles(_) => elapsed,
        };

        let result = BenchmarkResult { count: self.count, window, elapsed };
        tracing::info!(count = result.count, elapsed_ms = elapsed.as_millis() as u64, rate = result.rate(), "run finished");
        Ok(result)
    }
}
