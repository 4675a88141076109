//! The circuit breaker orchestrator.

use crate::{
    bulkhead::Bulkhead,
    command::{Command, ContextCommand, Fallback},
    config::BreakerConfig,
    error::{BreakerError, ConfigError},
    history::FailureHistory,
    invocation::{CallGuard, Invocation},
    state::{Circuit, State},
    stats::{Stats, StatsSnapshot},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Fallback arguments for one call. Taken by whichever side resolves the call
/// as a failure.
type FallbackSlot<C> = Arc<Mutex<Option<C>>>;

/// State shared by a breaker, its timers and every [`Invocation`] it issues.
///
/// All transitions happen under `circuit`. The failure history has its own
/// lock and is only touched while `circuit` is held, so two concurrent failures
/// always observe each other's history update.
pub(crate) struct Core {
    config: BreakerConfig,
    circuit: Mutex<Circuit>,
    failures: FailureHistory,
    stats: Stats,
    runtime: Handle,
}

impl Core {
    fn state(&self) -> State {
        self.circuit.lock().state
    }

    /// Resolve one call: record its latency, then its outcome.
    pub(crate) fn record_outcome(self: &Arc<Self>, call: &CallGuard, success: bool) {
        self.stats.track_latency(call.elapsed());
        if success {
            self.handle_success();
        } else {
            self.handle_failure();
        }
    }

    fn handle_failure(self: &Arc<Self>) {
        let mut circuit = self.circuit.lock();
        trace!(breaker = %self.config.name, state = %circuit.state, "Handling failure");
        self.failures.add(Instant::now());

        match circuit.state {
            State::HalfOpen => {
                warn!(
                    breaker = %self.config.name,
                    "Probe failed in half-open state; re-opening circuit"
                );
                self.open(&mut circuit);
            }
            // While open, a late failure that still meets the threshold
            // re-opens and restarts the cooldown.
            State::Closed | State::Open => {
                let failures = self.failures.count();
                let window = self.failures.current_window();
                if failures >= self.config.max_failures
                    && window.is_some_and(|w| w <= self.config.rolling_window)
                {
                    warn!(
                        breaker = %self.config.name,
                        state = %circuit.state,
                        failures,
                        window_ms = window.map_or(0, |w| w.as_millis() as u64),
                        "Circuit breaker TRIPPED: failure threshold reached within rolling window"
                    );
                    self.open(&mut circuit);
                }
            }
        }
        drop(circuit);

        self.stats.track_failed_response();
    }

    fn handle_success(&self) {
        let mut circuit = self.circuit.lock();
        trace!(breaker = %self.config.name, state = %circuit.state, "Handling success");
        if circuit.state == State::HalfOpen {
            self.close(&mut circuit);
            info!(breaker = %self.config.name, "Circuit breaker RECOVERED: probe succeeded");
        }
        drop(circuit);

        self.stats.track_successful_response();
    }

    /// Enter `open` and (re)schedule the reset timer. Caller holds the lock.
    fn open(self: &Arc<Self>, circuit: &mut Circuit) {
        circuit.state = State::Open;
        let epoch = circuit.cancel_reset_timer();

        let core = Arc::downgrade(self);
        let delay = self.config.reset_timeout;
        circuit.reset_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = core.upgrade() {
                core.fire_reset(epoch);
            }
        }));
    }

    /// Enter `closed`, forgetting all failures. Caller holds the lock.
    fn close(&self, circuit: &mut Circuit) {
        self.failures.clear();
        circuit.state = State::Closed;
        circuit.cancel_reset_timer();
    }

    fn fire_reset(&self, epoch: u64) {
        let mut circuit = self.circuit.lock();
        if circuit.reset_epoch != epoch {
            return;
        }
        circuit.reset_timer = None;
        circuit.state = State::HalfOpen;
        debug!(breaker = %self.config.name, "Reset timeout elapsed; circuit half-open");
    }

    fn force_half_open(&self) {
        self.circuit.lock().state = State::HalfOpen;
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Some(timer) = self.circuit.get_mut().reset_timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("config", &self.config)
            .field("state", &self.circuit.try_lock().map(|c| c.state))
            .field("failures", &self.failures.count())
            .finish()
    }
}

enum Guarded<A, B> {
    Direct(Arc<dyn Command<A, B>>),
    Context(Arc<dyn ContextCommand<A, B>>),
}

impl<A, B> Clone for Guarded<A, B> {
    fn clone(&self) -> Self {
        match self {
            Guarded::Direct(command) => Guarded::Direct(command.clone()),
            Guarded::Context(command) => Guarded::Context(command.clone()),
        }
    }
}

/// Circuit breaker guarding one operation.
///
/// * `A` – arguments of the guarded command.
/// * `B` – result of the guarded command.
/// * `C` – arguments of the fallback.
///
/// Clone it freely: all clones share the same state, history, stats and
/// bulkhead.
pub struct CircuitBreaker<A, B, C> {
    core: Arc<Core>,
    command: Guarded<A, B>,
    fallback: Arc<dyn Fallback<C>>,
    bulkhead: Option<Arc<Bulkhead>>,
}

impl<A, B, C> Clone for CircuitBreaker<A, B, C> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            command: self.command.clone(),
            fallback: self.fallback.clone(),
            bulkhead: self.bulkhead.clone(),
        }
    }
}

impl<A, B, C> std::fmt::Debug for CircuitBreaker<A, B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let style = match self.command {
            Guarded::Direct(_) => "direct",
            Guarded::Context(_) => "context",
        };
        f.debug_struct("CircuitBreaker")
            .field("core", &self.core)
            .field("command", &style)
            .field("bulkhead", &self.bulkhead)
            .finish()
    }
}

impl<A, B, C> CircuitBreaker<A, B, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    /// Guard a command that reports its outcome by returning.
    ///
    /// Must be called inside a Tokio runtime; the breaker schedules its timers
    /// and bulkhead worker on it.
    pub fn new(
        config: BreakerConfig,
        command: impl Command<A, B>,
        fallback: impl Fallback<C>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Guarded::Direct(Arc::new(command)), Arc::new(fallback))
    }

    /// Guard a command that reports its outcome through an [`Invocation`].
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_context(
        config: BreakerConfig,
        command: impl ContextCommand<A, B>,
        fallback: impl Fallback<C>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Guarded::Context(Arc::new(command)), Arc::new(fallback))
    }

    fn build(
        config: BreakerConfig,
        command: Guarded<A, B>,
        fallback: Arc<dyn Fallback<C>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let bulkhead = (config.bulkhead_limit > 0)
            .then(|| Arc::new(Bulkhead::new(config.bulkhead_limit, &runtime)));

        debug!(
            breaker = %config.name,
            max_failures = config.max_failures,
            bulkhead_limit = config.bulkhead_limit,
            "Circuit breaker created"
        );

        let core = Arc::new(Core {
            failures: FailureHistory::new(config.max_failures),
            circuit: Mutex::new(Circuit::default()),
            stats: Stats::default(),
            runtime,
            config,
        });

        Ok(Self {
            core,
            command,
            fallback,
            bulkhead,
        })
    }

    /// Run one guarded call.
    ///
    /// When the circuit is open the fallback runs with
    /// [`BreakerError::FastFail`] and the command is skipped. Otherwise the
    /// command runs against a timeout watchdog; if it fails or the watchdog
    /// fires first, the fallback runs with [`BreakerError::Timeout`].
    ///
    /// Without a bulkhead the command is awaited on the caller's task. With one,
    /// the call is queued and this returns straight away. The watchdog starts
    /// at submission either way, so time spent queued counts toward the timeout.
    pub async fn run(&self, command_args: A, fallback_args: C) {
        self.core.stats.track_request();

        if self.core.state() == State::Open {
            self.fast_fail(fallback_args);
            return;
        }

        let call = CallGuard::new();
        let slot: FallbackSlot<C> = Arc::new(Mutex::new(Some(fallback_args)));
        self.start_watchdog(&call, slot.clone());

        let execution = execute(
            self.core.clone(),
            self.command.clone(),
            self.fallback.clone(),
            call,
            command_args,
            slot,
        );

        match &self.bulkhead {
            Some(bulkhead) => bulkhead.enqueue(execution),
            None => execution.await,
        }
    }

    fn fast_fail(&self, fallback_args: C) {
        debug!(breaker = %self.core.config.name, "Circuit open; failing fast");
        self.core.stats.track_rejected();
        self.fallback.call(BreakerError::FastFail, fallback_args);
    }

    fn start_watchdog(&self, call: &Arc<CallGuard>, slot: FallbackSlot<C>) {
        let core = self.core.clone();
        let fallback = self.fallback.clone();
        let guard = call.clone();
        let timeout = core.config.timeout;

        let watchdog = self.core.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if !guard.try_complete() {
                return;
            }
            guard.set_timed_out();
            core.stats.track_timeouts();
            debug!(
                breaker = %core.config.name,
                timeout_ms = timeout.as_millis() as u64,
                "Guarded call timed out"
            );
            core.record_outcome(&guard, false);
            let args = slot.lock().take();
            if let Some(args) = args {
                fallback.call(BreakerError::Timeout, args);
            }
        });
        call.arm_watchdog(watchdog.abort_handle());
    }
}

impl<A, B, C> CircuitBreaker<A, B, C> {
    /// Report a success for a context-style call made outside an
    /// [`Invocation`].
    pub fn notify_success(&self) {
        self.core.handle_success();
    }

    /// Report a failure for a context-style call made outside an
    /// [`Invocation`].
    pub fn notify_failure(&self) {
        self.core.handle_failure();
    }

    /// Trip the circuit now and start the reset timer.
    pub fn force_open(&self) {
        let mut circuit = self.core.circuit.lock();
        self.core.open(&mut circuit);
        info!(breaker = %self.core.config.name, "Circuit forced open");
    }

    /// Close the circuit now, clearing the failure history and any pending
    /// reset timer.
    pub fn force_closed(&self) {
        let mut circuit = self.core.circuit.lock();
        self.core.close(&mut circuit);
        info!(breaker = %self.core.config.name, "Circuit forced closed");
    }

    /// Flip the state to half-open. No other side effects.
    pub fn force_half_open(&self) {
        self.core.force_half_open();
        info!(breaker = %self.core.config.name, "Circuit forced half-open");
    }

    /// Current circuit state.
    pub fn state(&self) -> State {
        self.core.state()
    }

    /// Failures currently retained in the history.
    pub fn number_of_failures(&self) -> usize {
        self.core.failures.count()
    }

    /// Name used in log output.
    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    /// Configuration the breaker was built with.
    pub fn config(&self) -> &BreakerConfig {
        &self.core.config
    }

    /// Live counters shared by all clones.
    pub fn stats(&self) -> &Stats {
        &self.core.stats
    }

    /// The concurrency limiter, if `bulkhead_limit` is non-zero.
    pub fn bulkhead(&self) -> Option<&Bulkhead> {
        self.bulkhead.as_deref()
    }

    /// Current stats, also written to the log at `debug` level.
    pub fn snapshot(&self) -> StatsSnapshot {
        let snap = self.core.stats.snapshot();
        debug!(
            breaker = %self.core.config.name,
            total_requests = snap.total_requests,
            concurrent_requests = snap.concurrent_requests,
            rejected_requests = snap.rejected_requests,
            successful_responses = snap.successful_responses,
            failed_responses = snap.failed_responses,
            timeouts = snap.timeouts,
            average_response_time_ms = snap.average_response_time.as_millis() as u64,
            total_latency_ms = snap.total_latency.as_millis() as u64,
            "Circuit breaker stats"
        );
        snap
    }

    /// Zero every counter and forget recorded latencies. State is untouched.
    pub fn reset_stats(&self) {
        self.core.stats.reset();
    }
}

/// Run the command for one admitted call and resolve it, unless the watchdog
/// already has.
async fn execute<A, B, C>(
    core: Arc<Core>,
    command: Guarded<A, B>,
    fallback: Arc<dyn Fallback<C>>,
    call: Arc<CallGuard>,
    args: A,
    slot: FallbackSlot<C>,
) where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    match command {
        Guarded::Direct(command) => {
            let result = command.call(args).await;
            if !call.try_complete() {
                trace!(breaker = %core.config.name, "Late completion after timeout ignored");
                return;
            }
            call.disarm_watchdog();

            match result {
                Ok(_) => core.record_outcome(&call, true),
                Err(e) => {
                    debug!(breaker = %core.config.name, error = %e, "Guarded command failed");
                    core.record_outcome(&call, false);
                    let args = slot.lock().take();
                    if let Some(args) = args {
                        fallback.call(BreakerError::Timeout, args);
                    }
                }
            }
        }
        Guarded::Context(command) => {
            let invocation = Invocation::new(args, call, Arc::downgrade(&core));
            command.call(invocation).await;
        }
    }
}
