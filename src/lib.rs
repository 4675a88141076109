//! # rolling-circuit-breaker
//!
//! A circuit breaker with a **bulkhead** and **rolling-window failure detection**,
//! for wrapping unreliable operations (typically remote calls) so that a failing
//! dependency degrades into fast, predictable fallbacks instead of cascading.
//!
//! ## The Problem
//!
//! A remote call that hangs or errors keeps costing the caller time and
//! resources on every attempt. Under load, callers pile up waiting on it and
//! the failure spreads upstream.
//!
//! ## The Solution
//!
//! Every guarded call goes through [`CircuitBreaker::run`]. The breaker decides
//! whether to execute the command at all and races it against a timeout. It
//! counts recent failures and stops calling the dependency once they cross a
//! threshold within a rolling window. After a cooldown it lets one trial call
//! through to see whether the dependency has recovered.
//!
//! Each call has exactly one of two outcomes:
//!
//! | Outcome | What happens |
//! |---|---|
//! | Command reports success in time | Success is recorded; the fallback is **not** called |
//! | Circuit open, command failed, or timeout | Failure is recorded (except fast-fail); the fallback gets a [`BreakerError`] |
//!
//! ## State Machine
//!
//! ```text
//!              N failures within window
//! ┌──────────┐ ─────────────────────────► ┌──────┐
//! │  Closed  │                            │ Open │◄─────────┐
//! │ (normal) │ ◄──────┐                   └──┬───┘          │
//! └──────────┘        │ success             │ reset_timeout │ failure
//!                     │                ┌────▼─────┐         │
//!                     └────────────────│ HalfOpen │─────────┘
//!                                      └──────────┘
//! ```
//!
//! * **Closed** – calls run the command. A failure trips the circuit once the
//!   history holds `max_failures` entries spanning at most `rolling_window`.
//! * **Open** – calls fail fast with [`BreakerError::FastFail`]. After
//!   `reset_timeout` a single-shot timer moves the circuit to half-open.
//! * **HalfOpen** – the next outcome decides: one success closes the circuit and
//!   clears the history, one failure re-opens it.
//!
//! The failure history holds at most `max_failures` timestamps and the window
//! is measured between the oldest and newest of them. Failures that trickle in
//! more slowly than the window never trip the circuit, but a long burst can
//! evict older timestamps before they are judged.
//!
//! ## Command Styles
//!
//! * **Direct** ([`CircuitBreaker::new`]) – an async closure returning
//!   `Result<B, E>`. `Ok` is a success, `Err` is a failure.
//! * **Context** ([`CircuitBreaker::with_context`]) – an async closure receiving
//!   an [`Invocation`]. The command calls
//!   [`notify_success`](Invocation::notify_success) or
//!   [`notify_failure`](Invocation::notify_failure) itself, which suits
//!   operations that complete through callbacks.
//!
//! The timeout watchdog never cancels the command. It only records the
//! failure and runs the fallback if the command has not reported in time; a
//! report that arrives later is ignored.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rolling_circuit_breaker::{BreakerConfig, BreakerError, CircuitBreaker};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BreakerConfig::builder()
//!         .name("image-store")
//!         .timeout(Duration::from_secs(2))
//!         .max_failures(3)
//!         .reset_timeout(Duration::from_secs(30))
//!         .bulkhead_limit(8)
//!         .build()?;
//!
//!     let breaker = CircuitBreaker::new(
//!         config,
//!         |id: u64| async move {
//!             // the remote call goes here
//!             Ok::<_, std::io::Error>(format!("image {id}"))
//!         },
//!         |err: BreakerError, id: u64| {
//!             eprintln!("image {id} unavailable: {err}");
//!         },
//!     )?;
//!
//!     breaker.run(42, 42).await;
//!     println!("{:?}", breaker.snapshot());
//!     Ok(())
//! }
//! ```
//!
//! ## Runtime
//!
//! Breakers run on Tokio. They must be created inside a runtime; the timeout
//! watchdogs, the reset timer and the bulkhead's admission worker are spawned
//! on it. Construction outside a runtime fails with [`ConfigError::NoRuntime`].

mod breaker;
pub mod bulkhead;
pub mod command;
pub mod config;
pub mod error;
pub mod history;
pub mod invocation;
pub mod state;
pub mod stats;

pub use breaker::CircuitBreaker;
pub use bulkhead::Bulkhead;
pub use command::{BoxError, Command, ContextCommand, Fallback};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use error::{BreakerError, ConfigError};
pub use invocation::Invocation;
pub use state::State;
pub use stats::{Stats, StatsSnapshot};
