//! Basic usage example: guard a flaky dependency, watch the circuit trip, fail
//! fast, and recover once the dependency comes back.
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see the breaker's own
//! log output.

use rolling_circuit_breaker::{BoxError, BreakerConfig, BreakerError, CircuitBreaker, Invocation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // ── Direct command ───────────────────────────────────────────────────────
    // The command returns a Result; Err counts as a failure.

    let healthy = Arc::new(AtomicBool::new(false));
    let dependency = healthy.clone();

    let config = BreakerConfig::builder()
        .name("inventory")
        .timeout(Duration::from_millis(500))
        .max_failures(3)
        .reset_timeout(Duration::from_secs(1))
        .rolling_window(Duration::from_secs(5))
        .build()?;

    let breaker = CircuitBreaker::new(
        config,
        move |sku: &'static str| {
            let up = dependency.load(Ordering::SeqCst);
            async move {
                if up {
                    Ok(format!("{sku}: 12 in stock"))
                } else {
                    Err(BoxError::from("connection refused"))
                }
            }
        },
        |err: BreakerError, sku: &'static str| {
            println!("  fallback for {sku}: {err}");
        },
    )?;

    println!("Dependency down, calling four times:");
    for _ in 0..4 {
        breaker.run("sku-1", "sku-1").await;
        println!("  state={}", breaker.state());
    }

    println!("\nWaiting for the reset timeout...");
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    println!("  state={}", breaker.state());

    healthy.store(true, Ordering::SeqCst);
    breaker.run("sku-1", "sku-1").await;
    println!("  trial call succeeded, state={}", breaker.state());

    let snapshot = breaker.snapshot();
    println!("\nStats: {}", serde_json::to_string_pretty(&snapshot)?);

    // ── Context command with a bulkhead ──────────────────────────────────────
    // The command reports its own outcome, possibly from another task. At most
    // two calls run at once; the rest wait their turn.

    let config = BreakerConfig::builder()
        .name("thumbnailer")
        .timeout(Duration::from_millis(300))
        .bulkhead_limit(2)
        .build()?;

    let thumbnailer = CircuitBreaker::with_context(
        config,
        |invocation: Invocation<u64>| async move {
            let work = Duration::from_millis(*invocation.args());
            tokio::spawn(async move {
                tokio::time::sleep(work).await;
                invocation.notify_success();
            });
        },
        |err: BreakerError, id: u32| {
            println!("  thumbnail {id} gave up: {err}");
        },
    )?;

    println!("\nQueueing five thumbnails behind a bulkhead of two:");
    for (id, work_ms) in [(1, 50), (2, 50), (3, 50), (4, 400), (5, 50)] {
        thumbnailer.run(work_ms, id).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stats = thumbnailer.snapshot();
    println!(
        "  succeeded={} failed={} timeouts={}",
        stats.successful_responses, stats.failed_responses, stats.timeouts
    );

    Ok(())
}
