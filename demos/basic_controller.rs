//! Basic controller usage example
//!
//! Demonstrates registering workers with different timeout policies, a job
//! that gets killed for running too long, and shutdown with a snapshot.
//!
//! Run with: cargo run --example basic_controller

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use supervised_thread_pool::prelude::*;

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("=== Supervised Thread Pool - Basic Controller Example ===\n");

    let config = ControllerConfig::new("demo")
        .with_thread_name_prefix("demo-worker")
        .with_stop_grace_period(Duration::from_secs(2));
    let controller = WorkerThreadController::with_config(config)?;

    let completed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    println!("1. Registering workers:");
    for (policy, priority) in [
        (TimeoutPolicy::explicit_secs(1)?, ThreadPriority::Normal),
        (TimeoutPolicy::explicit_secs(1)?, ThreadPriority::High),
        (TimeoutPolicy::Smart, ThreadPriority::Highest),
    ] {
        let (ok, err) = (Arc::clone(&completed), Arc::clone(&failed));
        let worker = controller.add_worker_thread(
            WorkerOptions::new(|job: &Arc<Job<u64>>| {
                let millis = *job.payload();
                // The sleep stands in for work; a hung job polls its token
                let token = job.cancellation_token();
                let mut waited = 0;
                while waited < millis {
                    if let Some(token) = &token {
                        token.check(job.id())?;
                    }
                    thread::sleep(Duration::from_millis(10));
                    waited += 10;
                }
                Ok(())
            })
            .on_success(move |_job| {
                ok.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(move |job| {
                err.fetch_add(1, Ordering::SeqCst);
                println!(
                    "   Job {} failed: {}",
                    job.id(),
                    job.failure_message().unwrap_or_default()
                );
            })
            .timeout(policy)
            .priority(priority),
        )?;
        println!(
            "   Worker {} ({}): timeout {}, priority {}",
            worker.id(),
            worker.name(),
            policy,
            priority
        );
    }

    println!("\n2. Submitting jobs:");
    for i in 0..12 {
        controller.submit(20 + i * 5);
    }
    // Long enough to exceed an explicit one-second budget
    let slow = controller.submit(3_000);
    println!("   Submitted 13 jobs, job {} runs for 3s", slow.id());

    controller.start()?;
    while !slow.is_terminal() {
        thread::sleep(Duration::from_millis(50));
    }

    println!("\n3. Slow job ended as {}", slow.state());
    controller.set_wait_for_jobs(false);
    while controller.is_running() {
        thread::sleep(Duration::from_millis(50));
    }
    controller.stop()?;

    println!("\n4. Results:");
    println!("   Completed: {}", completed.load(Ordering::SeqCst));
    println!("   Failed: {}", failed.load(Ordering::SeqCst));
    println!("   Timeout kills: {}", controller.timeouts());
    for worker in controller.workers() {
        println!(
            "   Worker {}: {} - {} jobs, {} failed",
            worker.id(),
            worker.state(),
            worker.jobs_run(),
            worker.jobs_failed()
        );
    }

    println!("\n5. Snapshot:");
    let snapshot = serde_json::to_string_pretty(&controller.snapshot())
        .map_err(|e| ThreadError::other(e.to_string()))?;
    println!("{}", snapshot);

    println!("\n=== Example completed successfully ===");
    Ok(())
}
