use slot_pool::{program_fn, WorkerPool};
use tracing::info;
use tracing_subscriber::EnvFilter;
use std::time::Instant;


fn collatz_steps(mut n: u64) -> Result<u64, String> {
    if n == 0 {
        return Err("collatz is undefined for zero".into());
    }
    let mut steps = 0;
    while n != 1 {
        n = if n % 2 == 0 { n / 2 } else { 3 * n + 1 };
        steps += 1;
    }
    Ok(steps)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let now = Instant::now();
    let pool = WorkerPool::new(program_fn(collatz_steps), num_cpus::get())?;

    let handles: Vec<_> = (0..100_000u64).map(|n| pool.submit(n)).collect();

    let mut longest = (0, 0);
    let mut failed = 0;
    for (n, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(steps) if steps > longest.1 => longest = (n, steps),
            Ok(_) => {}
            Err(_) => failed += 1,
        }
    }

    let released = pool.check_task_queue().await?;
    let metrics = pool.metrics().await?;
    info!(
        longest_start = longest.0,
        longest_steps = longest.1,
        failed,
        released,
        success_rate = metrics.success_rate(),
        "collatz run finished"
    );

    pool.shutdown().await;
    info!("elapsed: {:?}", now.elapsed());
    Ok(())
}
