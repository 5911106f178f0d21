//! acctlock - concurrent account transfer runner
//!
//! Loads a config, seeds the accounts it lists, runs the configured transfer
//! workload from many threads and checks the books still balance.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│ Accounts │───▶│  N threads   │───▶│  Verify  │
//! │  (YAML)  │    │  (seed)  │    │ (transfers)  │    │ (totals) │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, bail};

use acctlock::config::AppConfig;
use acctlock::service::AccountsService;
use acctlock::simulation;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Explicit config file (--config argument), overrides --env
fn get_config_path() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = match get_config_path() {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::load(&env)?,
    };
    let _log_guard = acctlock::logging::init_logging(&app_config);

    tracing::info!("Starting acctlock in {} mode", env);

    let service = AccountsService::from_config(&app_config).context("Failed to seed accounts")?;

    println!("=== acctlock: concurrent transfers ===");
    println!("Accounts:             {}", service.repository().len());
    println!("Threads:              {}", app_config.simulation.threads);
    println!("Transfers per thread: {}", app_config.simulation.transfers_per_thread);
    match app_config.transfer.lock_timeout_ms {
        Some(ms) => println!("Lock timeout:         {}ms", ms),
        None => println!("Lock timeout:         none"),
    }

    // Queued notifications are delivered by a drainer running next to the workload
    let stop = AtomicBool::new(false);
    let (report, delivered) = thread::scope(|s| {
        let drainer = service.outbox().map(|outbox| {
            let stop = &stop;
            s.spawn(move || outbox.pump(stop))
        });
        let report = simulation::run(&service, &app_config.simulation);
        stop.store(true, Ordering::SeqCst);
        let delivered = drainer.map(|handle| handle.join());
        (report, delivered)
    });
    let report = report?;
    let delivered = match delivered {
        Some(Ok(count)) => Some(count),
        Some(Err(_)) => bail!("notification drainer panicked"),
        None => None,
    };

    println!("\n=== Results ===");
    println!("Attempted:   {}", report.attempted);
    println!("Completed:   {}", report.completed);
    for (code, count) in &report.rejected {
        println!("Rejected:    {:<20} {}", code, count);
    }
    if let Some(count) = delivered {
        println!("Notified:    {}", count);
    }
    println!("Total before: {}", report.total_before);
    println!("Total after:  {}", report.total_after);
    println!(
        "Elapsed:     {:.2?} ({:.0} transfers/s)",
        report.elapsed,
        report.throughput()
    );

    println!("\n=== Balances ===");
    for snapshot in service.snapshot() {
        println!("{:<20} {}", snapshot.account_id, snapshot.balance);
    }

    if !report.conserved() {
        bail!(
            "money not conserved: {} before, {} after",
            report.total_before,
            report.total_after
        );
    }
    if !report.negative_accounts.is_empty() {
        bail!("negative balances in {:?}", report.negative_accounts);
    }

    println!("\n✅ All balances conserved and non-negative");
    Ok(())
}
