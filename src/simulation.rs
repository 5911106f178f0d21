//! Concurrent transfer workload
//!
//! Hammers a service with random transfers from many OS threads and checks
//! that money was neither created nor destroyed.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::account::AccountId;
use crate::config::SimulationConfig;
use crate::service::AccountsService;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub attempted: usize,
    pub completed: usize,
    /// Rejections keyed by error code
    pub rejected: BTreeMap<String, usize>,
    pub total_before: Decimal,
    pub total_after: Decimal,
    /// Ids of accounts found below zero afterwards
    pub negative_accounts: Vec<AccountId>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn conserved(&self) -> bool {
        self.total_before == self.total_after
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    /// Transfers per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempted as f64 / secs
        } else {
            0.0
        }
    }

    fn merge(&mut self, other: ThreadTally) {
        self.attempted += other.attempted;
        self.completed += other.completed;
        for (code, count) in other.rejected {
            *self.rejected.entry(code).or_default() += count;
        }
    }
}

#[derive(Default)]
struct ThreadTally {
    attempted: usize,
    completed: usize,
    rejected: BTreeMap<String, usize>,
}

/// Run the workload against every account in the service
///
/// # Errors
/// Fewer than two accounts, a zero `max_amount`, or a worker thread that
/// panicked.
pub fn run(service: &AccountsService, config: &SimulationConfig) -> anyhow::Result<SimulationReport> {
    let ids = service.repository().ids();
    ensure!(ids.len() >= 2, "simulation needs at least two accounts, found {}", ids.len());
    // Amounts are drawn in cents
    let max_cents = config
        .max_amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| i64::try_from(cents.trunc()).ok())
        .unwrap_or(i64::MAX);
    ensure!(max_cents > 0, "simulation max_amount must be at least 0.01");

    let total_before = service.total_balance()?;
    info!(
        threads = config.threads,
        transfers_per_thread = config.transfers_per_thread,
        accounts = ids.len(),
        total = %total_before,
        "Simulation started"
    );

    let started = Instant::now();
    let tallies = thread::scope(|s| {
        let workers: Vec<_> = (0..config.threads)
            .map(|worker| {
                let ids = &ids;
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(worker as u64));
                    worker_loop(service, ids, config.transfers_per_thread, max_cents, &mut rng)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join()).collect::<Vec<_>>()
    });
    let elapsed = started.elapsed();

    let mut report = SimulationReport {
        elapsed,
        ..Default::default()
    };
    for tally in tallies {
        match tally {
            Ok(tally) => report.merge(tally),
            Err(_) => bail!("simulation worker panicked"),
        }
    }

    report.total_after = service.total_balance()?;
    report.negative_accounts = service
        .snapshot()
        .into_iter()
        .filter(|s| s.balance < Decimal::ZERO)
        .map(|s| s.account_id)
        .collect();
    report.total_before = total_before;

    info!(
        attempted = report.attempted,
        completed = report.completed,
        rejected = report.rejected_total(),
        conserved = report.conserved(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Simulation finished"
    );
    Ok(report)
}

fn worker_loop(
    service: &AccountsService,
    ids: &[AccountId],
    transfers: usize,
    max_cents: i64,
    rng: &mut StdRng,
) -> ThreadTally {
    let mut tally = ThreadTally::default();
    for _ in 0..transfers {
        let from = &ids[rng.gen_range(0..ids.len())];
        let to = &ids[rng.gen_range(0..ids.len())];
        let amount = Decimal::new(rng.gen_range(1..=max_cents), 2);

        tally.attempted += 1;
        match service.transfer(from.as_str(), to.as_str(), amount) {
            Ok(_) => tally.completed += 1,
            Err(e) => *tally.rejected.entry(e.code().to_string()).or_default() += 1,
        }
    }
    tally
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
