//! Stress command - concurrent sessions against one token

use crate::cli::args::StressArgs;
use crate::config::Config;
use crate::error::{TokenError, TokenResult};
use crate::session::{SessionFlags, SessionHandle, UserType};
use crate::token::Token;
use console::style;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Operation tallies for one worker
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    pub opened: usize,
    pub closed: usize,
    pub logins: usize,
    pub logouts: usize,
    pub rejected: usize,
}

impl WorkerStats {
    fn merge(&mut self, other: WorkerStats) {
        self.opened += other.opened;
        self.closed += other.closed;
        self.logins += other.logins;
        self.logouts += other.logouts;
        self.rejected += other.rejected;
    }
}

/// Execute the stress command
pub async fn execute(args: StressArgs, config: &Config) -> TokenResult<()> {
    let seed = args.seed.unwrap_or_else(|| fastrand::u64(..));
    // Handles are never reused, so opens past token.max_sessions are rejected.
    let token: Arc<Token> = Arc::new(Token::from_config(&config.token)?);

    info!(
        "Stressing token {} ({} handles) with {} workers x {} iterations (seed {})",
        config.token.label, config.token.max_sessions, args.threads, args.iterations, seed
    );

    let started = Instant::now();
    let mut workers = Vec::with_capacity(args.threads);
    for worker in 0..args.threads {
        let token = Arc::clone(&token);
        let iterations = args.iterations;
        let worker_seed = seed.wrapping_add(worker as u64);
        workers.push(tokio::task::spawn_blocking(move || {
            run_worker(&token, iterations, worker_seed)
        }));
    }

    let mut total = WorkerStats::default();
    for worker in workers {
        let stats = worker
            .await
            .map_err(|e| TokenError::Internal(format!("stress worker failed: {}", e)))??;
        total.merge(stats);
    }

    token.close_all_sessions();
    let counts = token.counts();
    if counts.all != 0 || token.login_state().is_logged_in() {
        return Err(TokenError::Internal(format!(
            "token not drained after close-all: {:?}, {:?}",
            counts,
            token.login_state()
        )));
    }

    println!(
        "{} {} workers, {} ops in {:.2?} (seed {})",
        style("✓").green(),
        args.threads,
        args.threads * args.iterations,
        started.elapsed(),
        seed
    );
    println!(
        "  opened {}  closed {}  logins {}  logouts {}  rejected {}",
        total.opened, total.closed, total.logins, total.logouts, total.rejected
    );

    Ok(())
}

/// Run `iterations` random operations against `token`, checking the
/// counter invariants after each one
pub fn run_worker(token: &Token, iterations: usize, seed: u64) -> TokenResult<WorkerStats> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut stats = WorkerStats::default();
    let mut mine: Vec<SessionHandle> = Vec::new();
    let capacity = token.sessions().capacity();

    for _ in 0..iterations {
        match rng.u8(0..10) {
            0..=3 => {
                let flags = if rng.bool() {
                    SessionFlags::read_write()
                } else {
                    SessionFlags::read_only()
                };
                match token.open_session(flags) {
                    Ok(handle) => {
                        mine.push(handle);
                        stats.opened += 1;
                    }
                    Err(_) => stats.rejected += 1,
                }
            }
            4..=6 if !mine.is_empty() => {
                let handle = mine.swap_remove(rng.usize(..mine.len()));
                token.close_session(handle)?;
                stats.closed += 1;
            }
            7 if !mine.is_empty() => {
                let handle = mine[rng.usize(..mine.len())];
                let user = if rng.bool() { UserType::User } else { UserType::So };
                match token.login(handle, user) {
                    Ok(()) => stats.logins += 1,
                    Err(_) => stats.rejected += 1,
                }
            }
            8 if !mine.is_empty() => {
                let handle = mine[rng.usize(..mine.len())];
                match token.logout(handle) {
                    Ok(()) => stats.logouts += 1,
                    Err(_) => stats.rejected += 1,
                }
            }
            _ => {
                if let Some(&handle) = mine.first() {
                    drop(token.session(handle)?);
                }
            }
        }

        let counts = token.counts();
        if counts.rw > counts.all || counts.all > capacity || counts.all < mine.len() {
            return Err(TokenError::Internal(format!(
                "session counters inconsistent: {:?}",
                counts
            )));
        }
    }

    for handle in mine.drain(..) {
        token.close_session(handle)?;
        stats.closed += 1;
    }

    debug!("Worker finished: {:?}", stats);
    Ok(stats)
}
