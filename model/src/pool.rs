use log::*;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::outcome::Outcome;

/// Worker count used when the caller does not override it.
pub const DEFAULT_WORKERS: usize = 4;

/// One host directory awaiting a deployment session.
pub type Job = PathBuf;

/**
 * The seam between the pool and the deploy session. Production hands the
 * pool a DeployRunner; tests hand it instrumented runners.
 */
pub trait JobRunner: Send + Sync {
    fn run(&self, job: Job) -> Outcome;
}

/**
 * Run every job through a fixed pool of worker threads and collect exactly
 * one outcome per submitted job.
 *
 * Jobs are fed in order through a bounded queue whose capacity equals the
 * worker count, so submission backs off naturally once every worker is
 * busy. Workers hand outcomes back over a rendezvous channel and terminate
 * once the queue is closed and drained. Completion order across hosts is
 * unconstrained.
 */
pub fn run(jobs: Vec<Job>, workers: usize, runner: Arc<dyn JobRunner>) -> Vec<Outcome> {
    let workers = workers.max(1);
    let total = jobs.len();

    let (job_tx, job_rx) = mpsc::sync_channel::<Job>(workers);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (outcome_tx, outcome_rx) = mpsc::sync_channel::<Outcome>(0);

    let mut handles = Vec::with_capacity(workers + 1);
    for worker in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let outcome_tx = outcome_tx.clone();
        let runner = Arc::clone(&runner);
        handles.push(thread::spawn(move || loop {
            // hold the queue lock only while receiving, never while deploying
            let job = match job_rx.lock() {
                Ok(rx) => rx.recv(),
                Err(_) => break,
            };
            match job {
                Ok(job) => {
                    debug!("worker {} picked up {}", worker, job.display());
                    let outcome = runner.run(job);
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
                // queue closed and drained
                Err(_) => break,
            }
        }));
    }
    drop(outcome_tx);

    // feed from its own thread so collection can start while the bounded
    // queue exerts backpressure on submission
    handles.push(thread::spawn(move || {
        for job in jobs {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        // dropping job_tx closes the queue
    }));

    let mut outcomes = Vec::with_capacity(total);
    for _ in 0..total {
        match outcome_rx.recv() {
            Ok(outcome) => outcomes.push(outcome),
            Err(_) => {
                // only reachable if a worker panicked mid-job
                error!("worker pool shut down early, {} outcome(s) missing", total - outcomes.len());
                break;
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SessionReport;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingRunner {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingRunner {
        fn new() -> Self {
            Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl JobRunner for CountingRunner {
        fn run(&self, job: Job) -> Outcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Outcome {
                host_dir: job,
                host: None,
                result: Ok(SessionReport::default()),
            }
        }
    }

    fn jobs(count: usize) -> Vec<Job> {
        (0..count).map(|i| PathBuf::from(format!("/deploys/host{:02}", i))).collect()
    }

    #[test]
    fn one_outcome_per_job() {
        let runner = Arc::new(CountingRunner::new());
        let outcomes = run(jobs(8), 3, runner);
        assert_eq!(outcomes.len(), 8);

        let dirs: HashSet<_> = outcomes.iter().map(|o| o.host_dir.clone()).collect();
        assert_eq!(dirs.len(), 8, "no outcome lost or duplicated");
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let runner = Arc::new(CountingRunner::new());
        let outcomes = run(jobs(12), 3, Arc::clone(&runner) as Arc<dyn JobRunner>);
        assert_eq!(outcomes.len(), 12);
        assert!(runner.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn more_jobs_than_twice_the_pool_still_drains() {
        // exercises backpressure past queue capacity plus in-flight jobs
        let runner = Arc::new(CountingRunner::new());
        let outcomes = run(jobs(20), 2, runner);
        assert_eq!(outcomes.len(), 20);
    }

    #[test]
    fn zero_jobs_returns_immediately() {
        let runner = Arc::new(CountingRunner::new());
        let outcomes = run(vec![], 4, runner);
        assert!(outcomes.is_empty());
    }

    struct FlakyRunner;

    impl JobRunner for FlakyRunner {
        fn run(&self, job: Job) -> Outcome {
            let fails = job.to_string_lossy().ends_with("7");
            Outcome {
                host_dir: job.clone(),
                host: None,
                result: if fails {
                    Err(crate::error::SessionError::Transport(
                        crate::error::TransportError::Auth {
                            user: "admin".to_string(),
                            host: "unreachable".to_string(),
                        },
                    ))
                } else {
                    Ok(SessionReport::default())
                },
            }
        }
    }

    #[test]
    fn failed_jobs_still_produce_their_outcome() {
        let outcomes = run(jobs(10), 3, Arc::new(FlakyRunner));
        assert_eq!(outcomes.len(), 10);
        assert_eq!(outcomes.iter().filter(|o| !o.success()).count(), 1);
    }
}
