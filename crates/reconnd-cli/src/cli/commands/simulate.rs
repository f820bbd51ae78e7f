//! `reconnd simulate` – drive the coordinator with simulated peers.
//!
//! Each peer's connect attempt blocks for `connect_ms` on a pool worker and
//! fails `failures` times before succeeding. Failures come back to this loop
//! as events and are re-reported with the next consecutive failure count.

use anyhow::{bail, Result};
use reconnd_core::config::ReconnConfig;
use reconnd_core::ReconnectionCoordinator;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub peers: usize,
    pub failures: u32,
    pub connect_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSummary {
    pub connected: usize,
    pub attempts: u32,
    pub elapsed_secs: f64,
}

struct SimPeer {
    name: String,
    failures_left: AtomicU32,
    attempts: AtomicU32,
    connect_time: Duration,
}

impl SimPeer {
    fn connect(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(self.connect_time);
        let left = self.failures_left.load(Ordering::Relaxed);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::Relaxed);
            bail!("connection refused by {}", self.name);
        }
        Ok(())
    }
}

enum Event {
    Connected(Arc<SimPeer>),
    Failed {
        peer: Arc<SimPeer>,
        failure_count: u32,
        reason: String,
    },
}

/// One connect attempt. `failure_count` is the number of consecutive failures
/// this attempt would make if it fails too, zero-based.
fn connect_attempt(
    peer: Arc<SimPeer>,
    failure_count: u32,
    events: UnboundedSender<Event>,
) -> impl FnOnce() + Send + 'static {
    move || {
        let event = match peer.connect() {
            Ok(()) => Event::Connected(peer),
            Err(e) => {
                tracing::warn!(peer = %peer.name, failure_count, "connect attempt failed: {:#}", e);
                Event::Failed {
                    peer,
                    failure_count,
                    reason: e.to_string(),
                }
            }
        };
        // Receiver gone means the run is over; nothing left to report to.
        let _ = events.send(event);
    }
}

pub async fn run_simulate(cfg: &ReconnConfig, opts: &SimulateOptions) -> Result<SimulationSummary> {
    let coord = ReconnectionCoordinator::from_config(cfg)?;
    let (tx, mut rx) = unbounded_channel::<Event>();
    let started = Instant::now();

    let peers: Vec<Arc<SimPeer>> = (0..opts.peers)
        .map(|i| {
            Arc::new(SimPeer {
                name: format!("peer-{}", i),
                failures_left: AtomicU32::new(opts.failures),
                attempts: AtomicU32::new(0),
                connect_time: Duration::from_millis(opts.connect_ms),
            })
        })
        .collect();

    for peer in &peers {
        coord.execute_reconnect(connect_attempt(Arc::clone(peer), 0, tx.clone()));
    }

    let mut connected = 0usize;
    while connected < peers.len() {
        let Some(event) = rx.recv().await else {
            break;
        };
        let at = started.elapsed().as_secs_f64();
        match event {
            Event::Connected(peer) => {
                connected += 1;
                println!(
                    "{:>7.1}s  {} connected after {} attempt(s)",
                    at,
                    peer.name,
                    peer.attempts.load(Ordering::Relaxed)
                );
            }
            Event::Failed {
                peer,
                failure_count,
                reason,
            } => {
                let delay = coord.policy().period_for(failure_count);
                println!(
                    "{:>7.1}s  {} failed ({}); retrying in {}s",
                    at,
                    peer.name,
                    reason,
                    delay.as_secs()
                );
                let retry = connect_attempt(Arc::clone(&peer), failure_count + 1, tx.clone());
                coord.on_failure(&peer.name, failure_count, retry);
            }
        }
    }

    // Joins the timer thread and waits for workers; keep it off the async workers.
    let drained = tokio::task::block_in_place(|| {
        coord.shutdown();
        coord.pool().await_termination(Duration::from_secs(5))
    });
    if !drained {
        tracing::warn!("reconnection workers still busy after shutdown");
    }

    let attempts = peers
        .iter()
        .map(|p| p.attempts.load(Ordering::Relaxed))
        .sum();
    Ok(SimulationSummary {
        connected,
        attempts,
        elapsed_secs: started.elapsed().as_secs_f64(),
    })
}
