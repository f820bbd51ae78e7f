//! The delay queue owned by the timer thread.
//!
//! Retries are kept in a min-heap keyed by (deadline, arrival order). The loop
//! sleeps until the earliest deadline or the next command, whichever comes
//! first. Firing a retry only runs its hand-off closure, which must not block.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use super::handle::RetryHandle;
use crate::task::{panic_message, Task};

/// One scheduled-but-not-yet-fired retry. Owned by the timer loop until it
/// fires; the task then moves into the hand-off and the loop keeps nothing.
pub(crate) struct PendingRetry {
    /// Peer label for logs, when the caller supplied one.
    pub(crate) target: Option<String>,
    pub(crate) deadline: Instant,
    pub(crate) task: Task,
    pub(crate) handle: RetryHandle,
}

pub(crate) enum Command {
    Arm(PendingRetry),
    Shutdown,
}

struct Armed {
    deadline: Instant,
    seq: u64,
    retry: PendingRetry,
}

impl PartialEq for Armed {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Armed {}

impl PartialOrd for Armed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Armed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

/// Runs until `closed` is set, a `Shutdown` command arrives or every sender is
/// gone. Anything still armed at that point is discarded without running.
///
/// `closed` is the scheduler's shutdown flag. It is checked before every
/// hand-off, so a shutdown requested from inside a hand-off stops the rest of
/// the batch even though the `Shutdown` command is read only afterwards.
pub(crate) async fn run_timer_loop(
    mut rx: UnboundedReceiver<Command>,
    pending: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
) {
    let mut queue: BinaryHeap<Reverse<Armed>> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        if closed.load(Ordering::Acquire) {
            break;
        }
        let next_deadline = queue.peek().map(|Reverse(armed)| armed.deadline);
        tokio::select! {
            biased;
            cmd = rx.recv() => match cmd {
                Some(Command::Arm(retry)) => {
                    queue.push(Reverse(Armed {
                        deadline: retry.deadline,
                        seq,
                        retry,
                    }));
                    seq += 1;
                }
                Some(Command::Shutdown) | None => break,
            },
            () = wait_until(next_deadline) => fire_due(&mut queue, &pending, &closed),
        }
    }

    // Nothing armed, queued or in flight on the channel may fire after this.
    rx.close();
    let mut dropped = 0usize;
    while let Ok(cmd) = rx.try_recv() {
        if let Command::Arm(retry) = cmd {
            retry.handle.discard();
            dropped += 1;
        }
    }
    for Reverse(armed) in queue.drain() {
        armed.retry.handle.discard();
        dropped += 1;
    }
    pending.fetch_sub(dropped, Ordering::AcqRel);
    tracing::debug!(dropped, "timer loop stopped");
}

fn fire_due(queue: &mut BinaryHeap<Reverse<Armed>>, pending: &AtomicUsize, closed: &AtomicBool) {
    let now = Instant::now();
    while queue
        .peek()
        .is_some_and(|Reverse(armed)| armed.deadline <= now)
    {
        if closed.load(Ordering::Acquire) {
            // Left in the queue; the loop discards them on exit.
            return;
        }
        let Some(Reverse(armed)) = queue.pop() else {
            break;
        };
        pending.fetch_sub(1, Ordering::AcqRel);
        let PendingRetry {
            target,
            task,
            handle,
            ..
        } = armed.retry;
        let target = target.as_deref().unwrap_or("-");
        if !handle.try_fire() {
            tracing::debug!(peer = target, "skipping cancelled retry");
            continue;
        }
        tracing::trace!(peer = target, "retry due; handing off");
        // A panicking hand-off must not take the timer thread down with it.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            tracing::error!(
                peer = target,
                "hand-off panicked on the timer thread: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RetryState;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn arm(
        tx: &mpsc::UnboundedSender<Command>,
        pending: &AtomicUsize,
        deadline: Instant,
        task: impl FnOnce() + Send + 'static,
    ) -> RetryHandle {
        let handle = RetryHandle::new();
        pending.fetch_add(1, Ordering::AcqRel);
        let retry = PendingRetry {
            target: None,
            deadline,
            task: Box::new(task),
            handle: handle.clone(),
        };
        assert!(tx.send(Command::Arm(retry)).is_ok());
        handle
    }

    #[tokio::test(start_paused = true)]
    async fn fires_in_deadline_order_on_paused_clock() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let timer = tokio::spawn(run_timer_loop(rx, Arc::clone(&pending), Arc::new(AtomicBool::new(false))));

        let fired = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        for secs in [5u64, 1, 3, 3, 2] {
            let fired = Arc::clone(&fired);
            arm(&tx, &pending, start + Duration::from_secs(secs), move || {
                fired.lock().unwrap().push((secs, Instant::now()));
            });
        }

        tokio::time::sleep(Duration::from_secs(10)).await;

        let fired = fired.lock().unwrap().clone();
        let order: Vec<u64> = fired.iter().map(|(s, _)| *s).collect();
        assert_eq!(order, vec![1, 2, 3, 3, 5]);
        for (secs, at) in &fired {
            let elapsed = at.duration_since(start);
            assert!(elapsed >= Duration::from_secs(*secs));
            assert!(elapsed < Duration::from_secs(*secs) + Duration::from_millis(10));
        }
        let stamps: Vec<Instant> = fired.iter().map(|(_, at)| *at).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(pending.load(Ordering::Acquire), 0);

        tx.send(Command::Shutdown).ok();
        timer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_retry_is_skipped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let timer = tokio::spawn(run_timer_loop(rx, Arc::clone(&pending), Arc::new(AtomicBool::new(false))));

        let fired = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let f1 = Arc::clone(&fired);
        let first = arm(&tx, &pending, start + Duration::from_secs(1), move || {
            f1.lock().unwrap().push("first")
        });
        let f2 = Arc::clone(&fired);
        let second = arm(&tx, &pending, start + Duration::from_secs(2), move || {
            f2.lock().unwrap().push("second")
        });
        assert!(first.cancel());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["second"]);
        assert!(first.is_cancelled());
        assert_eq!(second.state(), RetryState::Fired);
        assert_eq!(pending.load(Ordering::Acquire), 0);

        drop(tx);
        timer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_armed_retries() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let timer = tokio::spawn(run_timer_loop(rx, Arc::clone(&pending), Arc::new(AtomicBool::new(false))));

        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let handle = arm(&tx, &pending, Instant::now() + Duration::from_secs(5), move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        tx.send(Command::Shutdown).ok();
        timer.await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
        assert_eq!(pending.load(Ordering::Acquire), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_hand_off_does_not_stop_the_loop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let timer = tokio::spawn(run_timer_loop(rx, Arc::clone(&pending), Arc::new(AtomicBool::new(false))));

        let ran = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        arm(&tx, &pending, start + Duration::from_secs(1), || panic!("bad hand-off"));
        let r = Arc::clone(&ran);
        arm(&tx, &pending, start + Duration::from_secs(2), move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        tx.send(Command::Shutdown).ok();
        timer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closing_inside_a_hand_off_stops_the_batch() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let timer = tokio::spawn(run_timer_loop(rx, Arc::clone(&pending), Arc::clone(&closed)));

        let ran = Arc::new(AtomicUsize::new(0));
        let deadline = Instant::now() + Duration::from_secs(1);
        let c = Arc::clone(&closed);
        arm(&tx, &pending, deadline, move || c.store(true, Ordering::Release));
        let mut later = Vec::new();
        for _ in 0..3 {
            let r = Arc::clone(&ran);
            later.push(arm(&tx, &pending, deadline, move || {
                r.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // The loop exits on the flag alone, without a Shutdown command.
        timer.await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(later.iter().all(RetryHandle::is_cancelled));
        assert_eq!(pending.load(Ordering::Acquire), 0);
        drop(tx);
    }
}
