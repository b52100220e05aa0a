//! Tile task queue and per-stage worker pool.
//!
//! Tasks live in an arena addressed by index. Pending indices are pushed
//! into a crossbeam channel; receiving an index is the claim, so every task
//! is handed to exactly one worker. Each task then moves through
//! `Pending → Claimed → Finished | Failed` with atomic transitions.
//!
//! A stage spawns a fixed number of scoped threads, drains the queue and
//! joins all of them before returning. The same queue is reset and reused
//! for the project, compute and back-project passes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::{Receiver, Sender};
use sal360_common::Sal360Result;
use serde::Serialize;

/// Lifecycle of one task within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Claimed = 1,
    Finished = 2,
    Failed = 3,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Claimed,
            2 => Self::Finished,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// A unit of work that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileFailure {
    pub index: usize,
    pub stage: String,
    pub message: String,
}

/// Outputs of one stage, indexed like the queue.
#[derive(Debug)]
pub struct StageReport<R> {
    pub outputs: Vec<Option<R>>,
    pub failures: Vec<TileFailure>,
}

impl<R> StageReport<R> {
    pub fn succeeded(&self) -> usize {
        self.outputs.iter().filter(|o| o.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Arena of task states plus the claim channel.
#[derive(Debug)]
pub struct TaskQueue {
    states: Vec<AtomicU8>,
    sender: Sender<usize>,
    receiver: Receiver<usize>,
}

impl TaskQueue {
    /// Queue with `len` pending tasks.
    pub fn new(len: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut queue = Self {
            states: (0..len).map(|_| AtomicU8::new(TaskState::Pending as u8)).collect(),
            sender,
            receiver,
        };
        queue.reset();
        queue
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Return every task to `Pending` and requeue all indices.
    ///
    /// Takes `&mut self`: no worker can hold the queue while it resets.
    pub fn reset(&mut self) {
        while self.receiver.try_recv().is_ok() {}
        for (index, state) in self.states.iter().enumerate() {
            state.store(TaskState::Pending as u8, Ordering::Release);
            // the queue owns both ends, so the channel never disconnects
            let _ = self.sender.send(index);
        }
    }

    /// Claim the next pending task, or `None` once the queue is drained.
    pub fn claim(&self) -> Option<usize> {
        while let Ok(index) = self.receiver.try_recv() {
            let claimed = self.states[index].compare_exchange(
                TaskState::Pending as u8,
                TaskState::Claimed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if claimed.is_ok() {
                return Some(index);
            }
        }
        None
    }

    /// Mark a claimed task as finished or failed.
    pub fn complete(&self, index: usize, ok: bool) {
        let next = if ok {
            TaskState::Finished
        } else {
            TaskState::Failed
        };
        self.states[index].store(next as u8, Ordering::Release);
    }

    pub fn state(&self, index: usize) -> TaskState {
        TaskState::from_u8(self.states[index].load(Ordering::Acquire))
    }

    /// Whether every task reached `Finished` or `Failed`.
    pub fn all_terminal(&self) -> bool {
        (0..self.len()).all(|i| self.state(i).is_terminal())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Run `work` once for every item using `threads` workers.
///
/// The queue is reset first and must have one task per item. Errors and
/// panics inside `work` mark the task `Failed` and are reported in the
/// returned [`StageReport`]; the stage itself never fails.
pub fn run_stage<T, R, F>(
    queue: &mut TaskQueue,
    threads: usize,
    stage: &str,
    items: &[T],
    work: F,
) -> StageReport<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> Sal360Result<R> + Sync,
{
    debug_assert_eq!(queue.len(), items.len());
    queue.reset();

    let workers = threads.max(1).min(items.len().max(1));
    let queue: &TaskQueue = queue;
    let work = &work;

    let per_worker: Vec<Vec<(usize, Result<R, String>)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    while let Some(index) = queue.claim() {
                        let result =
                            panic::catch_unwind(AssertUnwindSafe(|| work(index, &items[index])));
                        let result = match result {
                            Ok(Ok(output)) => Ok(output),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(payload) => Err(panic_message(payload.as_ref())),
                        };
                        queue.complete(index, result.is_ok());
                        done.push((index, result));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect()
    });

    let mut outputs: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    let mut failures = Vec::new();
    for (index, result) in per_worker.into_iter().flatten() {
        match result {
            Ok(output) => outputs[index] = Some(output),
            Err(message) => failures.push(TileFailure {
                index,
                stage: stage.to_string(),
                message,
            }),
        }
    }

    // a worker that died outside `work` leaves its claimed task non-terminal
    for index in 0..items.len() {
        if !queue.state(index).is_terminal() {
            queue.complete(index, false);
            failures.push(TileFailure {
                index,
                stage: stage.to_string(),
                message: "task was never completed".to_string(),
            });
        }
    }
    failures.sort_by_key(|f| f.index);

    for failure in &failures {
        tracing::warn!(
            stage,
            tile = failure.index,
            error = %failure.message,
            "tile failed"
        );
    }
    tracing::debug!(
        stage,
        workers,
        tasks = items.len(),
        failed = failures.len(),
        "stage joined"
    );

    StageReport { outputs, failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sal360_common::Sal360Error;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_claim_each_index_once() {
        let queue = TaskQueue::new(5);
        let mut claimed: Vec<usize> = std::iter::from_fn(|| queue.claim()).collect();
        claimed.sort_unstable();
        assert_eq!(claimed, vec![0, 1, 2, 3, 4]);
        assert!(queue.claim().is_none());
        assert_eq!(queue.state(2), TaskState::Claimed);
    }

    #[test]
    fn test_reset_requeues_everything() {
        let mut queue = TaskQueue::new(3);
        while let Some(i) = queue.claim() {
            queue.complete(i, true);
        }
        assert!(queue.all_terminal());
        queue.reset();
        assert_eq!(queue.state(0), TaskState::Pending);
        assert_eq!(std::iter::from_fn(|| queue.claim()).count(), 3);
    }

    #[test]
    fn test_stage_runs_every_item_once() {
        let items: Vec<usize> = (0..37).collect();
        let calls: Vec<AtomicUsize> = items.iter().map(|_| AtomicUsize::new(0)).collect();
        let mut queue = TaskQueue::new(items.len());

        let report = run_stage(&mut queue, 4, "double", &items, |i, v| {
            calls[i].fetch_add(1, Ordering::SeqCst);
            Ok(v * 2)
        });

        assert!(report.is_complete());
        assert_eq!(report.succeeded(), 37);
        assert_eq!(report.outputs[10], Some(20));
        assert!(calls.iter().all(|c| c.load(Ordering::SeqCst) == 1));
        assert!((0..37).all(|i| queue.state(i) == TaskState::Finished));
    }

    #[test]
    fn test_errors_and_panics_become_failures() {
        let items: Vec<usize> = (0..6).collect();
        let mut queue = TaskQueue::new(items.len());

        let report = run_stage(&mut queue, 3, "compute", &items, |i, _| {
            if i == 1 {
                return Err(Sal360Error::saliency("bad tile"));
            }
            if i == 4 {
                panic!("boom");
            }
            Ok(i)
        });

        assert_eq!(report.succeeded(), 4);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 4]);
        assert!(report.failures[1].message.contains("boom"));
        assert_eq!(report.failures[0].stage, "compute");
        assert_eq!(queue.state(4), TaskState::Failed);
        assert!(queue.all_terminal());
    }

    #[test]
    fn test_empty_stage() {
        let items: Vec<u8> = vec![];
        let mut queue = TaskQueue::new(0);
        let report = run_stage(&mut queue, 8, "noop", &items, |_, v| Ok(*v));
        assert!(report.outputs.is_empty());
        assert!(report.is_complete());
    }
}
