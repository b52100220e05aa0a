use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use sal360_common::Sal360Error;
use sal360_processing_core::queue::{run_stage, TaskQueue, TaskState};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_task_runs_exactly_once(tasks in 0usize..200, workers in 1usize..16) {
        let items: Vec<usize> = (0..tasks).collect();
        let calls: Vec<AtomicUsize> = items.iter().map(|_| AtomicUsize::new(0)).collect();
        let mut queue = TaskQueue::new(tasks);

        let report = run_stage(&mut queue, workers, "count", &items, |i, _| {
            calls[i].fetch_add(1, Ordering::SeqCst);
            Ok(i)
        });

        prop_assert_eq!(report.succeeded(), tasks);
        prop_assert!(calls.iter().all(|c| c.load(Ordering::SeqCst) == 1));
        prop_assert!((0..tasks).all(|i| queue.state(i) == TaskState::Finished));
    }

    #[test]
    fn failing_tasks_still_reach_a_terminal_state(
        tasks in 1usize..120,
        workers in 1usize..12,
        modulus in 2usize..7,
    ) {
        let items: Vec<usize> = (0..tasks).collect();
        let mut queue = TaskQueue::new(tasks);

        let report = run_stage(&mut queue, workers, "flaky", &items, |i, _| {
            if i % modulus == 0 {
                Err(Sal360Error::stage("flaky", format!("task {i}")))
            } else {
                Ok(())
            }
        });

        let expected_failures = (0..tasks).filter(|i| i % modulus == 0).count();
        prop_assert_eq!(report.failures.len(), expected_failures);
        prop_assert_eq!(report.succeeded(), tasks - expected_failures);
        prop_assert!(queue.all_terminal());
    }
}

#[test]
fn queue_is_reusable_across_stages() {
    let items: Vec<u32> = (0..25).collect();
    let mut queue = TaskQueue::new(items.len());

    let first = run_stage(&mut queue, 4, "first", &items, |_, v| Ok(v + 1));
    let inputs: Vec<u32> = first.outputs.into_iter().flatten().collect();
    let second = run_stage(&mut queue, 3, "second", &inputs, |_, v| Ok(v * 10));

    assert_eq!(second.outputs[0], Some(10));
    assert_eq!(second.outputs[24], Some(250));
    assert!(queue.all_terminal());
}
