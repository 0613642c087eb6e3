//! Integration tests for blocking allocation, hand-off and wake order.

mod handoff_tests {
    use crate::errors::SlabError;
    use crate::sched::{priority, HostScheduler, WaitPolicy};
    use crate::tests::helpers::{host_slab, wait_for_waiters};
    use crate::time::Timeout;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_blocked_alloc_receives_freed_block() {
        let slab = host_slab(64, 1, WaitPolicy::Priority);
        let held = slab.alloc(Timeout::NoWait).unwrap();
        let held_addr = held.as_ptr() as usize;

        thread::scope(|s| {
            let waiter = s.spawn(|| {
                HostScheduler::set_priority(priority::HIGH);
                slab.alloc(Timeout::Forever)
            });

            wait_for_waiters(&slab, 1);
            slab.free(held);

            let block = waiter.join().unwrap().expect("waiter must get the block");
            assert_eq!(block.as_ptr() as usize, held_addr);
            assert_eq!(slab.num_used(), 1);
            assert_eq!(slab.num_waiters(), 0);
            slab.free(block);
        });

        assert_eq!(slab.num_used(), 0);
    }

    #[test]
    fn test_hand_off_cannot_be_stolen() {
        let slab = host_slab(32, 1, WaitPolicy::Priority);
        let held = slab.alloc(Timeout::NoWait).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| slab.alloc(Timeout::Forever));
            wait_for_waiters(&slab, 1);

            slab.free(held);
            // The released block already belongs to the waiter.
            assert_eq!(slab.alloc(Timeout::NoWait).unwrap_err(), SlabError::OutOfResources);

            let block = waiter.join().unwrap().unwrap();
            slab.free(block);
        });

        assert_eq!(slab.num_free(), 1);
    }

    #[test]
    fn test_timeout_leaves_pool_unchanged() {
        let slab = host_slab(64, 2, WaitPolicy::Priority);
        let a = slab.alloc(Timeout::NoWait).unwrap();
        let b = slab.alloc(Timeout::NoWait).unwrap();
        let before = slab.stats();

        let start = Instant::now();
        let result = slab.alloc(Timeout::from_millis(30));
        assert_eq!(result.unwrap_err(), SlabError::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));

        assert_eq!(slab.stats(), before);
        assert_eq!(slab.num_used(), 2);
        assert_eq!(slab.num_waiters(), 0);

        slab.free(a);
        slab.free(b);
    }

    #[test]
    fn test_release_racing_timeout_loses_nothing() {
        let slab = host_slab(16, 1, WaitPolicy::Priority);

        for round in 0..50u64 {
            let held = slab.alloc(Timeout::NoWait).unwrap();
            thread::scope(|s| {
                let waiter = s.spawn(|| slab.alloc(Timeout::from_micros(500)));
                thread::sleep(Duration::from_micros(400 + (round % 5) * 50));
                slab.free(held);

                match waiter.join().unwrap() {
                    Ok(block) => slab.free(block),
                    Err(err) => assert_eq!(err, SlabError::TimedOut),
                }
            });

            assert_eq!(slab.num_used(), 0);
            assert_eq!(slab.num_free(), 1);
            assert_eq!(slab.num_waiters(), 0);
        }
    }

    /// Exhaust a one-block slab, queue contexts at `priorities` in order,
    /// then free one block at a time and record which context got it.
    fn wake_order(policy: WaitPolicy, priorities: &[u8]) -> Vec<u8> {
        let slab = host_slab(64, 1, policy);
        let held = slab.alloc(Timeout::NoWait).unwrap();
        let (tx, rx) = mpsc::channel();
        let mut order = Vec::new();

        thread::scope(|s| {
            for (queued, &prio) in priorities.iter().enumerate() {
                let tx = tx.clone();
                let slab = &slab;
                s.spawn(move || {
                    HostScheduler::set_priority(prio);
                    let block = slab.alloc(Timeout::Forever).unwrap();
                    tx.send((prio, block)).unwrap();
                });
                wait_for_waiters(slab, queued + 1);
            }

            slab.free(held);
            for _ in priorities {
                let (prio, block) = rx.recv().unwrap();
                order.push(prio);
                slab.free(block);
            }
        });

        assert_eq!(slab.num_used(), 0);
        order
    }

    #[test]
    fn test_wake_order_follows_priority() {
        let order = wake_order(
            WaitPolicy::Priority,
            &[priority::LOW, priority::HIGH, priority::NORMAL],
        );
        assert_eq!(order, [priority::HIGH, priority::NORMAL, priority::LOW]);
    }

    #[test]
    fn test_wake_order_fifo_policy() {
        let order = wake_order(
            WaitPolicy::Fifo,
            &[priority::LOW, priority::HIGH, priority::NORMAL],
        );
        assert_eq!(order, [priority::LOW, priority::HIGH, priority::NORMAL]);
    }

    #[test]
    fn test_equal_priorities_wake_in_arrival_order() {
        let slab = host_slab(64, 1, WaitPolicy::Priority);
        let held = slab.alloc(Timeout::NoWait).unwrap();
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            for tag in 0..4u8 {
                let tx = tx.clone();
                let slab = &slab;
                s.spawn(move || {
                    let block = slab.alloc(Timeout::Forever).unwrap();
                    tx.send((tag, block)).unwrap();
                });
                wait_for_waiters(slab, usize::from(tag) + 1);
            }

            slab.free(held);
            for expected in 0..4u8 {
                let (tag, block) = rx.recv().unwrap();
                assert_eq!(tag, expected);
                slab.free(block);
            }
        });
    }
}
