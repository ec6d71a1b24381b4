//! Bounded work queue with in-order result delivery.
//!
//! Tasks run on a fixed pool of worker threads in whatever order the workers
//! get to them, but the single consumer always sees results in submission
//! order. Each submission registers a rendezvous channel as a placeholder in a
//! bounded FIFO; whichever worker finishes the task resolves its placeholder,
//! and the consumer only ever blocks on the FIFO head. The FIFO bound doubles
//! as backpressure: `submit` blocks once `capacity` results are in flight.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread;

type Task<R> = Box<dyn FnOnce() -> R + Send + 'static>;

pub struct WorkQueue<R> {
    task_tx: Sender<(Task<R>, Sender<R>)>,
    slot_tx: Sender<Receiver<R>>,
    workers: Vec<thread::JoinHandle<()>>,
}

/// Consumer half of the queue. Held by exactly one thread.
pub struct ResultConsumer<R> {
    slot_rx: Receiver<Receiver<R>>,
}

impl<R: Send + 'static> WorkQueue<R> {
    /// Creates a queue backed by `num_workers` threads, allowing at most
    /// `capacity` submitted-but-unconsumed results at any time.
    pub fn ordered(num_workers: usize, capacity: usize) -> (Self, ResultConsumer<R>) {
        let (task_tx, task_rx) = bounded::<(Task<R>, Sender<R>)>(capacity);
        let (slot_tx, slot_rx) = bounded::<Receiver<R>>(capacity);

        let mut workers = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let task_rx = task_rx.clone();
            workers.push(thread::spawn(move || {
                while let Ok((task, done_tx)) = task_rx.recv() {
                    // The consumer may already be gone if the run is aborting;
                    // dropping the result is fine in that case.
                    let _ = done_tx.send(task());
                }
            }));
        }

        (
            WorkQueue {
                task_tx,
                slot_tx,
                workers,
            },
            ResultConsumer { slot_rx },
        )
    }

    /// Enqueues a task, blocking while the in-flight backlog is at capacity.
    /// Does not wait for the task to run. Fails if the consumer disconnected.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let (done_tx, done_rx) = bounded(1);
        // The slot goes in first so delivery order matches submission order;
        // this send is the one that blocks under backpressure.
        self.slot_tx
            .send(done_rx)
            .map_err(|_| anyhow!("result consumer disconnected"))?;
        self.task_tx
            .send((Box::new(task), done_tx))
            .map_err(|_| anyhow!("worker pool shut down"))?;
        Ok(())
    }

    /// Signals that no further submissions will occur and joins the workers.
    /// The consumer must keep calling `consume_with` until it returns false.
    pub fn finalize(self) -> Result<()> {
        drop(self.task_tx);
        drop(self.slot_tx);
        for handle in self.workers {
            handle
                .join()
                .map_err(|_| anyhow!("worker thread panicked"))?;
        }
        Ok(())
    }
}

impl<R> ResultConsumer<R> {
    /// Blocks until the oldest outstanding submission resolves, hands its
    /// result to `handler`, and frees the capacity slot. Returns `Ok(false)`
    /// once the queue has been finalized and fully drained.
    pub fn consume_with<F>(&self, handler: F) -> Result<bool>
    where
        F: FnOnce(R) -> Result<()>,
    {
        let done_rx = match self.slot_rx.recv() {
            Ok(rx) => rx,
            Err(_) => return Ok(false),
        };
        let result = done_rx
            .recv()
            .context("worker dropped a task without producing a result")?;
        handler(result)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn delivers_in_submission_order_despite_random_latency() {
        let (queue, consumer) = WorkQueue::ordered(4, 8);
        let mut rng = rand::thread_rng();

        let collector = thread::spawn(move || {
            let mut seen = Vec::new();
            while consumer
                .consume_with(|n| {
                    seen.push(n);
                    Ok(())
                })
                .unwrap()
            {}
            seen
        });

        for i in 0..100usize {
            let delay = rng.gen_range(0..5u64);
            queue
                .submit(move || {
                    thread::sleep(Duration::from_millis(delay));
                    i
                })
                .unwrap();
        }
        queue.finalize().unwrap();

        let seen = collector.join().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn in_flight_backlog_never_exceeds_capacity() {
        let capacity = 3;
        let (queue, consumer) = WorkQueue::ordered(2, capacity);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let consumer_in_flight = Arc::clone(&in_flight);
        let collector = thread::spawn(move || {
            while consumer
                .consume_with(|_: usize| {
                    // Slow consumer forces the producer to hit the bound.
                    thread::sleep(Duration::from_millis(2));
                    consumer_in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap()
            {}
        });

        for i in 0..50usize {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(current, Ordering::SeqCst);
            queue.submit(move || i).unwrap();
        }
        queue.finalize().unwrap();
        collector.join().unwrap();

        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        // One extra because the producer increments before submit blocks.
        assert!(max_seen.load(Ordering::SeqCst) <= capacity + 1);
    }

    #[test]
    fn drain_delivers_everything_exactly_once_then_false() {
        let (queue, consumer) = WorkQueue::ordered(3, 4);

        let collector = thread::spawn(move || {
            let mut seen = Vec::new();
            while consumer
                .consume_with(|n| {
                    seen.push(n);
                    Ok(())
                })
                .unwrap()
            {}
            // Finalized and drained: must keep returning false.
            for _ in 0..3 {
                assert!(!consumer.consume_with(|_| Ok(())).unwrap());
            }
            seen
        });

        for i in 0..17usize {
            queue.submit(move || i).unwrap();
        }
        queue.finalize().unwrap();

        let seen = collector.join().unwrap();
        assert_eq!(seen, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn empty_queue_drains_immediately() {
        let (queue, consumer) = WorkQueue::<usize>::ordered(2, 4);
        queue.finalize().unwrap();
        assert!(!consumer.consume_with(|_| Ok(())).unwrap());
    }

    #[test]
    fn panicking_task_surfaces_as_consumer_error() {
        let (queue, consumer) = WorkQueue::ordered(1, 2);
        queue.submit(|| -> usize { panic!("boom") }).unwrap();

        let err = consumer.consume_with(|_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("without producing a result"));
        assert!(queue.finalize().is_err());
    }
}
