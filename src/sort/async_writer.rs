//! A bounded-queue background writer that decouples a producer from a slower sink.
use std::{
    sync::{
        mpsc::{sync_channel, SyncSender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use crate::{Error, Result};

/// A sink that writes one item at a time, synchronously, from a single thread.
pub trait SynchronousSink<T>: Send {
    /// Write one item to the underlying destination.
    fn write_one(&mut self, item: T) -> Result<()>;

    /// Flush and release any resources held by the sink.
    fn close(&mut self) -> Result<()>;
}

/// Wraps a [`SynchronousSink`] with a background worker thread and a bounded channel, so a fast
/// producer is not blocked on a slow sink beyond the channel's capacity.
///
/// The first error raised by the worker (either from `write_one` or from `close`) is latched and
/// re-thrown on the next producer call to `write_one` or `close`, then cleared.
pub struct AsyncWriter<T> {
    sender: Option<SyncSender<T>>,
    worker: Option<JoinHandle<()>>,
    error: Arc<Mutex<Option<Error>>>,
}

impl<T: Send + 'static> AsyncWriter<T> {
    /// Spawn the background worker. `queue_capacity` bounds how far the producer may run ahead
    /// of the sink before `write_one` blocks. `thread_name_prefix` names the spawned thread.
    pub fn new<S>(mut sink: S, queue_capacity: usize, thread_name_prefix: &str) -> Self
    where
        S: SynchronousSink<T> + 'static,
    {
        let (sender, receiver) = sync_channel::<T>(queue_capacity.max(1));
        let error = Arc::new(Mutex::new(None));
        let worker_error = Arc::clone(&error);

        let worker = thread::Builder::new()
            .name(format!("{thread_name_prefix}-0"))
            .spawn(move || {
                // `iter()` blocks for each item and returns once every sender has dropped,
                // which drains anything already queued before the channel closes.
                for item in receiver.iter() {
                    if worker_error.lock().unwrap().is_some() {
                        continue; // a prior error is latched; keep draining to avoid deadlocking the producer.
                    }
                    if let Err(e) = sink.write_one(item) {
                        *worker_error.lock().unwrap() = Some(e);
                    }
                }
                if let Err(e) = sink.close() {
                    let mut guard = worker_error.lock().unwrap();
                    if guard.is_none() {
                        *guard = Some(e);
                    }
                }
            })
            .expect("failed to spawn background writer thread");

        Self { sender: Some(sender), worker: Some(worker), error }
    }

    /// Take and return the latched worker error, if any.
    fn take_latched_error(&self) -> Result<()> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(())
    }

    /// Enqueue an item for the background worker to write. Blocks if the queue is full.
    pub fn write_one(&mut self, item: T) -> Result<()> {
        self.take_latched_error()?;
        if let Some(sender) = &self.sender {
            sender
                .send(item)
                .map_err(|_| Error::WorkerPanicked("background writer thread exited early".to_owned()))?;
        }
        Ok(())
    }

    /// Drain the queue, join the worker, and close the wrapped sink. Idempotent.
    ///
    /// Cleanup always runs to completion even if an error was already latched before this call;
    /// a previously-latched error is reported but never short-circuits the join, so a second call
    /// to `close` after an error still sees the worker drained and joined.
    pub fn close(&mut self) -> Result<()> {
        let latched_before = self.take_latched_error();

        if let Some(sender) = self.sender.take() {
            drop(sender);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                let mut guard = self.error.lock().unwrap();
                if guard.is_none() {
                    *guard = Some(Error::WorkerPanicked("background writer thread panicked".to_owned()));
                }
            }
        }

        latched_before?;
        self.take_latched_error()
    }
}

impl<T> Drop for AsyncWriter<T> {
    fn drop(&mut self) {
        if self.sender.is_some() {
            drop(self.sender.take());
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.join() {
                log::error!("async writer: background thread panicked during drop: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    struct VecSink(StdArc<StdMutex<Vec<i32>>>);

    impl SynchronousSink<i32> for VecSink {
        fn write_one(&mut self, item: i32) -> Result<()> {
            self.0.lock().unwrap().push(item);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn delivers_every_item_in_enqueue_order() {
        let received = StdArc::new(StdMutex::new(Vec::new()));
        let mut writer = AsyncWriter::new(VecSink(StdArc::clone(&received)), 16, "async-writer-test");

        for i in 0..100_000 {
            writer.write_one(i).unwrap();
        }
        writer.close().unwrap();

        let got = received.lock().unwrap();
        assert_eq!(got.len(), 100_000);
        assert!(got.iter().enumerate().all(|(i, &v)| i as i32 == v));
    }

    #[test]
    fn close_is_idempotent() {
        let received = StdArc::new(StdMutex::new(Vec::new()));
        let mut writer = AsyncWriter::new(VecSink(StdArc::clone(&received)), 4, "async-writer-test");
        writer.write_one(1).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert_eq!(*received.lock().unwrap(), vec![1]);
    }

    struct FailingSink;

    impl SynchronousSink<i32> for FailingSink {
        fn write_one(&mut self, _item: i32) -> Result<()> {
            Err(Error::Codec("boom".to_owned()))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn latched_error_surfaces_on_next_call_and_then_clears() {
        let mut writer = AsyncWriter::new(FailingSink, 4, "async-writer-test");
        writer.write_one(1).unwrap();
        // Give the worker a chance to observe the failing write and latch the error; a bounded
        // channel of capacity 4 combined with a second send forces the worker to have drained
        // the first item, so by the time write_one returns the error is visible.
        for i in 2..6 {
            let _ = writer.write_one(i);
        }
        let result = writer.close();
        assert!(result.is_err());
        assert!(writer.close().is_ok());
    }
}
