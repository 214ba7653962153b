// Execution context — serialized ownership of mutable router state
//
// One consumer thread owns the state value; every other thread mutates it
// only by submitting a closure over a single-consumer channel. Because all
// mutation and iteration run on that one thread, the state needs no lock;
// operation order is submission order, interleaved only with the periodic
// tick. A second fire-and-forget executor absorbs filesystem work so slow
// disks never stall the logic thread.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("execution context stopped")]
    Stopped,
}

enum Msg<S> {
    Task(Box<dyn FnOnce(&mut S) + Send>),
    Stop,
}

/// Owns the consumer thread and the state it runs.
///
/// `shutdown` (or drop) stops the consumer after every task submitted
/// before it; tasks submitted afterwards are dropped with a warning.
pub struct ExecContext<S: Send + 'static> {
    tx: mpsc::Sender<Msg<S>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<S: Send + 'static> ExecContext<S> {
    /// Spawn the consumer thread.
    ///
    /// `on_tick` runs on the consumer thread every `tick_interval` of
    /// submission silence, for periodic maintenance like expiry sweeps.
    pub fn spawn<F>(mut state: S, tick_interval: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut(&mut S) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Msg<S>>();
        let thread = thread::Builder::new()
            .name("veilnet-logic".into())
            .spawn(move || {
                let mut next_tick = Instant::now() + tick_interval;
                loop {
                    // run the tick whenever it is due, even if the queue
                    // never drains, so submission pressure cannot starve
                    // periodic maintenance
                    if Instant::now() >= next_tick {
                        on_tick(&mut state);
                        next_tick = Instant::now() + tick_interval;
                    }
                    let timeout = next_tick.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(timeout) {
                        Ok(Msg::Task(task)) => task(&mut state),
                        Ok(Msg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                }
            })?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// A cloneable submission handle for other threads
    pub fn handle(&self) -> ExecHandle<S> {
        ExecHandle {
            tx: self.tx.clone(),
        }
    }

    /// Fire-and-forget submission
    pub fn submit(&self, task: impl FnOnce(&mut S) + Send + 'static) {
        self.handle().submit(task);
    }

    /// Blocking submission: suspends the caller until the closure has run
    /// on the consumer thread and returns its result.
    ///
    /// Must not be called from the consumer thread itself.
    pub fn submit_and_wait<R, F>(&self, task: F) -> Result<R, ExecError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        self.handle().submit_and_wait(task)
    }

    /// Stop the consumer after all previously submitted tasks and join it
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.tx.send(Msg::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<S: Send + 'static> Drop for ExecContext<S> {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Cloneable submission side of an execution context
pub struct ExecHandle<S> {
    tx: mpsc::Sender<Msg<S>>,
}

impl<S> Clone for ExecHandle<S> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<S: Send + 'static> ExecHandle<S> {
    pub fn submit(&self, task: impl FnOnce(&mut S) + Send + 'static) {
        if self.tx.send(Msg::Task(Box::new(task))).is_err() {
            tracing::warn!("execution context stopped; dropping task");
        }
    }

    pub fn submit_and_wait<R, F>(&self, task: F) -> Result<R, ExecError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.submit(move |state| {
            let _ = reply_tx.send(task(state));
        });
        reply_rx.blocking_recv().map_err(|_| ExecError::Stopped)
    }
}

enum DiskMsg {
    Task(Box<dyn FnOnce() + Send>),
    Stop,
}

/// Fire-and-forget executor for filesystem work.
///
/// Nothing blocks on completion and nothing is retried: in-memory state is
/// authoritative, the on-disk mirror is eventually consistent.
pub struct DiskExecutor {
    tx: mpsc::Sender<DiskMsg>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DiskExecutor {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<DiskMsg>();
        let thread = thread::Builder::new()
            .name("veilnet-disk".into())
            .spawn(move || loop {
                match rx.recv() {
                    Ok(DiskMsg::Task(task)) => task(),
                    Ok(DiskMsg::Stop) | Err(_) => break,
                }
            })?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> DiskHandle {
        DiskHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop after all previously submitted work and join the thread
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.tx.send(DiskMsg::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DiskExecutor {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Cloneable submission side of the disk executor
#[derive(Clone)]
pub struct DiskHandle {
    tx: mpsc::Sender<DiskMsg>,
}

impl DiskHandle {
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        if self.tx.send(DiskMsg::Task(Box::new(task))).is_err() {
            tracing::warn!("disk executor stopped; dropping task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_submit_and_wait_returns_result() {
        let ctx = ExecContext::spawn(10u32, Duration::from_secs(60), |_| {}).unwrap();
        let doubled = ctx.submit_and_wait(|n| {
            *n *= 2;
            *n
        });
        assert_eq!(doubled.unwrap(), 20);
        ctx.shutdown();
    }

    #[test]
    fn test_submissions_run_in_order() {
        let ctx = ExecContext::spawn(Vec::<u32>::new(), Duration::from_secs(60), |_| {}).unwrap();
        for i in 0..100 {
            ctx.submit(move |v| v.push(i));
        }
        let seen = ctx.submit_and_wait(|v| v.clone()).unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        ctx.shutdown();
    }

    #[test]
    fn test_submissions_from_many_threads_serialize() {
        let ctx = ExecContext::spawn(0u64, Duration::from_secs(60), |_| {}).unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let handle = ctx.handle();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    handle.submit(|n| *n += 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let total = ctx.submit_and_wait(|n| *n).unwrap();
        assert_eq!(total, 800);
    }

    #[test]
    fn test_tick_fires_periodically() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let seen = ticks.clone();
        let ctx = ExecContext::spawn((), Duration::from_millis(5), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        ctx.shutdown();
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_tick_fires_under_sustained_load() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let seen = ticks.clone();
        let ctx = ExecContext::spawn((), Duration::from_millis(10), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // keep the queue full for ~100ms so the consumer never idles
        for _ in 0..50 {
            ctx.submit(|_| std::thread::sleep(Duration::from_millis(2)));
        }
        ctx.submit_and_wait(|_| {}).unwrap();

        assert!(
            ticks.load(Ordering::SeqCst) >= 2,
            "tick must not be starved by continuous submissions"
        );
        ctx.shutdown();
    }

    #[test]
    fn test_disk_executor_runs_work() {
        let disk = DiskExecutor::spawn().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let count = count.clone();
            disk.handle().submit(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        disk.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_submit_and_wait_after_shutdown_errors() {
        let ctx = ExecContext::spawn(0u32, Duration::from_secs(60), |_| {}).unwrap();
        let handle = ctx.handle();
        ctx.shutdown();
        assert!(matches!(
            handle.submit_and_wait(|n| *n),
            Err(ExecError::Stopped)
        ));
    }
}
