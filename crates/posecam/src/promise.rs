//! Single-shot completion signals and worker threads.
//!
//! Asynchronous operations (model loading, stream acquisition, inference) hand their caller a
//! [`PromiseHandle`] and fulfil the connected [`Promise`] from another thread. The UI thread polls
//! the handle with [`PromiseHandle::poll`] and never has to block.

use std::{
    fmt, io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` will never block.
    let (sender, recv) = channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// An empty slot that can be filled with a `T`, fulfilling the promise.
///
/// Fulfilling a [`Promise`] lets the connected [`PromiseHandle`] retrieve the value. Dropping it
/// without fulfilling it makes the handle resolve to [`PromiseDropped`].
pub struct Promise<T> {
    inner: Sender<T>,
}

impl<T> Promise<T> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// This method does not block or fail. If the connected [`PromiseHandle`] was dropped, `value`
    /// is dropped and nothing happens.
    pub fn fulfill(self, value: T) {
        self.inner.send(value).ok();
    }
}

/// A handle connected to a [`Promise`] that will eventually resolve to a value of type `T`.
pub struct PromiseHandle<T> {
    recv: Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Creates a handle that is already resolved to `value`.
    pub fn ready(value: T) -> Self {
        let (promise, handle) = promise();
        promise.fulfill(value);
        handle
    }

    /// Blocks the calling thread until the [`Promise`] is fulfilled or dropped.
    pub fn block(self) -> Result<T, PromiseDropped> {
        self.recv.recv().map_err(|_| PromiseDropped { _priv: () })
    }

    /// Checks for a result without blocking.
    ///
    /// Returns [`None`] while the [`Promise`] is still pending. Once this has returned [`Some`],
    /// the handle is spent and must not be polled again.
    pub fn poll(&mut self) -> Option<Result<T, PromiseDropped>> {
        match self.recv.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PromiseDropped { _priv: () })),
        }
    }

    /// Returns whether the associated [`Promise`] has been fulfilled.
    ///
    /// This returns `false` when the promise was dropped without a value; use
    /// [`PromiseHandle::poll`] to observe that case.
    pub fn is_fulfilled(&self) -> bool {
        !self.recv.is_empty()
    }
}

impl<T> fmt::Debug for PromiseHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseHandle")
            .field("fulfilled", &self.is_fulfilled())
            .finish()
    }
}

/// An error returned by [`PromiseHandle`] indicating that the connected [`Promise`] object was
/// dropped without being fulfilled.
#[derive(Debug, Clone, Copy)]
pub struct PromiseDropped {
    _priv: (),
}

impl fmt::Display for PromiseDropped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("promise was dropped without being fulfilled")
    }
}

impl std::error::Error for PromiseDropped {}

/// A builder object that can be used to configure and spawn a [`Worker`].
#[derive(Clone)]
pub struct WorkerBuilder {
    name: Option<String>,
    capacity: usize,
}

impl WorkerBuilder {
    /// Sets the name of the [`Worker`] thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the channel capacity of the [`Worker`].
    ///
    /// By default, a capacity of 0 is used, which means that [`Worker::send`] will block until the
    /// worker has finished processing any preceding message.
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Spawns a [`Worker`] thread that uses `handler` to process incoming messages.
    pub fn spawn<I, F>(self, mut handler: F) -> io::Result<Worker<I>>
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
    {
        let (sender, recv) = channel::bounded(self.capacity);
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let name = self.name.unwrap_or_else(|| "<unnamed>".into());
        let handle = builder.spawn(move || {
            log::trace!("worker '{name}' starting");
            for message in recv {
                handler(message);
            }
            log::trace!("worker '{name}' exiting");
        })?;

        Ok(Worker {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

/// A handle to a worker thread that processes messages of type `I`.
///
/// When dropped, the channel to the thread will be dropped and the thread will be joined. If the
/// thread has panicked, the panic will be forwarded to the thread dropping the `Worker`.
pub struct Worker<I: Send + 'static> {
    sender: Option<Sender<I>>,
    handle: Option<JoinHandle<()>>,
}

impl<I: Send + 'static> Drop for Worker<I> {
    fn drop(&mut self) {
        // Close the channel to signal the thread to exit.
        drop(self.sender.take());

        self.wait_for_exit();
    }
}

impl Worker<()> {
    /// Returns a builder that can be used to configure and spawn a [`Worker`].
    #[inline]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder {
            name: None,
            capacity: 0,
        }
    }
}

impl<I: Send + 'static> Worker<I> {
    fn wait_for_exit(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }

    /// Sends a message to the worker thread if it is idle, handing the message back otherwise.
    ///
    /// If the worker has panicked, this will propagate the panic to the calling thread.
    pub fn try_send(&mut self, msg: I) -> Result<(), I> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(msg);
        };
        match sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(msg)) => Err(msg),
            Err(channel::TrySendError::Disconnected(msg)) => {
                self.wait_for_exit();
                Err(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;

    fn silent_panic(payload: String) {
        resume_unwind(Box::new(payload));
    }

    #[test]
    fn worker_propagates_panic_on_drop() {
        let mut worker = Worker::builder()
            .capacity(1)
            .spawn(|_: ()| silent_panic("worker panic".into()))
            .unwrap();
        worker.try_send(()).unwrap();
        catch_unwind(AssertUnwindSafe(|| drop(worker))).unwrap_err();
    }

    #[test]
    fn worker_fulfills_promises() {
        let mut worker = Worker::builder()
            .name("doubler")
            .capacity(1)
            .spawn(|(value, promise): (u32, Promise<u32>)| promise.fulfill(value * 2))
            .unwrap();
        let (promise, handle) = promise();
        assert!(worker.try_send((21, promise)).is_ok());
        assert_eq!(handle.block().unwrap(), 42);
    }

    #[test]
    fn poll_pending_then_fulfilled() {
        let (promise, mut handle) = promise();
        assert!(!handle.is_fulfilled());
        assert!(handle.poll().is_none());
        promise.fulfill(7);
        assert!(handle.is_fulfilled());
        assert_eq!(handle.poll().unwrap().unwrap(), 7);
    }

    #[test]
    fn dropped_promise_resolves_to_error() {
        let (promise, mut handle) = promise::<()>();
        drop(promise);
        assert!(!handle.is_fulfilled());
        assert!(handle.poll().unwrap().is_err());
    }

    #[test]
    fn ready_handle() {
        assert_eq!(PromiseHandle::ready("x").block().unwrap(), "x");
    }
}
