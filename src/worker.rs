//! Single background thread for deferred write-backs.
//!
//! Jobs run in submission order. [`WorkerHandle::wait_idle`] blocks until
//! every job submitted so far has finished; dropping the [`Worker`] queues a
//! shutdown message behind the remaining jobs and joins the thread, so
//! nothing submitted before the drop is lost.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn finish_one(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Cloneable submission side of a [`Worker`].
#[derive(Clone)]
pub struct WorkerHandle {
    sender: Sender<Message>,
    pending: Arc<Pending>,
}

impl WorkerHandle {
    /// Queues `job`. Returns it if the worker has already shut down.
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        *self.pending.count.lock() += 1;
        match self.sender.send(Message::Run(job)) {
            Ok(()) => Ok(()),
            Err(mpsc::SendError(message)) => {
                self.pending.finish_one();
                match message {
                    Message::Run(job) => Err(job),
                    Message::Shutdown => Ok(()),
                }
            }
        }
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Blocks until the queue is empty.
    pub fn wait_idle(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Owner of the background thread.
#[derive(Debug)]
pub struct Worker {
    handle: WorkerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let pending = Arc::new(Pending::default());
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn({
                let pending = Arc::clone(&pending);
                move || run(receiver, &pending)
            })?;
        Ok(Self {
            handle: WorkerHandle { sender, pending },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Runs every queued job, then stops the thread.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.sender.send(Message::Shutdown);
        if thread.join().is_err() {
            warn!("background worker terminated abnormally");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(receiver: Receiver<Message>, pending: &Pending) {
    for message in receiver {
        match message {
            Message::Run(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!("background job panicked");
                }
                pending.finish_one();
            }
            Message::Shutdown => break,
        }
    }
}
