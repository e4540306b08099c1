use std::{
    io,
    num::NonZeroUsize,
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads pulling jobs off a shared queue.
///
/// Jobs submitted while every worker is busy wait in the queue.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    pub fn new(size: NonZeroUsize) -> io::Result<Self> {
        let size = size.get();
        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::channel();

        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Some(sender);

        for i in 0..size {
            workers.push(Worker::new(i, Arc::clone(&receiver))?);
        }

        Ok(Self { workers, sender })
    }

    pub fn execute<F>(&self, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Box::new(f);
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| io::Error::other("thread pool is shut down"))?;
        sender
            .send(job)
            .map_err(|_| io::Error::other("every worker has exited"))
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("shutting down worker {}", worker.id);

            if worker.thread.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("tlv-worker-{id}"))
            .spawn(move || {
                loop {
                    let msg = match receiver.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    match msg {
                        Ok(job) => {
                            debug!("worker {id} handling a connection");
                            job();
                        }
                        Err(_) => {
                            debug!("worker {id} disconnected");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { id, thread })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[test]
    fn runs_every_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(NonZeroUsize::new(3).unwrap()).unwrap();
        assert_eq!(pool.size(), 3);

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        drop(pool);

        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn jobs_queue_behind_busy_workers() {
        let pool = ThreadPool::new(NonZeroUsize::new(1).unwrap()).unwrap();
        let (tx, rx) = mpsc::channel();

        let first = tx.clone();
        pool.execute(move || {
            thread::sleep(Duration::from_millis(100));
            first.send(1).unwrap();
        })
        .unwrap();
        pool.execute(move || tx.send(2).unwrap()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
    }
}
