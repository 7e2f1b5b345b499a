/*!
Rate-limited command queue.

One consumer thread drains a bounded crossbeam channel, running at most
`max_rate` jobs per second. Producers never block: a full queue rejects the
job.
*/

use crossbeam_channel::{bounded, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct CommandQueue<T: Send + 'static> {
    sender: Option<Sender<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> CommandQueue<T> {
    pub fn spawn(
        max_rate: u32,
        capacity: usize,
        mut consumer: impl FnMut(T) + Send + 'static,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<T>(capacity.max(1));
        let interval = Duration::from_secs_f64(1.0 / f64::from(max_rate.max(1)));

        let handle = thread::Builder::new()
            .name("command-queue".to_string())
            .spawn(move || {
                let mut last_run: Option<Instant> = None;
                // iter() ends once every sender is gone and the queue is empty
                for job in receiver.iter() {
                    if let Some(last) = last_run {
                        let elapsed = last.elapsed();
                        if elapsed < interval {
                            thread::sleep(interval - elapsed);
                        }
                    }
                    last_run = Some(Instant::now());
                    consumer(job);
                }
                debug!("Command queue drained");
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a job; `false` if the queue is full or shut down
    pub fn submit(&self, job: T) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Command queue full, dropping command");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Jobs waiting to run
    pub fn len(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting jobs, run the ones already queued, join the consumer
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Command queue consumer panicked");
            }
        }
    }
}

impl<T: Send + 'static> Drop for CommandQueue<T> {
    fn drop(&mut self) {
        self.close();
    }
}
