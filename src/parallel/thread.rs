//! Workers running as threads of one process.

use std::thread;

use anyhow::{self, format_err};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::parallel::{decode, encode, Communicator};

/// A communication context for workers running as threads of one process.
///
/// Every ordered pair of workers is linked by its own channel, so messages from one worker to
/// another arrive in the order they were sent. A worker that returns drops its senders, and a
/// peer still waiting on it receives an error instead of blocking forever.
#[derive(Clone, Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,

    /// Senders to every worker, indexed by the destination rank.
    outboxes: Vec<Sender<Vec<u8>>>,

    /// Receivers from every worker, indexed by the source rank.
    inboxes: Vec<Receiver<Vec<u8>>>,
}

impl ThreadCommunicator {
    /// Creates the contexts of a group of workers, one per rank.
    ///
    /// # Errors
    ///
    /// Errors if `size` is zero.
    pub fn world(size: usize) -> Result<Vec<Self>, anyhow::Error> {
        if size == 0 {
            return Err(format_err!("A group of workers cannot be empty."));
        }
        let mut outboxes = vec![Vec::with_capacity(size); size];
        let mut inboxes = vec![Vec::with_capacity(size); size];
        for source in 0..size {
            for destination in 0..size {
                let (tx, rx) = unbounded();
                outboxes[source].push(tx);
                inboxes[destination].push(rx);
            }
        }
        Ok(outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| Self {
                rank,
                size,
                outboxes,
                inboxes,
            })
            .collect())
    }

    /// Runs a closure on a group of scoped worker threads.
    ///
    /// Each worker owns its context, which is dropped as soon as the closure returns.
    ///
    /// # Returns
    ///
    /// The results of the workers, in rank order.
    ///
    /// # Errors
    ///
    /// Errors if `size` is zero or a worker panics.
    pub fn run<F, R>(size: usize, f: F) -> Result<Vec<R>, anyhow::Error>
    where
        F: Fn(&ThreadCommunicator) -> R + Sync,
        R: Send,
    {
        let comms = Self::world(size)?;
        log::debug!("Running {size} worker thread(s).");
        let f = &f;
        thread::scope(|s| {
            let handles = comms
                .into_iter()
                .map(|comm| s.spawn(move || f(&comm)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| format_err!("Worker {rank} panicked."))
                })
                .collect()
        })
    }

    fn send(&self, destination: usize, message: Vec<u8>) -> Result<(), anyhow::Error> {
        self.outboxes[destination].send(message).map_err(|_| {
            format_err!(
                "Worker {destination} has left before receiving from worker {}.",
                self.rank
            )
        })
    }

    fn receive(&self, source: usize) -> Result<Vec<u8>, anyhow::Error> {
        self.inboxes[source].recv().map_err(|_| {
            format_err!(
                "Worker {source} has left before sending to worker {}.",
                self.rank
            )
        })
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        // A worker that has left releases its peers rather than holding them here.
        if self.is_root() {
            for source in 1..self.size {
                let _ = self.receive(source);
            }
            for destination in 1..self.size {
                let _ = self.send(destination, Vec::new());
            }
        } else {
            let _ = self.send(0, Vec::new());
            let _ = self.receive(0);
        }
    }

    fn gather<T: Serialize + DeserializeOwned>(
        &self,
        local: T,
    ) -> Result<Option<Vec<T>>, anyhow::Error> {
        if self.is_root() {
            // Every message is drained before any error is reported, so the channels stay
            // aligned for the next collective.
            let received = (1..self.size)
                .map(|source| self.receive(source).and_then(|bytes| decode::<T>(&bytes)))
                .collect::<Vec<_>>();
            let mut values = Vec::with_capacity(self.size);
            values.push(local);
            for value in received {
                values.push(value?);
            }
            Ok(Some(values))
        } else {
            // An empty message fails to decode on the coordinator.
            match encode(&local) {
                Ok(bytes) => {
                    self.send(0, bytes)?;
                    Ok(None)
                }
                Err(err) => {
                    self.send(0, Vec::new())?;
                    Err(err)
                }
            }
        }
    }

    fn broadcast<T: Serialize + DeserializeOwned>(
        &self,
        value: Option<T>,
    ) -> Result<T, anyhow::Error> {
        let value = if self.is_root() {
            let encoded = encode(&value);
            let message = encoded.as_deref().unwrap_or_default();
            let sent = (1..self.size)
                .map(|destination| self.send(destination, message.to_vec()))
                .collect::<Vec<_>>();
            encoded?;
            sent.into_iter().collect::<Result<(), _>>()?;
            value
        } else {
            decode::<Option<T>>(&self.receive(0)?)?
        };
        value.ok_or_else(|| format_err!("The coordinator has nothing to broadcast."))
    }
}
