//! Communication contexts for workers cooperating on a domain-decomposed grid.
//!
//! Every worker owns a rank in $`0, \ldots, n-1`$, rank $`0`$ being the coordinator. Workers
//! share no mutable state: values handed to a collective travel between workers as `bincode`
//! messages. Every collective must be entered by all workers of the context, in the same order.

use std::ops::{Add, Range};

use anyhow::{self, format_err};
use serde::de::DeserializeOwned;
use serde::Serialize;

mod thread;

#[cfg(feature = "mpi")]
mod mpi_world;

pub use thread::ThreadCommunicator;

#[cfg(feature = "mpi")]
pub use mpi_world::MpiCommunicator;


/// Returns the contiguous block of `n` items owned by a worker.
///
/// The remainder of the division is given to the lowest ranks, one item each.
#[must_use]
pub fn load_balance(n: usize, size: usize, rank: usize) -> Range<usize> {
    let size = size.max(1);
    let base = n / size;
    let rem = n % size;
    let start = rank * base + rank.min(rem);
    let len = base + usize::from(rank < rem);
    start..(start + len).min(n)
}

/// Returns `true` unless this process is a non-coordinating process of an MPI job.
#[cfg(feature = "mpi")]
#[must_use]
pub fn is_coordinator_process() -> bool {
    MpiCommunicator::world().map_or(true, |comm| comm.is_root())
}

/// Returns `true` unless this process is a non-coordinating process of an MPI job.
#[cfg(not(feature = "mpi"))]
#[must_use]
pub fn is_coordinator_process() -> bool {
    true
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, anyhow::Error> {
    bincode::serialize(value).map_err(|err| format_err!("Unable to encode a message: {err}"))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, anyhow::Error> {
    bincode::deserialize(bytes).map_err(|err| format_err!("Unable to decode a message: {err}"))
}

// =================
// Trait definitions
// =================

/// Trait for communication contexts carrying the rank of a worker and the collectives of its
/// group.
pub trait Communicator: Clone {
    /// The rank of this worker.
    fn rank(&self) -> usize;

    /// The number of workers.
    fn size(&self) -> usize;

    /// Returns `true` if this worker is the coordinator.
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Blocks until every worker has reached this point.
    fn barrier(&self);

    /// Gathers one value from every worker onto the coordinator, in rank order.
    ///
    /// # Returns
    ///
    /// The gathered values on the coordinator, `None` elsewhere.
    ///
    /// # Errors
    ///
    /// Errors if the values cannot be exchanged.
    fn gather<T: Serialize + DeserializeOwned>(
        &self,
        local: T,
    ) -> Result<Option<Vec<T>>, anyhow::Error>;

    /// Broadcasts a value from the coordinator to every worker.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to broadcast. Only the coordinator's value is used, and it must be
    /// `Some`.
    ///
    /// # Errors
    ///
    /// Errors, on every worker, if the coordinator has no value.
    fn broadcast<T: Serialize + DeserializeOwned>(
        &self,
        value: Option<T>,
    ) -> Result<T, anyhow::Error>;

    /// Distributes contiguous blocks of the coordinator's items to the workers, following
    /// [`load_balance`].
    ///
    /// # Errors
    ///
    /// Errors if the items cannot be broadcast.
    fn scatter<T: Serialize + DeserializeOwned + Clone>(
        &self,
        items: Option<Vec<T>>,
    ) -> Result<Vec<T>, anyhow::Error> {
        self.barrier();
        let all = self.broadcast(items)?;
        let range = load_balance(all.len(), self.size(), self.rank());
        Ok(all[range].to_vec())
    }

    /// Reduces the maximum of one value per worker onto the coordinator.
    ///
    /// # Errors
    ///
    /// Errors if the values cannot be gathered.
    fn reduce_max(&self, local: f64) -> Result<Option<f64>, anyhow::Error> {
        Ok(self
            .gather(local)?
            .map(|values| values.into_iter().fold(f64::NEG_INFINITY, f64::max)))
    }

    /// Reduces the maximum of one value per worker and shares it with every worker.
    ///
    /// # Errors
    ///
    /// Errors if the values cannot be exchanged.
    fn all_reduce_max(&self, local: f64) -> Result<f64, anyhow::Error> {
        let max = self.reduce_max(local)?;
        self.broadcast(max)
    }

    /// Returns `true` on every worker if `flag` is `true` on any worker.
    ///
    /// # Errors
    ///
    /// Errors if the flags cannot be exchanged.
    fn all_reduce_any(&self, flag: bool) -> Result<bool, anyhow::Error> {
        let any = self
            .gather(flag)?
            .map(|flags| flags.into_iter().any(|f| f));
        self.broadcast(any)
    }

    /// Reduces the sum of one value per worker onto the coordinator.
    ///
    /// # Errors
    ///
    /// Errors if the values cannot be gathered.
    fn reduce_sum<T: Serialize + DeserializeOwned + Add<Output = T>>(
        &self,
        local: T,
    ) -> Result<Option<T>, anyhow::Error> {
        Ok(self
            .gather(local)?
            .and_then(|values| values.into_iter().reduce(|acc, x| acc + x)))
    }
}

// ==================
// Struct definitions
// ==================

/// A communication context for a single worker.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn gather<T: Serialize + DeserializeOwned>(
        &self,
        local: T,
    ) -> Result<Option<Vec<T>>, anyhow::Error> {
        Ok(Some(vec![local]))
    }

    fn broadcast<T: Serialize + DeserializeOwned>(
        &self,
        value: Option<T>,
    ) -> Result<T, anyhow::Error> {
        value.ok_or_else(|| format_err!("The coordinator has nothing to broadcast."))
    }
}
