//! Workers running as the processes of an MPI job.

use anyhow::{self, format_err};
use mpi::topology::SystemCommunicator;
use mpi::traits::{Communicator as _, Destination, Root, Source};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::parallel::{decode, encode, Communicator};

/// A communication context for workers running as the processes of an MPI job.
///
/// The process of rank $`0`$ in the world communicator is the coordinator. The MPI environment
/// returned by [`mpi::initialize`] must be kept alive for as long as this context is used.
#[derive(Clone, Copy)]
pub struct MpiCommunicator {
    world: SystemCommunicator,
}

impl MpiCommunicator {
    /// Returns the world communicator, or `None` if MPI has not been initialised.
    #[must_use]
    pub fn world() -> Option<Self> {
        mpi::environment::is_initialized().then(|| Self {
            world: SystemCommunicator::world(),
        })
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        usize::try_from(self.world.rank()).unwrap_or_default()
    }

    fn size(&self) -> usize {
        usize::try_from(self.world.size()).unwrap_or(1)
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn gather<T: Serialize + DeserializeOwned>(
        &self,
        local: T,
    ) -> Result<Option<Vec<T>>, anyhow::Error> {
        if self.is_root() {
            let received = (1..self.world.size())
                .map(|source| {
                    let (bytes, _) = self.world.process_at_rank(source).receive_vec::<u8>();
                    decode::<T>(&bytes)
                })
                .collect::<Vec<_>>();
            let mut values = Vec::with_capacity(self.size());
            values.push(local);
            for value in received {
                values.push(value?);
            }
            Ok(Some(values))
        } else {
            let root = self.world.process_at_rank(0);
            match encode(&local) {
                Ok(bytes) => {
                    root.send(&bytes[..]);
                    Ok(None)
                }
                Err(err) => {
                    let empty: [u8; 0] = [];
                    root.send(&empty[..]);
                    Err(err)
                }
            }
        }
    }

    fn broadcast<T: Serialize + DeserializeOwned>(
        &self,
        value: Option<T>,
    ) -> Result<T, anyhow::Error> {
        let root = self.world.process_at_rank(0);
        let (mut bytes, failure) = if self.is_root() {
            match encode(&value) {
                Ok(bytes) => (bytes, None),
                Err(err) => (Vec::new(), Some(err)),
            }
        } else {
            (Vec::new(), None)
        };

        // The length goes first so that every process can size its buffer.
        let mut len = bytes.len();
        root.broadcast_into(&mut len);
        bytes.resize(len, 0);
        root.broadcast_into(&mut bytes[..]);

        if let Some(err) = failure {
            return Err(err);
        }
        let value = if self.is_root() {
            value
        } else {
            decode::<Option<T>>(&bytes)?
        };
        value.ok_or_else(|| format_err!("The coordinator has nothing to broadcast."))
    }
}
