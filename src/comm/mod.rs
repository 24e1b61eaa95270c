//! Point-to-point and collective communication.
//!
//! A [`Communicator`] moves raw bytes between the members of a process group. The typed functions
//! of this module are the only entry points used by the rest of the crate: they check the
//! execution context and the buffer sizes before a single byte is sent, so that a precondition
//! violation never leaves the other ranks waiting for a message.

use crate::error::check_size;
use crate::prelude::*;
use crate::sync::SyncInfo;
use gridla_core::{as_bytes, as_bytes_mut};
use gridla_memops::{host_copy, host_fold, HostAccessor, HostMutAccessor, Reduction};
use std::fmt::Debug;

#[cfg(feature = "mpi")]
mod mpi;
mod thread;

#[cfg(feature = "mpi")]
pub use self::mpi::{MpiComm, MpiError, MpiUniverse};
pub use self::thread::{run_local, ThreadComm};

#[derive(Error, Debug, Clone)]
pub enum CommError {
    #[error("rank {rank} does not exist in a communicator of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("message of {actual} bytes does not match receive buffer of {expected} bytes")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("connection was closed")]
    Disconnected,

    #[error("communication aborted since another rank failed")]
    Aborted,

    #[cfg(feature = "mpi")]
    #[error("message of size {0} exceeds maximum message size")]
    MessageTooLarge(usize),

    #[cfg(feature = "mpi")]
    #[error("{0}")]
    Mpi(#[from] MpiError),
}

/// Process group exchanging byte buffers.
///
/// Only the point-to-point primitives and `split` must be implemented. The provided collectives
/// are built on top of them and assume that `send` returns without waiting for the matching
/// `recv`. Messages between a pair of ranks arrive in the order in which they were sent.
pub trait Communicator: Send + Sync + Debug {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send(&self, dst: usize, data: &[u8]) -> Result<(), CommError>;

    /// Receives the next message from `src`, which must have exactly the length of `data`.
    fn recv(&self, src: usize, data: &mut [u8]) -> Result<(), CommError>;

    /// Collective over all members. Members passing the same `color` end up in the same new
    /// communicator, ranked by `(key, old rank)`. Members passing `None` get `None`.
    fn split(
        &self,
        color: Option<usize>,
        key: usize,
    ) -> Result<Option<Arc<dyn Communicator>>, CommError>;

    fn check_rank(&self, rank: usize) -> Result<(), CommError> {
        if rank >= self.size() {
            return Err(CommError::InvalidRank {
                rank,
                size: self.size(),
            });
        }

        Ok(())
    }

    fn send_recv(
        &self,
        send: &[u8],
        dst: usize,
        recv: &mut [u8],
        src: usize,
    ) -> Result<(), CommError> {
        let me = self.rank();
        if dst == me && src == me {
            if send.len() != recv.len() {
                return Err(CommError::SizeMismatch {
                    expected: recv.len(),
                    actual: send.len(),
                });
            }

            recv.copy_from_slice(send);
            return Ok(());
        }

        self.send(dst, send)?;
        self.recv(src, recv)
    }

    fn broadcast(&self, data: &mut [u8], root: usize) -> Result<(), CommError> {
        self.check_rank(root)?;

        if self.rank() == root {
            for q in 0..self.size() {
                if q != root {
                    self.send(q, data)?;
                }
            }

            Ok(())
        } else {
            self.recv(root, data)
        }
    }

    /// `recv` is only used at the root and must hold `size` chunks of `send.len()` bytes.
    fn gather(&self, send: &[u8], recv: &mut [u8], root: usize) -> Result<(), CommError> {
        self.check_rank(root)?;
        let n = send.len();

        if self.rank() != root {
            return self.send(root, send);
        }

        if recv.len() != n * self.size() {
            return Err(CommError::SizeMismatch {
                expected: n * self.size(),
                actual: recv.len(),
            });
        }

        for q in 0..self.size() {
            let chunk = &mut recv[q * n..(q + 1) * n];

            if q == root {
                chunk.copy_from_slice(send);
            } else {
                self.recv(q, chunk)?;
            }
        }

        Ok(())
    }

    /// `send` is only used at the root and must hold `size` chunks of `recv.len()` bytes.
    fn scatter(&self, send: &[u8], recv: &mut [u8], root: usize) -> Result<(), CommError> {
        self.check_rank(root)?;
        let n = recv.len();

        if self.rank() != root {
            return self.recv(root, recv);
        }

        if send.len() != n * self.size() {
            return Err(CommError::SizeMismatch {
                expected: n * self.size(),
                actual: send.len(),
            });
        }

        for q in 0..self.size() {
            let chunk = &send[q * n..(q + 1) * n];

            if q == root {
                recv.copy_from_slice(chunk);
            } else {
                self.send(q, chunk)?;
            }
        }

        Ok(())
    }

    fn all_gather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), CommError> {
        let (me, size, n) = (self.rank(), self.size(), send.len());
        if recv.len() != n * size {
            return Err(CommError::SizeMismatch {
                expected: n * size,
                actual: recv.len(),
            });
        }

        for q in 0..size {
            if q != me {
                self.send(q, send)?;
            }
        }

        for q in 0..size {
            let chunk = &mut recv[q * n..(q + 1) * n];

            if q == me {
                chunk.copy_from_slice(send);
            } else {
                self.recv(q, chunk)?;
            }
        }

        Ok(())
    }

    /// Chunk `q` of `send` goes to rank `q`. Chunk `q` of `recv` comes from rank `q`.
    fn all_to_all(&self, send: &[u8], recv: &mut [u8]) -> Result<(), CommError> {
        let (me, size) = (self.rank(), self.size());
        if send.len() != recv.len() || send.len() % size != 0 {
            return Err(CommError::SizeMismatch {
                expected: send.len(),
                actual: recv.len(),
            });
        }

        let n = send.len() / size;
        for q in 0..size {
            if q != me {
                self.send(q, &send[q * n..(q + 1) * n])?;
            }
        }

        for q in 0..size {
            let chunk = &mut recv[q * n..(q + 1) * n];

            if q == me {
                chunk.copy_from_slice(&send[q * n..(q + 1) * n]);
            } else {
                self.recv(q, chunk)?;
            }
        }

        Ok(())
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.all_gather(&[], &mut [])
    }
}

fn comm_check(result: Result<(), CommError>) -> Result {
    result.map_err(|e| RuntimeError::Comm(e).into())
}

pub fn send<T: Scalar>(comm: &dyn Communicator, data: &[T], dst: usize, sync: &SyncInfo) -> Result {
    sync.check("send")?;
    comm_check(comm.send(dst, as_bytes(data)))
}

/// Receives exactly `data.len()` elements from `src`.
pub fn recv<T: Scalar>(
    comm: &dyn Communicator,
    data: &mut [T],
    src: usize,
    sync: &SyncInfo,
) -> Result {
    sync.check("recv")?;
    comm_check(comm.recv(src, as_bytes_mut(data)))
}

/// Sends `send` to `dst` and receives `recv` from `src`.
pub fn send_recv<T: Scalar>(
    comm: &dyn Communicator,
    send: &[T],
    dst: usize,
    recv: &mut [T],
    src: usize,
    sync: &SyncInfo,
) -> Result {
    sync.check("send_recv")?;
    comm_check(comm.send_recv(as_bytes(send), dst, as_bytes_mut(recv), src))
}

pub fn broadcast<T: Scalar>(
    comm: &dyn Communicator,
    data: &mut [T],
    root: usize,
    sync: &SyncInfo,
) -> Result {
    sync.check("broadcast")?;
    comm_check(comm.broadcast(as_bytes_mut(data), root))
}

/// At the root, `recv` receives `send.len()` elements from every rank in rank order. Elsewhere
/// `recv` is ignored.
pub fn gather<T: Scalar>(
    comm: &dyn Communicator,
    send: &[T],
    recv: &mut [T],
    root: usize,
    sync: &SyncInfo,
) -> Result {
    sync.check("gather")?;
    if comm.rank() == root {
        check_size("gather", send.len() * comm.size(), recv.len())?;
    }

    comm_check(comm.gather(as_bytes(send), as_bytes_mut(recv), root))
}

pub fn scatter<T: Scalar>(
    comm: &dyn Communicator,
    send: &[T],
    recv: &mut [T],
    root: usize,
    sync: &SyncInfo,
) -> Result {
    sync.check("scatter")?;
    if comm.rank() == root {
        check_size("scatter", recv.len() * comm.size(), send.len())?;
    }

    comm_check(comm.scatter(as_bytes(send), as_bytes_mut(recv), root))
}

pub fn all_gather<T: Scalar>(
    comm: &dyn Communicator,
    send: &[T],
    recv: &mut [T],
    sync: &SyncInfo,
) -> Result {
    sync.check("all_gather")?;
    check_size("all_gather", send.len() * comm.size(), recv.len())?;

    comm_check(comm.all_gather(as_bytes(send), as_bytes_mut(recv)))
}

pub fn all_to_all<T: Scalar>(
    comm: &dyn Communicator,
    send: &[T],
    recv: &mut [T],
    sync: &SyncInfo,
) -> Result {
    sync.check("all_to_all")?;
    check_size("all_to_all", send.len(), recv.len())?;
    if send.len() % comm.size() != 0 {
        bail!(RuntimeError::BufferSizeMismatch {
            context: "all_to_all",
            expected: div_ceil(send.len(), comm.size()) * comm.size(),
            actual: send.len(),
        });
    }

    comm_check(comm.all_to_all(as_bytes(send), as_bytes_mut(recv)))
}

// Folds the `chunks` contiguous chunks of `input` into `out`, in chunk order.
fn fold_chunks<T: Scalar>(input: &[T], out: &mut [T], reduction: Reduction) -> Result {
    let n = out.len();
    if n == 0 {
        return Ok(());
    }

    let mut chunks = input.chunks_exact(n);
    if let Some(first) = chunks.next() {
        host_copy(
            RayonPolicy,
            HostAccessor::column_major(first, n, 1, n),
            HostMutAccessor::column_major(out, n, 1, n),
        );
    }

    for chunk in chunks {
        host_fold(
            RayonPolicy,
            HostAccessor::column_major(chunk, n, 1, n),
            HostMutAccessor::column_major(out, n, 1, n),
            reduction,
        )?;
    }

    Ok(())
}

/// Combines `send` of all ranks into `recv` at the root. Contributions are combined in rank order.
pub fn reduce<T: Scalar>(
    comm: &dyn Communicator,
    send: &[T],
    recv: &mut [T],
    reduction: Reduction,
    root: usize,
    sync: &SyncInfo,
) -> Result {
    sync.check("reduce")?;
    let n = send.len();
    let is_root = comm.rank() == root;

    if is_root {
        check_size("reduce", n, recv.len())?;
    }

    let mut buffer = zeros::<T>(if is_root { n * comm.size() } else { 0 });
    comm_check(comm.gather(as_bytes(send), as_bytes_mut(&mut buffer), root))?;

    if is_root {
        fold_chunks(&buffer, recv, reduction)?;
    }

    Ok(())
}

/// In-place reduction over all ranks. Every rank combines the contributions in the same order,
/// so floating-point results are identical everywhere.
pub fn all_reduce<T: Scalar>(
    comm: &dyn Communicator,
    data: &mut [T],
    reduction: Reduction,
    sync: &SyncInfo,
) -> Result {
    sync.check("all_reduce")?;
    if comm.size() == 1 || data.is_empty() {
        return Ok(());
    }

    let mut buffer = zeros::<T>(data.len() * comm.size());
    comm_check(comm.all_gather(as_bytes(data), as_bytes_mut(&mut buffer)))?;
    fold_chunks(&buffer, data, reduction)
}

/// Chunk `q` of `send` (of length `recv.len()`) is combined over all ranks into `recv` of rank
/// `q`.
pub fn reduce_scatter<T: Scalar>(
    comm: &dyn Communicator,
    send: &[T],
    recv: &mut [T],
    reduction: Reduction,
    sync: &SyncInfo,
) -> Result {
    sync.check("reduce_scatter")?;
    check_size("reduce_scatter", recv.len() * comm.size(), send.len())?;

    let mut buffer = zeros::<T>(send.len());
    comm_check(comm.all_to_all(as_bytes(send), as_bytes_mut(&mut buffer)))?;
    fold_chunks(&buffer, recv, reduction)
}
