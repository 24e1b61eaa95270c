//! In-process communicator: every rank is a thread and every message is a heap buffer sent
//! through a crossbeam channel.

use super::{CommError, Communicator};
use crate::prelude::*;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use gridla_core::util::DropGuard;
use std::fmt;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const WORLD_CONTEXT: u64 = 0;

struct Envelope {
    context: u64,
    source: usize,
    payload: Vec<u8>,
}

struct Mailbox {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,

    // Messages that arrived before their matching `recv`.
    pending: Mutex<Vec<Envelope>>,
}

struct Universe {
    mailboxes: Vec<Mailbox>,
    aborted: AtomicBool,
}

impl Universe {
    fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            warn!("aborting local universe of {} ranks", self.mailboxes.len());
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

pub struct ThreadComm {
    universe: Arc<Universe>,
    context: u64,

    // World rank of every member, indexed by rank in this communicator.
    members: Vec<usize>,
    rank: usize,
    splits: AtomicU64,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("context", &self.context)
            .field("rank", &self.rank)
            .field("members", &self.members)
            .finish()
    }
}

impl ThreadComm {
    /// Creates the world communicators of a universe of `n` ranks, one per rank.
    pub fn universe(n: usize) -> Vec<ThreadComm> {
        let mailboxes = (0..n)
            .map(|_| {
                let (sender, receiver) = channel::unbounded();
                Mailbox {
                    sender,
                    receiver,
                    pending: default(),
                }
            })
            .collect();

        let universe = Arc::new(Universe {
            mailboxes,
            aborted: AtomicBool::new(false),
        });

        (0..n)
            .map(|rank| ThreadComm {
                universe: Arc::clone(&universe),
                context: WORLD_CONTEXT,
                members: (0..n).collect(),
                rank,
                splits: AtomicU64::new(0),
            })
            .collect()
    }

    /// Marks the universe as failed. Blocked and future operations of every rank return
    /// [`CommError::Aborted`].
    pub fn abort(&self) {
        self.universe.abort();
    }

    fn world_rank(&self) -> usize {
        self.members[self.rank]
    }

    fn take_pending(&self, mailbox: &Mailbox, source: usize) -> Option<Envelope> {
        let mut pending = mailbox.pending.lock();
        let index = pending
            .iter()
            .position(|e| e.context == self.context && e.source == source)?;

        Some(pending.remove(index))
    }

    fn receive_envelope(&self, source: usize) -> Result<Envelope, CommError> {
        let mailbox = &self.universe.mailboxes[self.world_rank()];

        loop {
            if let Some(envelope) = self.take_pending(mailbox, source) {
                return Ok(envelope);
            }

            match mailbox.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(envelope) => {
                    if envelope.context == self.context && envelope.source == source {
                        return Ok(envelope);
                    }

                    mailbox.pending.lock().push(envelope);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.universe.is_aborted() {
                        return Err(CommError::Aborted);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CommError::Disconnected),
            }
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn send(&self, dst: usize, data: &[u8]) -> Result<(), CommError> {
        self.check_rank(dst)?;
        if self.universe.is_aborted() {
            return Err(CommError::Aborted);
        }

        let envelope = Envelope {
            context: self.context,
            source: self.world_rank(),
            payload: data.to_vec(),
        };

        self.universe.mailboxes[self.members[dst]]
            .sender
            .send(envelope)
            .map_err(|_| CommError::Disconnected)
    }

    fn recv(&self, src: usize, data: &mut [u8]) -> Result<(), CommError> {
        self.check_rank(src)?;
        let envelope = self.receive_envelope(self.members[src])?;

        if envelope.payload.len() != data.len() {
            return Err(CommError::SizeMismatch {
                expected: data.len(),
                actual: envelope.payload.len(),
            });
        }

        data.copy_from_slice(&envelope.payload);
        Ok(())
    }

    fn split(
        &self,
        color: Option<usize>,
        key: usize,
    ) -> Result<Option<Arc<dyn Communicator>>, CommError> {
        const ENTRY: usize = 16;
        let encoded_color = color.map_or(u64::MAX, |c| c as u64);

        let mut entry = [0u8; ENTRY];
        entry[..8].copy_from_slice(&encoded_color.to_le_bytes());
        entry[8..].copy_from_slice(&(key as u64).to_le_bytes());

        let mut entries = vec![0u8; ENTRY * self.size()];
        self.all_gather(&entry, &mut entries)?;

        // Every member performs the same sequence of splits, so the sequence numbers agree.
        let seq = self.splits.fetch_add(1, Ordering::Relaxed);
        let color = match color {
            Some(c) => c as u64,
            None => return Ok(None),
        };

        let decode = |bytes: &[u8]| {
            let mut word = [0u8; 8];
            word.copy_from_slice(bytes);
            u64::from_le_bytes(word)
        };

        let mut group = entries
            .chunks_exact(ENTRY)
            .enumerate()
            .filter(|(_, e)| decode(&e[..8]) == color)
            .map(|(parent_rank, e)| (decode(&e[8..]), parent_rank))
            .collect_vec();
        group.sort_unstable();

        let rank = group
            .iter()
            .position(|&(_, parent_rank)| parent_rank == self.rank)
            .ok_or(CommError::Disconnected)?;

        let context = fxhash::hash64(&(self.context, seq, color));
        trace!(
            "split context {} into context {} with {} members",
            self.context,
            context,
            group.len()
        );

        Ok(Some(Arc::new(ThreadComm {
            universe: Arc::clone(&self.universe),
            context,
            members: group.iter().map(|&(_, q)| self.members[q]).collect(),
            rank,
            splits: AtomicU64::new(0),
        })))
    }
}

fn is_abort(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::Comm(CommError::Aborted))
    ) || matches!(e.downcast_ref::<CommError>(), Some(CommError::Aborted))
}

/// Runs the SPMD program `f` on `n` ranks, each on its own thread, and returns the results in rank
/// order.
///
/// A rank that fails or panics aborts the universe, so the remaining ranks return instead of
/// waiting forever. The first error that is not a consequence of the abort is returned, and a
/// panic is propagated to the caller.
pub fn run_local<F, R>(n: usize, f: F) -> Result<Vec<R>>
where
    F: Fn(Arc<dyn Communicator>) -> Result<R> + Sync,
    R: Send,
{
    let f = &f;

    let outcome = crossbeam::thread::scope(|s| {
        let handles = ThreadComm::universe(n)
            .into_iter()
            .map(|comm| {
                s.spawn(move |_| {
                    let universe = Arc::clone(&comm.universe);
                    let _guard = DropGuard::new((), |_| {
                        if thread::panicking() {
                            universe.abort();
                        }
                    });

                    let result = f(Arc::new(comm));
                    if result.is_err() {
                        universe.abort();
                    }

                    result
                })
            })
            .collect_vec();

        handles.into_iter().map(|h| h.join()).collect_vec()
    });

    let joined = match outcome {
        Ok(joined) => joined,
        Err(payload) => panic::resume_unwind(payload),
    };

    let mut results = Vec::with_capacity(n);
    let mut errors = vec![];
    for outcome in joined {
        match outcome {
            Ok(Ok(value)) => results.push(value),
            Ok(Err(e)) => errors.push(e),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    if errors.is_empty() {
        return Ok(results);
    }

    let index = errors.iter().position(|e| !is_abort(e)).unwrap_or(0);
    Err(errors.swap_remove(index))
}
