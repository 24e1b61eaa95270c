//! Execution contexts threaded through every communication call.
//!
//! A [`SyncInfo`] names the device and the stream on which an operation is ordered. Host execution
//! is synchronous, so ordering between host contexts is immediate, but the contexts are still
//! carried around so that every primitive checks that it is invoked for a device it supports.

use crate::config::PerformanceConfig;
use crate::prelude::*;
use gridla_core::util::DropGuard;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Cpu,

    /// Accelerator device. No operation is implemented for it, every use is reported as
    /// [`LogicError::UnsupportedDevice`].
    Gpu,
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

impl Device {
    pub fn check(self, operation: &'static str) -> Result {
        match self {
            Device::Cpu => Ok(()),
            device => bail!(LogicError::UnsupportedDevice(operation, device)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(usize);

impl StreamId {
    pub const DEFAULT: StreamId = StreamId(0);

    fn fresh() -> Self {
        static NEXT_STREAM: AtomicUsize = AtomicUsize::new(1);
        StreamId(NEXT_STREAM.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncInfo {
    device: Device,
    stream: StreamId,
}

impl Default for SyncInfo {
    fn default() -> Self {
        Self::cpu()
    }
}

impl SyncInfo {
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            stream: StreamId::DEFAULT,
        }
    }

    pub fn new(device: Device, stream: StreamId) -> Self {
        Self { device, stream }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn check(&self, operation: &'static str) -> Result {
        self.device.check(operation)
    }

    /// Blocks until all work issued on this context has completed.
    pub fn synchronize(&self) -> Result {
        self.check("synchronize")
    }

    /// Orders all future work on `self` after all work issued so far on `other`.
    pub fn sync_with(&self, other: &SyncInfo) -> Result {
        self.check("sync_with")?;
        other.check("sync_with")?;

        if self.stream != other.stream {
            trace!("ordering stream {:?} after {:?}", self.stream, other.stream);
        }

        Ok(())
    }
}

/// Caller-owned, bounded pool of reusable execution contexts.
///
/// Contexts are handed out round-robin, skipping those that are still held. When every context
/// is held the next one is shared. A context is synchronized before it is handed out again, so
/// work left on it by a previous holder completes first. The pool must outlive every context
/// acquired from it.
#[derive(Debug)]
pub struct SyncPool {
    device: Device,
    slots: Vec<SyncInfo>,
    state: Mutex<PoolState>,
}

#[derive(Debug)]
struct PoolState {
    holders: Vec<usize>,
    next: usize,
}

pub type PooledSync<'a> = DropGuard<SyncInfo, Box<dyn FnOnce(SyncInfo) + 'a>>;

impl SyncPool {
    pub fn new(size: usize, device: Device) -> Result<Self> {
        device.check("SyncPool::new")?;
        let size = max(size, 1);

        debug!("creating sync pool of {} contexts on {:?}", size, device);
        Ok(Self {
            device,
            slots: (0..size)
                .map(|_| SyncInfo::new(device, StreamId::fresh()))
                .collect(),
            state: Mutex::new(PoolState {
                holders: vec![0; size],
                next: 0,
            }),
        })
    }

    /// Host pool sized by `config.sync_pool_size`.
    pub fn from_config(config: &PerformanceConfig) -> Result<Self> {
        Self::new(config.sync_pool_size, Device::Cpu)
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of contexts currently handed out.
    pub fn in_use(&self) -> usize {
        self.state.lock().holders.iter().filter(|&&n| n > 0).count()
    }

    /// Takes the next idle context in round-robin order, or shares the next one if all are held.
    /// The context returns to the pool when the guard is dropped.
    pub fn acquire(&self) -> Result<PooledSync<'_>> {
        let index = {
            let mut state = self.state.lock();
            let n = self.slots.len();
            let start = state.next;

            let index = (0..n)
                .map(|i| (start + i) % n)
                .find(|&i| state.holders[i] == 0)
                .unwrap_or(start);

            state.holders[index] += 1;
            state.next = (index + 1) % n;
            index
        };

        let guard: PooledSync<'_> = DropGuard::new(
            self.slots[index].clone(),
            Box::new(move |_| {
                self.state.lock().holders[index] -= 1;
            }),
        );

        guard.synchronize()?;
        Ok(guard)
    }

    /// Waits on every context of the pool.
    pub fn synchronize(&self) -> Result {
        for sync in &self.slots {
            sync.synchronize()?;
        }

        Ok(())
    }
}

impl Drop for SyncPool {
    fn drop(&mut self) {
        debug!("destroying sync pool of {} contexts", self.slots.len());
    }
}
