//! MPI backend. Every primitive maps onto the native MPI call operating on `MPI_UINT8_T` buffers.

use super::{CommError, Communicator};
use crate::prelude::*;
use mpi_sys::*;
use std::ffi::c_void;
use std::fmt::{self, Display};
use std::mem::MaybeUninit;
use std::os::raw::c_int;
use std::ptr;

const TAG: c_int = 0;

#[derive(Debug, Clone)]
pub struct MpiError(c_int);

impl MpiError {
    fn new(code: c_int) -> Result<(), MpiError> {
        if code == MPI_SUCCESS as i32 {
            Ok(())
        } else {
            Err(Self(code))
        }
    }

    pub fn code(&self) -> c_int {
        self.0
    }

    fn message(&self) -> String {
        let mut buffer = Vec::<u8>::with_capacity(MPI_MAX_ERROR_STRING as usize);
        let mut n: c_int = 0;

        unsafe {
            if MPI_Error_string(self.0, buffer.as_mut_ptr() as *mut i8, &mut n)
                == MPI_SUCCESS as i32
            {
                buffer.set_len(n as usize);
                String::from_utf8_lossy(&buffer).into_owned()
            } else {
                format!("error code {}", self.code())
            }
        }
    }
}

impl StdError for MpiError {}

impl Display for MpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPI error: {}", self.message())
    }
}

#[inline(always)]
fn mpi_check(code: c_int) -> Result<(), CommError> {
    Ok(MpiError::new(code)?)
}

fn count(len: usize) -> Result<c_int, CommError> {
    c_int::try_from(len).map_err(|_| CommError::MessageTooLarge(len))
}

/// Initialized MPI library. MPI is finalized when the universe is dropped, so every communicator
/// must be dropped before it.
#[derive(Debug)]
pub struct MpiUniverse {
    world: Arc<dyn Communicator>,
}

impl MpiUniverse {
    pub fn initialize() -> Result<Self, CommError> {
        let required = MPI_THREAD_FUNNELED as c_int;
        let mut provided: c_int = -1;

        unsafe {
            mpi_check(MPI_Init_thread(
                &mut 0,
                &mut ptr::null_mut(),
                required,
                &mut provided,
            ))?;
        }
        trace!("MPI_Init_thread returned level {}", provided);

        let world = MpiComm::wrap(unsafe { RSMPI_COMM_WORLD }, false)?;
        debug!(
            "initialized MPI: rank {} of {}",
            world.rank(),
            world.size()
        );

        Ok(Self {
            world: Arc::new(world),
        })
    }

    pub fn world(&self) -> Arc<dyn Communicator> {
        Arc::clone(&self.world)
    }
}

impl Drop for MpiUniverse {
    fn drop(&mut self) {
        unsafe {
            MPI_Barrier(RSMPI_COMM_WORLD);
        }

        trace!("call MPI_Finalize");
        unsafe { MPI_Finalize() };
    }
}

pub struct MpiComm {
    handle: MPI_Comm,
    rank: usize,
    size: usize,
    owned: bool,
}

// MPI is initialized with at least MPI_THREAD_FUNNELED and every rank drives its communicators
// from a single thread.
unsafe impl Send for MpiComm {}
unsafe impl Sync for MpiComm {}

impl fmt::Debug for MpiComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpiComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl MpiComm {
    fn wrap(handle: MPI_Comm, owned: bool) -> Result<Self, CommError> {
        let mut rank: c_int = 0;
        let mut size: c_int = 0;
        unsafe {
            mpi_check(MPI_Comm_rank(handle, &mut rank))?;
            mpi_check(MPI_Comm_size(handle, &mut size))?;
        }

        Ok(Self {
            handle,
            rank: rank as usize,
            size: size as usize,
            owned,
        })
    }
}

impl Drop for MpiComm {
    fn drop(&mut self) {
        let mut finalized: c_int = 0;
        unsafe {
            MPI_Finalized(&mut finalized);

            if self.owned && finalized == 0 {
                MPI_Comm_free(&mut self.handle);
            }
        }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dst: usize, data: &[u8]) -> Result<(), CommError> {
        self.check_rank(dst)?;

        unsafe {
            mpi_check(MPI_Send(
                data.as_ptr() as *const c_void as *mut c_void,
                count(data.len())?,
                RSMPI_UINT8_T,
                dst as c_int,
                TAG,
                self.handle,
            ))
        }
    }

    fn recv(&self, src: usize, data: &mut [u8]) -> Result<(), CommError> {
        self.check_rank(src)?;

        let mut received: c_int = 0;
        unsafe {
            let mut status = MaybeUninit::<MPI_Status>::uninit();
            mpi_check(MPI_Recv(
                data.as_mut_ptr() as *mut c_void,
                count(data.len())?,
                RSMPI_UINT8_T,
                src as c_int,
                TAG,
                self.handle,
                status.as_mut_ptr(),
            ))?;

            let status = status.assume_init();
            mpi_check(MPI_Get_count(&status, RSMPI_UINT8_T, &mut received))?;
        }

        if received as usize != data.len() {
            return Err(CommError::SizeMismatch {
                expected: data.len(),
                actual: received as usize,
            });
        }

        Ok(())
    }

    fn split(
        &self,
        color: Option<usize>,
        key: usize,
    ) -> Result<Option<Arc<dyn Communicator>>, CommError> {
        let color = match color {
            Some(c) => c as c_int,
            None => unsafe { RSMPI_UNDEFINED },
        };

        let mut handle = MaybeUninit::<MPI_Comm>::uninit();
        let handle = unsafe {
            mpi_check(MPI_Comm_split(
                self.handle,
                color,
                key as c_int,
                handle.as_mut_ptr(),
            ))?;
            handle.assume_init()
        };

        if handle == unsafe { RSMPI_COMM_NULL } {
            return Ok(None);
        }

        Ok(Some(Arc::new(MpiComm::wrap(handle, true)?)))
    }

    fn send_recv(
        &self,
        send: &[u8],
        dst: usize,
        recv: &mut [u8],
        src: usize,
    ) -> Result<(), CommError> {
        self.check_rank(dst)?;
        self.check_rank(src)?;

        unsafe {
            mpi_check(MPI_Sendrecv(
                send.as_ptr() as *const c_void as *mut c_void,
                count(send.len())?,
                RSMPI_UINT8_T,
                dst as c_int,
                TAG,
                recv.as_mut_ptr() as *mut c_void,
                count(recv.len())?,
                RSMPI_UINT8_T,
                src as c_int,
                TAG,
                self.handle,
                RSMPI_STATUS_IGNORE,
            ))
        }
    }

    fn broadcast(&self, data: &mut [u8], root: usize) -> Result<(), CommError> {
        self.check_rank(root)?;

        unsafe {
            mpi_check(MPI_Bcast(
                data.as_mut_ptr() as *mut c_void,
                count(data.len())?,
                RSMPI_UINT8_T,
                root as c_int,
                self.handle,
            ))
        }
    }

    fn gather(&self, send: &[u8], recv: &mut [u8], root: usize) -> Result<(), CommError> {
        self.check_rank(root)?;

        unsafe {
            mpi_check(MPI_Gather(
                send.as_ptr() as *const c_void as *mut c_void,
                count(send.len())?,
                RSMPI_UINT8_T,
                recv.as_mut_ptr() as *mut c_void,
                count(send.len())?,
                RSMPI_UINT8_T,
                root as c_int,
                self.handle,
            ))
        }
    }

    fn scatter(&self, send: &[u8], recv: &mut [u8], root: usize) -> Result<(), CommError> {
        self.check_rank(root)?;

        unsafe {
            mpi_check(MPI_Scatter(
                send.as_ptr() as *const c_void as *mut c_void,
                count(recv.len())?,
                RSMPI_UINT8_T,
                recv.as_mut_ptr() as *mut c_void,
                count(recv.len())?,
                RSMPI_UINT8_T,
                root as c_int,
                self.handle,
            ))
        }
    }

    fn all_gather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), CommError> {
        unsafe {
            mpi_check(MPI_Allgather(
                send.as_ptr() as *const c_void as *mut c_void,
                count(send.len())?,
                RSMPI_UINT8_T,
                recv.as_mut_ptr() as *mut c_void,
                count(send.len())?,
                RSMPI_UINT8_T,
                self.handle,
            ))
        }
    }

    fn all_to_all(&self, send: &[u8], recv: &mut [u8]) -> Result<(), CommError> {
        let n = send.len() / self.size;

        unsafe {
            mpi_check(MPI_Alltoall(
                send.as_ptr() as *const c_void as *mut c_void,
                count(n)?,
                RSMPI_UINT8_T,
                recv.as_mut_ptr() as *mut c_void,
                count(n)?,
                RSMPI_UINT8_T,
                self.handle,
            ))
        }
    }

    fn barrier(&self) -> Result<(), CommError> {
        unsafe { mpi_check(MPI_Barrier(self.handle)) }
    }
}
