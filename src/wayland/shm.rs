//! Shared-memory pixel buffers.
//!
//! One anonymous memory file per buffer, mapped into our address space and
//! handed to the compositor through a short-lived pool. The pool and the file
//! descriptor are released right after the `wl_buffer` exists; the mapping
//! lives as long as the buffer.

use super::SessionState;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;
use thiserror::Error;
use wayland_client::protocol::{wl_buffer, wl_shm};
use wayland_client::QueueHandle;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("invalid buffer size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("could not create shared memory file: {0}")]
    Create(io::Error),

    #[error("could not resize shared memory file: {0}")]
    Resize(io::Error),

    #[error("could not map shared memory: {0}")]
    Map(io::Error),
}

pub struct ShmBuffer {
    buffer: wl_buffer::WlBuffer,
    map: NonNull<u32>,
    width: u32,
    height: u32,
    /// Committed and not yet released by the compositor
    busy: bool,
}

impl ShmBuffer {
    pub fn new(
        shm: &wl_shm::WlShm,
        format: wl_shm::Format,
        width: u32,
        height: u32,
        output_id: u32,
        qh: &QueueHandle<SessionState>,
    ) -> Result<Self, BufferError> {
        let stride = width.checked_mul(4);
        let size = stride.and_then(|s| s.checked_mul(height));
        let (Some(stride), Some(size)) = (stride, size) else {
            return Err(BufferError::InvalidSize { width, height });
        };
        if size == 0 || size > i32::MAX as u32 {
            return Err(BufferError::InvalidSize { width, height });
        }

        let name = CString::new(format!("gaybar-out-{}", output_id))
            .map_err(|e| BufferError::Create(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let raw = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
        if raw < 0 {
            return Err(BufferError::Create(io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        if unsafe { libc::ftruncate(raw, size as libc::off_t) } < 0 {
            return Err(BufferError::Resize(io::Error::last_os_error()));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                raw,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(BufferError::Map(io::Error::last_os_error()));
        }
        let map = NonNull::new(ptr as *mut u32).ok_or_else(|| BufferError::Map(io::Error::last_os_error()))?;

        let pool = shm.create_pool(fd.as_fd(), size as i32, qh, ());
        let buffer = pool.create_buffer(
            0,
            width as i32,
            height as i32,
            stride as i32,
            format,
            qh,
            output_id,
        );
        pool.destroy();

        log::trace!("allocated {}x{} shm buffer for output {}", width, height, output_id);
        Ok(Self {
            buffer,
            map,
            width,
            height,
            busy: false,
        })
    }

    pub fn wl_buffer(&self) -> &wl_buffer::WlBuffer {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        unsafe { std::slice::from_raw_parts_mut(self.map.as_ptr(), self.len()) }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
        unsafe {
            libc::munmap(self.map.as_ptr() as *mut libc::c_void, self.len() * 4);
        }
    }
}
