//! The ioctl-backed channel to the real trace device.

use std::{
    ffi::CString,
    io,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use ihtr_protocol::{DEVICE_DEFAULT_PATH, DEVICE_IOCTL_CODE, RequestEnvelope};

use super::TraceChannel;

/// Channel over the trace device's proc interface.
///
/// All control operations go through a single ioctl code; the device
/// dispatches on the command inside the envelope.
pub struct DeviceChannel {
    fd: libc::c_int,
    path: PathBuf,
}

impl DeviceChannel {
    /// Open the device at its default path (`/proc/libiht-info`).
    pub fn open_default() -> io::Result<Self> {
        Self::open(DEVICE_DEFAULT_PATH)
    }

    /// Open the device at `path`.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        // SAFETY: cpath is a valid nul-terminated string.
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        log::debug!("opened trace device {}", path.display());
        Ok(Self {
            fd,
            path: path.to_path_buf(),
        })
    }

    /// Path the device was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceChannel for DeviceChannel {
    type Error = io::Error;

    fn submit(&mut self, request: &RequestEnvelope) -> Result<(), Self::Error> {
        // SAFETY: request points at a live, fixed-layout envelope; the
        // device only reads it and writes through the user-space buffer
        // pointers it carries, which the session keeps alive for the
        // duration of this call.
        let res = unsafe {
            libc::ioctl(
                self.fd,
                DEVICE_IOCTL_CODE as libc::c_ulong,
                std::ptr::from_ref(request),
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for DeviceChannel {
    fn drop(&mut self) {
        // SAFETY: fd was returned by open and is closed exactly once.
        let res = unsafe { libc::close(self.fd) };
        if res < 0 {
            log::warn!(
                "failed to close trace device {}: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
    }
}
