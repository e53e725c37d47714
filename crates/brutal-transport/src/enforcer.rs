use brutal_core::{EffectivePolicy, EnforceError};
use nix::errno::Errno;
use socket2::SockRef;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd};

use crate::params::{CongestionParams, BRUTAL_CONGESTION_CONTROL, TCP_BRUTAL_PARAMS};

/// The two socket options needed to put a connection under brutal.
///
/// `KernelSocket` talks to the real kernel; tests substitute a recording fake.
pub trait CongestionSocket {
    /// `setsockopt(IPPROTO_TCP, TCP_CONGESTION, name)`.
    fn select_congestion_control(&self, name: &str) -> Result<(), Errno>;

    /// `setsockopt(IPPROTO_TCP, TCP_BRUTAL_PARAMS, params)`.
    fn set_brutal_params(&self, params: &CongestionParams) -> Result<(), Errno>;
}

/// A connection's descriptor, borrowed from whoever owns the connection.
/// Never closed or retained past the borrow.
#[derive(Debug, Clone, Copy)]
pub struct KernelSocket<'fd> {
    fd: BorrowedFd<'fd>,
}

impl<'fd> KernelSocket<'fd> {
    pub fn new(fd: BorrowedFd<'fd>) -> Self {
        Self { fd }
    }

    pub fn from_socket<S: AsFd>(socket: &'fd S) -> Self {
        Self { fd: socket.as_fd() }
    }
}

impl CongestionSocket for KernelSocket<'_> {
    fn select_congestion_control(&self, name: &str) -> Result<(), Errno> {
        SockRef::from(&self.fd)
            .set_tcp_congestion(name.as_bytes())
            .map_err(|e| Errno::from_raw(e.raw_os_error().unwrap_or(0)))
    }

    fn set_brutal_params(&self, params: &CongestionParams) -> Result<(), Errno> {
        // # Safety: `params` is a live, packed 12-byte value and the length
        // passed matches its size exactly.
        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::IPPROTO_TCP,
                TCP_BRUTAL_PARAMS,
                params as *const CongestionParams as *const libc::c_void,
                std::mem::size_of::<CongestionParams>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(Errno::last());
        }
        Ok(())
    }
}

/// Outcome of a successful `enforce` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    /// Policy disabled; the socket was not touched.
    NotApplicable,
    /// Both options were set; `rate` is what the kernel was given.
    Applied { rate: u64 },
}

/// Switches `socket` to brutal at `policy.rate`, or does nothing when the
/// policy is disabled.
///
/// Selection always precedes the params call, and a failed selection ends the
/// call. Both steps are reissued on every invocation, nothing is retried.
pub fn enforce<S>(socket: &S, policy: EffectivePolicy) -> Result<Enforcement, EnforceError>
where
    S: CongestionSocket + ?Sized,
{
    if !policy.enabled {
        return Ok(Enforcement::NotApplicable);
    }

    socket
        .select_congestion_control(BRUTAL_CONGESTION_CONTROL)
        .map_err(|errno| {
            tracing::error!("tcp brutal: TCP_CONGESTION failed: {}", errno);
            EnforceError::CongestionSelection { errno }
        })?;

    let params = CongestionParams::new(policy.rate);
    socket.set_brutal_params(&params).map_err(|errno| {
        tracing::error!("tcp brutal: TCP_BRUTAL_PARAMS failed: {}", errno);
        EnforceError::CongestionParams { errno }
    })?;

    Ok(Enforcement::Applied { rate: policy.rate })
}
