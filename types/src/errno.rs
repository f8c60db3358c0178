use std::borrow::Cow;
use std::io::{self, ErrorKind};

/// Node-style symbolic code for an I/O error, e.g. `ECONNREFUSED`.
///
/// Kinds without a conventional errno name fall back to the upper-cased
/// `ErrorKind` debug name.
#[must_use]
pub fn error_code(err: &io::Error) -> Cow<'static, str> {
    let code = match err.kind() {
        ErrorKind::NotFound => "ENOENT",
        ErrorKind::PermissionDenied => "EACCES",
        ErrorKind::ConnectionRefused => "ECONNREFUSED",
        ErrorKind::ConnectionReset => "ECONNRESET",
        ErrorKind::ConnectionAborted => "ECONNABORTED",
        ErrorKind::HostUnreachable => "EHOSTUNREACH",
        ErrorKind::NetworkUnreachable => "ENETUNREACH",
        ErrorKind::NotConnected => "ENOTCONN",
        ErrorKind::AddrInUse => "EADDRINUSE",
        ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        ErrorKind::BrokenPipe => "EPIPE",
        ErrorKind::AlreadyExists => "EEXIST",
        ErrorKind::WouldBlock => "EAGAIN",
        ErrorKind::InvalidInput => "EINVAL",
        ErrorKind::TimedOut => "ETIMEDOUT",
        ErrorKind::Interrupted => "EINTR",
        ErrorKind::Unsupported => "ENOTSUP",
        other => return Cow::Owned(format!("{other:?}").to_ascii_uppercase()),
    };
    Cow::Borrowed(code)
}
