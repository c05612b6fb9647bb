//! System probes and small helpers shared across the service.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use chrono::Utc;

/// Free space in bytes available to unprivileged writers on the filesystem
/// holding `path`.
pub fn free_bytes(path: &Path) -> io::Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

/// Whether the given network interface reports an active link.
///
/// Reads `/sys/class/net/<iface>/operstate`; a missing interface counts as
/// link-down.
pub fn link_up(iface: &str) -> bool {
    let path = format!("/sys/class/net/{iface}/operstate");
    match std::fs::read_to_string(path) {
        Ok(state) => state.trim() == "up",
        Err(_) => false,
    }
}

/// Millisecond-resolution UTC timestamp for artifact filenames; sorts
/// chronologically and is collision-resistant at the rates we write files.
pub fn timestamp_name() -> String {
    Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string()
}
