//! Local hostname lookup for log file names

/// Name used when the hostname cannot be determined
pub const FALLBACK_HOSTNAME: &str = "localhost";

/// Hostname of this machine, or [`FALLBACK_HOSTNAME`] if the lookup fails
pub fn local_hostname() -> String {
    match lookup_hostname() {
        Some(name) => name,
        None => {
            tracing::warn!(
                "Could not determine hostname, using '{}' in log file names",
                FALLBACK_HOSTNAME
            );
            FALLBACK_HOSTNAME.to_string()
        }
    }
}

#[cfg(unix)]
fn lookup_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname writes at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    sanitize(&String::from_utf8_lossy(&buf[..len]))
}

#[cfg(not(unix))]
fn lookup_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .ok()
        .and_then(|name| sanitize(&name))
}

/// Drop anything that would break the file name layout
fn sanitize(raw: &str) -> Option<String> {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
