use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// Permission bits as three octal digits, e.g. `644`.
#[cfg(unix)]
pub fn permission_bits(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:03o}", metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
pub fn permission_bits(metadata: &Metadata) -> String {
    if metadata.permissions().readonly() {
        "444".to_string()
    } else {
        "644".to_string()
    }
}

/// Modification time in whole seconds since the Unix epoch, 0 when unavailable.
pub fn modified_epoch_secs(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
