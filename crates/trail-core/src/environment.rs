//! Environment capture for audit events

use crate::event::AuditEventEnvironment;
use std::panic::Location;
use std::sync::OnceLock;

struct HostInfo {
    machine_name: Option<String>,
    process_name: Option<String>,
    process_id: u32,
}

static HOST_INFO: OnceLock<HostInfo> = OnceLock::new();

fn host_info() -> &'static HostInfo {
    HOST_INFO.get_or_init(|| HostInfo {
        machine_name: hostname::get()
            .ok()
            .map(|h: std::ffi::OsString| h.to_string_lossy().to_string()),
        process_name: std::env::current_exe().ok().and_then(|p| {
            p.file_name()
                .map(|name| name.to_string_lossy().to_string())
        }),
        process_id: std::process::id(),
    })
}

fn user_name() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}

/// Capture the environment block for a scope opened at `location`
pub fn capture(location: &Location<'_>) -> AuditEventEnvironment {
    let host = host_info();
    AuditEventEnvironment {
        machine_name: host.machine_name.clone(),
        user_name: user_name(),
        process_name: host.process_name.clone(),
        process_id: Some(host.process_id),
        calling_location: Some(format!(
            "{}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        )),
        exception: None,
    }
}
