//! System resource monitoring
//!
//! Host memory and process resident set size, read from procfs on Linux.

use serde::Serialize;

/// System resource usage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub ram_used_mb: u64,
    pub ram_total_mb: u64,
    pub process_rss_mb: u64,
}

/// Get system memory usage (best effort)
pub fn get_resource_usage() -> ResourceUsage {
    #[cfg(target_os = "linux")]
    {
        get_resource_usage_linux()
    }

    #[cfg(not(target_os = "linux"))]
    {
        ResourceUsage::default()
    }
}

#[cfg(target_os = "linux")]
fn get_resource_usage_linux() -> ResourceUsage {
    let meminfo = std::fs::read_to_string("/proc/meminfo").unwrap_or_default();
    let status = std::fs::read_to_string("/proc/self/status").unwrap_or_default();

    let total_kb = read_kb_field(&meminfo, "MemTotal:").unwrap_or(0);
    let available_kb = read_kb_field(&meminfo, "MemAvailable:").unwrap_or(total_kb);
    let rss_kb = read_kb_field(&status, "VmRSS:").unwrap_or(0);

    ResourceUsage {
        ram_used_mb: total_kb.saturating_sub(available_kb) / 1024,
        ram_total_mb: total_kb / 1024,
        process_rss_mb: rss_kb / 1024,
    }
}

/// Parse lines like "MemTotal:       16318412 kB"
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn read_kb_field(content: &str, field: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.trim_start_matches(field).split_whitespace().next())
        .and_then(|value| value.parse::<u64>().ok())
}
