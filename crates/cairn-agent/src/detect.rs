//! Host capability and capacity detection.

use std::collections::HashMap;
use std::path::Path;

/// Detected capability map: `os`, `arch`, and the hypervisor when one
/// is usable. These become `node_capability` facts that workload
/// constraints match against.
pub fn detect_capabilities() -> (HashMap<String, String>, Option<String>) {
    let mut capabilities = HashMap::new();
    capabilities.insert("os".to_string(), std::env::consts::OS.to_string());
    capabilities.insert("arch".to_string(), std::env::consts::ARCH.to_string());

    let hypervisor = detect_hypervisor();
    if hypervisor.is_some() {
        capabilities.insert("microvm".to_string(), "true".to_string());
    }
    (capabilities, hypervisor)
}

/// Total CPU count and physical memory in MiB.
/// Falls back to 4 cores / 8 GiB if detection fails.
pub fn detect_resources() -> (i64, i64) {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get() as i64)
        .unwrap_or(4);
    let memory_mb = detect_total_memory_mb().unwrap_or(8 * 1024);
    (cpus, memory_mb)
}

/// This host's name via POSIX gethostname, "localhost" if unavailable.
pub fn detect_hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..end])
            && !name.is_empty()
        {
            return name.to_string();
        }
    }
    "localhost".to_string()
}

fn detect_hypervisor() -> Option<String> {
    Path::new("/dev/kvm")
        .exists()
        .then(|| "kvm".to_string())
}

/// Read total physical memory via POSIX sysconf.
fn detect_total_memory_mb() -> Option<i64> {
    unsafe {
        let pages = libc::sysconf(libc::_SC_PHYS_PAGES);
        let page_size = libc::sysconf(libc::_SC_PAGE_SIZE);
        if pages > 0 && page_size > 0 {
            Some((pages as i64 * page_size as i64) / (1024 * 1024))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_always_carry_os_and_arch() {
        let (capabilities, _) = detect_capabilities();
        assert_eq!(
            capabilities.get("os").map(String::as_str),
            Some(std::env::consts::OS)
        );
        assert_eq!(
            capabilities.get("arch").map(String::as_str),
            Some(std::env::consts::ARCH)
        );
    }

    #[test]
    fn microvm_capability_follows_hypervisor() {
        let (capabilities, hypervisor) = detect_capabilities();
        assert_eq!(capabilities.contains_key("microvm"), hypervisor.is_some());
    }

    #[test]
    fn detected_resources_are_positive() {
        let (cpus, memory_mb) = detect_resources();
        assert!(cpus > 0);
        assert!(memory_mb > 0);
    }

    #[test]
    fn hostname_is_never_empty() {
        assert!(!detect_hostname().is_empty());
    }
}
