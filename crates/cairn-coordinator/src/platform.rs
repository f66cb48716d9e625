//! Platform capability checks for workload kinds.

use std::path::Path;

use cairn_store::WorkloadKind;

/// Can this coordinator's platform run a given workload kind?
///
/// Checked before a deploy creates any record.
pub trait PlatformCapabilities: Send + Sync {
    fn supports(&self, kind: WorkloadKind) -> bool;
}

/// The real host: processes always work, microvms need KVM.
pub struct HostPlatform;

impl PlatformCapabilities for HostPlatform {
    fn supports(&self, kind: WorkloadKind) -> bool {
        match kind {
            WorkloadKind::Process => true,
            WorkloadKind::Microvm => Path::new("/dev/kvm").exists(),
        }
    }
}

/// Fixed answers, for wiring tests and non-Linux development hosts.
pub struct StaticPlatform {
    pub process: bool,
    pub microvm: bool,
}

impl PlatformCapabilities for StaticPlatform {
    fn supports(&self, kind: WorkloadKind) -> bool {
        match kind {
            WorkloadKind::Process => self.process,
            WorkloadKind::Microvm => self.microvm,
        }
    }
}
