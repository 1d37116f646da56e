//! Pre-flight checks run before the eBPF object is loaded

use crate::{IowatchError, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// BPF ring buffers appeared in 5.8
const MIN_KERNEL: (u32, u32) = (5, 8);

/// Validate that this system can load and run the observer's programs
pub fn run_preflight_checks() -> Result<()> {
    info!("Running pre-flight checks...");

    raise_memlock_limit();
    check_kernel_version()?;
    check_btf();
    check_capabilities();

    info!("Pre-flight checks passed");
    Ok(())
}

/// Lift RLIMIT_MEMLOCK for kernels that still charge BPF maps against it
fn raise_memlock_limit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    // SAFETY: setrlimit only reads the struct we pass by pointer
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!(
            error = %std::io::Error::last_os_error(),
            "Failed to remove limit on locked memory"
        );
    } else {
        debug!("RLIMIT_MEMLOCK raised to infinity");
    }
}

fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")?;
    let release = release.trim();

    let (major, minor) = parse_kernel_version(release).ok_or_else(|| {
        IowatchError::Config(format!("Could not parse kernel version: {}", release))
    })?;

    if (major, minor) < MIN_KERNEL {
        return Err(IowatchError::KernelVersionTooOld {
            version: release.to_string(),
            min_version: format!("{}.{}", MIN_KERNEL.0, MIN_KERNEL.1),
        });
    }

    info!("Kernel version: {} (supported)", release);
    Ok(())
}

/// Parse `major.minor` out of a release string such as `6.8.0-45-generic`
pub fn parse_kernel_version(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.trim().parse().ok()?;
    let minor_str = parts.next()?;
    let minor = minor_str
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()?;
    Some((major, minor))
}

fn check_btf() {
    if !Path::new("/sys/kernel/btf/vmlinux").exists() {
        warn!("BTF not found at /sys/kernel/btf/vmlinux");
        warn!("CO-RE relocations may fail. Consider a kernel built with CONFIG_DEBUG_INFO_BTF=y");
        return;
    }

    info!("BTF available");
}

fn check_capabilities() {
    // SAFETY: geteuid has no preconditions
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        warn!(
            "Not running as root (euid={}). Ensure CAP_BPF and CAP_PERFMON are granted.",
            euid
        );
    } else {
        info!("Running with root privileges");
    }
}
