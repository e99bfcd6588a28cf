//! XDP program loader and lifecycle management

use crate::ebpf::maps::KernelCounters;
use crate::{PortwatchError, Result};
use aya::programs::{Xdp, XdpFlags};
use aya::Ebpf;
use aya_log::EbpfLogger;
use portwatch_common::PROGRAM_NAME;
use std::path::Path;
use tracing::{info, warn};

/// Compiled XDP object. Empty when build.rs skipped the eBPF build.
const PROBE_OBJECT: &[u8] = aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/port_counter"));

/// Oldest kernel the probe is tested against
const MIN_KERNEL: (u32, u32) = (5, 8);

/// Owns the loaded eBPF object. Dropping it detaches the program and
/// destroys the counter table.
pub struct ProbeManager {
    bpf: Ebpf,
    interface: Option<String>,
}

impl ProbeManager {
    /// Run pre-flight checks and load the XDP object into the kernel
    pub fn new() -> Result<Self> {
        run_preflight_checks()?;

        if PROBE_OBJECT.is_empty() {
            return Err(PortwatchError::ProbeNotBuilt);
        }

        info!("Loading XDP port counter...");
        let mut bpf = Ebpf::load(PROBE_OBJECT)
            .map_err(|e| PortwatchError::ProgramLoadFailed(e.to_string()))?;

        if let Err(e) = EbpfLogger::init(&mut bpf) {
            warn!(
                "Failed to initialize EbpfLogger: {}. XDP program logs will not be visible.",
                e
            );
        }

        Ok(Self {
            bpf,
            interface: None,
        })
    }

    /// Verify and attach the program to `interface`.
    ///
    /// `skb_mode` selects generic XDP, which works on any driver at a
    /// performance cost.
    pub fn attach(&mut self, interface: &str, skb_mode: bool) -> Result<()> {
        info!("Attaching {} to {}...", PROGRAM_NAME, interface);

        let attach_err = |reason: String| PortwatchError::AttachFailed {
            interface: interface.to_string(),
            reason,
        };

        let program: &mut Xdp = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| {
                PortwatchError::ProgramLoadFailed(format!(
                    "{} program not found in eBPF object",
                    PROGRAM_NAME
                ))
            })?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| {
                PortwatchError::ProgramLoadFailed(e.to_string())
            })?;

        program
            .load()
            .map_err(|e| PortwatchError::ProgramLoadFailed(e.to_string()))?;

        let flags = if skb_mode {
            XdpFlags::SKB_MODE
        } else {
            XdpFlags::default()
        };
        program.attach(interface, flags).map_err(|e| {
            attach_err(if skb_mode {
                e.to_string()
            } else {
                format!("{} (try --skb-mode)", e)
            })
        })?;

        self.interface = Some(interface.to_string());
        info!(
            "{} attached to {} ({} mode)",
            PROGRAM_NAME,
            interface,
            if skb_mode { "generic" } else { "native" }
        );
        Ok(())
    }

    /// Take ownership of the counter and statistics maps
    pub fn counters(&mut self) -> Result<KernelCounters> {
        KernelCounters::from_ebpf(&mut self.bpf)
    }

    /// Detach and unload the program
    pub fn unload(self) {
        match &self.interface {
            Some(interface) => info!("Detaching XDP program from {}...", interface),
            None => info!("Unloading XDP program..."),
        }
        drop(self.bpf);
        info!("XDP program unloaded");
    }
}

/// Validate that the system can run the XDP program
pub fn run_preflight_checks() -> Result<()> {
    info!("Running pre-flight checks...");

    check_kernel_version()?;
    check_btf();
    check_capabilities();

    info!("Pre-flight checks passed");
    Ok(())
}

fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")?;
    let release = release.trim();

    let (major, minor) = parse_kernel_version(release).ok_or_else(|| {
        PortwatchError::UnsupportedFeature(format!("could not parse kernel version {}", release))
    })?;

    if (major, minor) < MIN_KERNEL {
        return Err(PortwatchError::KernelVersionTooOld {
            version: release.to_string(),
            min_version: format!("{}.{}", MIN_KERNEL.0, MIN_KERNEL.1),
        });
    }

    info!("Kernel version: {} (supported)", release);
    Ok(())
}

/// Parse "major.minor" from a kernel release string such as "6.8.0-45-generic"
pub fn parse_kernel_version(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.trim().split(['.', '-']);
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

fn check_btf() {
    if !Path::new("/sys/kernel/btf/vmlinux").exists() {
        warn!("BTF not found at /sys/kernel/btf/vmlinux");
        warn!("Kernel log forwarding may not work. Consider a kernel with CONFIG_DEBUG_INFO_BTF=y");
        return;
    }

    info!("BTF available");
}

fn check_capabilities() {
    // SAFETY: geteuid has no preconditions
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        warn!(
            "Not running as root (euid={}). Ensure CAP_BPF and CAP_NET_ADMIN are granted.",
            euid
        );
    } else {
        info!("Running with root privileges");
    }
}
