use anyhow::{anyhow, Context};
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

const PROBE_PACKAGE: &str = "portwatch-probes";
const PROBE_BINARY: &str = "port_counter";

fn main() -> anyhow::Result<()> {
    println!("cargo:rerun-if-env-changed=PORTWATCH_SKIP_EBPF");

    // Skip eBPF build if we're already building for the eBPF target
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default() == "bpf" {
        return Ok(());
    }

    let out_dir = env::var("OUT_DIR")?;
    let probe_path = Path::new(&out_dir).join(PROBE_BINARY);

    if let Some(reason) = skip_reason() {
        println!("cargo:warning=eBPF compilation skipped: {}", reason);
        // The loader refuses an empty object with ProbeNotBuilt
        if !probe_path.exists() {
            fs::write(&probe_path, b"").context("failed to write placeholder probe object")?;
        }
        return Ok(());
    }

    let aya_build::cargo_metadata::Metadata { packages, .. } =
        aya_build::cargo_metadata::MetadataCommand::new()
            .no_deps()
            .exec()
            .context("MetadataCommand::exec")?;

    let ebpf_package = packages
        .into_iter()
        .find(|pkg| pkg.name == PROBE_PACKAGE)
        .ok_or_else(|| anyhow!("{} package not found", PROBE_PACKAGE))?;

    aya_build::build_ebpf([ebpf_package])?;

    if !probe_path.exists() {
        return Err(anyhow!(
            "eBPF probe compilation failed: {} not found",
            probe_path.display()
        ));
    }

    Ok(())
}

fn skip_reason() -> Option<String> {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" {
        return Some(format!("{} does not support XDP", target_os));
    }

    if env::var("PORTWATCH_SKIP_EBPF").is_ok() {
        return Some("PORTWATCH_SKIP_EBPF is set".to_string());
    }

    // No bpf-linker in CI images unless a dedicated eBPF job installs it
    let has_linker = Command::new("bpf-linker")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !has_linker {
        return Some("bpf-linker not found in PATH".to_string());
    }

    None
}
