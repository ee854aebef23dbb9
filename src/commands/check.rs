//! Check command implementation.
//!
//! Validates system requirements and configuration before deploying the
//! exporter: /proc readability, measurement sources, the topology file, and
//! the effective config.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::collector;
use crate::config::{validate_effective_config, Config, DEFAULT_TOPOLOGY_PATH};
use crate::topology::Topology;

/// Validates system requirements and configuration.
pub fn command_check(proc: bool, topology: bool, all: bool, config: &Config) -> Result<()> {
    println!("🔍 proc-attrib-exporter - System Check");
    println!("======================================");

    let mut all_ok = true;

    // Check /proc filesystem and measurement sources
    if proc || all {
        println!("\n📁 Checking /proc filesystem...");
        if Path::new("/proc").exists() {
            println!("   ✅ /proc filesystem accessible");

            let test_pid = std::process::id();
            let test_path = Path::new("/proc").join(test_pid.to_string());

            match collector::read_cumulative_cpu(&test_path) {
                Ok(cpu) => {
                    println!(
                        "   ✅ CPU time readable (self: {:.2}s at {} ticks/s)",
                        cpu.as_secs_f64(),
                        collector::clock_ticks_per_second()
                    );
                }
                Err(e) => {
                    println!("   ❌ CPU time not readable: {}", e);
                    all_ok = false;
                }
            }

            if test_path.join("smaps_rollup").exists() {
                println!("   ✅ smaps_rollup available (fast path)");
            } else {
                println!("   ⚠️  smaps_rollup unavailable, falling back to statm");
            }

            match collector::read_private_footprint_kb(&test_path) {
                Ok(kb) => {
                    println!("   ✅ private footprint readable (self: {} KB)", kb);
                }
                Err(e) => {
                    println!("   ❌ private footprint not readable: {}", e);
                    all_ok = false;
                }
            }
        } else {
            println!("   ❌ /proc filesystem not found");
            all_ok = false;
        }
    }

    // Check topology file
    if topology || all {
        println!("\n🗺️  Checking topology...");
        let path = config
            .topology
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOPOLOGY_PATH));
        match Topology::load(&path) {
            Ok(topology) => {
                let frames: usize = topology.pages.iter().map(|p| p.frames.len()).sum();
                println!(
                    "   ✅ {} loaded: {} processes, {} pages, {} frames",
                    path.display(),
                    topology.processes.len(),
                    topology.pages.len(),
                    frames
                );
            }
            Err(e) => {
                println!("   ❌ Topology invalid: {:#}", e);
                all_ok = false;
            }
        }
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
