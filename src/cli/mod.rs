pub mod commands;

use crate::config::Overrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "portwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "XDP per-port TCP packet counter with idle service detection", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Attach the port counter to an interface and report traffic")]
    Watch {
        #[arg(short, long, help = "Network interface to attach to")]
        interface: Option<String>,

        #[arg(short, long, help = "JSON config file")]
        config: Option<PathBuf>,

        #[arg(long, value_name = "SECS", help = "Seconds between table polls")]
        interval: Option<u64>,

        #[arg(
            long,
            value_name = "SECS",
            help = "Seconds without traffic before a service counts as idle"
        )]
        idle_timeout: Option<u64>,

        #[arg(short, long = "port", value_name = "PORT", help = "Service port to track (repeatable)")]
        ports: Vec<u16>,

        #[arg(long, help = "Use generic (SKB) XDP mode")]
        skb_mode: bool,

        #[arg(long, value_name = "PATH", help = "Write Prometheus metrics to this file each poll")]
        metrics_file: Option<PathBuf>,
    },
    #[command(about = "Run pre-flight checks without loading anything")]
    Check,
}

impl Commands {
    /// CLI flags of `watch` as config overrides
    pub fn overrides(&self) -> Option<Overrides> {
        match self {
            Commands::Watch {
                interface,
                interval,
                idle_timeout,
                ports,
                skb_mode,
                metrics_file,
                ..
            } => Some(Overrides {
                interface: interface.clone(),
                poll_interval_secs: *interval,
                idle_timeout_secs: *idle_timeout,
                skb_mode: *skb_mode,
                metrics_file: metrics_file.clone(),
                ports: ports.clone(),
            }),
            Commands::Check => None,
        }
    }
}
