use crate::activity::{ActivityTracker, Transition};
use crate::cli::Commands;
use crate::config::{Config, FileConfig, Overrides, WatchedConfig};
use crate::metrics::{Poll, PortCollector, PrometheusExporter};
use crate::table::CounterSource;
use crate::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

pub async fn handle_command(command: Commands) -> Result<()> {
    let overrides = command.overrides().unwrap_or_default();

    match command {
        Commands::Watch { config, .. } => {
            let mut watched = config.map(WatchedConfig::new);
            let file = match watched.as_mut() {
                Some(watched) => watched.load()?,
                None => FileConfig::default(),
            };
            handle_watch(file, watched, overrides).await
        }
        Commands::Check => handle_check(),
    }
}

#[cfg(target_os = "linux")]
async fn handle_watch(
    file: FileConfig,
    watched: Option<WatchedConfig>,
    overrides: Overrides,
) -> Result<()> {
    use crate::ebpf::ProbeManager;
    use tokio::signal;

    let config = Config::resolve(file, overrides.clone())?;
    info!(
        "Watching {} every {}s (idle after {}s, {} tracked services)",
        config.interface,
        config.poll_interval.as_secs(),
        config.idle_timeout.as_secs(),
        config.services.len()
    );

    let mut manager = ProbeManager::new()?;
    manager.attach(&config.interface, config.skb_mode)?;
    let counters = manager.counters()?;

    let mut ticker = tokio::time::interval(config.poll_interval);
    let mut watcher = Watcher::new(config)?;
    if let Some(watched) = watched {
        info!("Reloading {} when it changes", watched.path().display());
        watcher = watcher.with_reload(watched, overrides);
    }

    info!("portwatch running. Press Ctrl+C to exit.");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = watcher.tick(&counters, Instant::now()) {
                    warn!("Poll failed: {}", e);
                }
            }
        }
    }

    drop(counters);
    manager.unload();

    info!("portwatch stopped");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn handle_watch(
    file: FileConfig,
    _watched: Option<WatchedConfig>,
    overrides: Overrides,
) -> Result<()> {
    let config = Config::resolve(file, overrides)?;
    Err(crate::PortwatchError::UnsupportedFeature(format!(
        "attaching XDP to {} requires Linux",
        config.interface
    )))
}

#[cfg(target_os = "linux")]
fn handle_check() -> Result<()> {
    crate::ebpf::run_preflight_checks()?;
    println!("System can run the portwatch XDP program");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn handle_check() -> Result<()> {
    Err(crate::PortwatchError::UnsupportedFeature(
        "XDP requires Linux".to_string(),
    ))
}

struct ConfigReload {
    file: WatchedConfig,
    overrides: Overrides,
}

/// Everything done on one poll tick, independent of where counts come from
pub struct Watcher {
    collector: PortCollector,
    exporter: PrometheusExporter,
    tracker: ActivityTracker,
    config: Config,
    reload: Option<ConfigReload>,
}

impl Watcher {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            collector: PortCollector::new(),
            exporter: PrometheusExporter::new()?,
            tracker: ActivityTracker::new(&config.services, config.idle_timeout, Instant::now()),
            config,
            reload: None,
        })
    }

    /// Re-read `file` before each poll once its modification time changes
    pub fn with_reload(mut self, file: WatchedConfig, overrides: Overrides) -> Self {
        self.reload = Some(ConfigReload { file, overrides });
        self
    }

    /// Apply a changed config file. Services, idle timeouts and the metrics
    /// file take effect immediately; the attachment itself is left alone.
    fn reload_config(&mut self, now: Instant) {
        let Some(reload) = self.reload.as_mut() else {
            return;
        };

        let file = match reload.file.reload_if_changed() {
            Ok(Some(file)) => file,
            Ok(None) => return,
            Err(e) => {
                warn!("Keeping previous config: {}", e);
                return;
            }
        };
        let config = match Config::resolve(file, reload.overrides.clone()) {
            Ok(config) => config,
            Err(e) => {
                warn!("Keeping previous config: {}", e);
                return;
            }
        };

        if config.interface != self.config.interface
            || config.poll_interval != self.config.poll_interval
            || config.skb_mode != self.config.skb_mode
        {
            warn!("Attachment and poll interval changes take effect after a restart");
        }

        self.tracker
            .update_services(&config.services, config.idle_timeout, now);
        info!(
            "Reloaded {} ({} tracked services)",
            reload.file.path().display(),
            self.tracker.len()
        );

        self.config = Config {
            interface: std::mem::take(&mut self.config.interface),
            poll_interval: self.config.poll_interval,
            skb_mode: self.config.skb_mode,
            ..config
        };
    }

    pub fn tick<S: CounterSource + ?Sized>(
        &mut self,
        source: &S,
        now: Instant,
    ) -> Result<Vec<Transition>> {
        self.reload_config(now);

        let poll = self.collector.poll(source)?;
        log_poll(&poll);

        self.exporter.observe(&poll);
        if let Some(path) = &self.config.metrics_file {
            write_metrics(&self.exporter, path);
        }

        let transitions = self.tracker.observe(&poll, now);
        for transition in &transitions {
            match transition {
                Transition::Woke { port, name } => {
                    info!("Service {} (port {}) is active again", name, port)
                }
                Transition::WentIdle {
                    port,
                    name,
                    idle_for,
                } => info!(
                    "Service {} (port {}) idle for {}s",
                    name,
                    port,
                    idle_for.as_secs()
                ),
            }
        }

        Ok(transitions)
    }
}

fn log_poll(poll: &Poll) {
    for delta in &poll.deltas {
        debug!(
            "port {}: +{} packets ({} total)",
            delta.port, delta.delta, delta.total
        );
    }

    let dropped = poll.stat_delta(portwatch_common::Stat::TableFull);
    if dropped > 0 {
        warn!(
            "Port table full: {} packets not counted ({} ports tracked)",
            dropped, poll.tracked_ports
        );
    }
}

fn write_metrics(exporter: &PrometheusExporter, path: &Path) {
    if let Err(e) = exporter.write_to(path) {
        warn!("Failed to write metrics to {}: {}", path.display(), e);
    }
}
