use crate::prelude::*;

use std::sync::{Arc, Mutex};

/// Periodic reporting and discovery announcements for the binary.
pub struct Scheduler {
    config: ConfigWrapper,
    channels: Channels,
    store: Store,
    stats: Arc<Mutex<PacketStats>>,
}

impl Scheduler {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        store: Store,
        stats: Arc<Mutex<PacketStats>>,
    ) -> Self {
        Self {
            config,
            channels,
            store,
            stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        futures::try_join!(self.reporter(), self.announcer())?;

        Ok(())
    }

    async fn reporter(&self) -> Result<()> {
        let config = self.config.scheduler();
        if !config.enabled {
            debug!("periodic reports disabled");
            return Ok(());
        }

        let mut shutdown = self.channels.shutdown.subscribe();
        let mut interval = tokio::time::interval(config.report_interval);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => self.report()?,
            }
        }

        Ok(())
    }

    async fn announcer(&self) -> Result<()> {
        let mut shutdown = self.channels.shutdown.subscribe();
        let mut discovered = self.channels.discovered.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = discovered.recv() => match event {
                    Ok(DiscoveryEvent { key }) => {
                        info!("new {} in slot {} on controller {}", key.kind, key.slot, key.controller);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("missed {} discovery events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        Ok(())
    }

    /// Logs packet statistics and every controller's current snapshot as JSON.
    pub fn report(&self) -> Result<()> {
        if let Ok(stats) = self.stats.lock() {
            stats.print_summary();
        }

        for controller in self.store.controllers() {
            if let Some(snapshot) = self.store.snapshot(&controller) {
                info!("{}: {}", controller, serde_json::to_string(&*snapshot)?);
            }
        }

        Ok(())
    }
}
