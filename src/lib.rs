pub mod aggregator; // per-controller totals and energy
pub mod channels;
pub mod config;
pub mod coordinator; // datagram pipeline and packet stats
pub mod error;
pub mod mate3; // wire protocol and UDP listener
pub mod options;
pub mod prelude;
pub mod registry; // device state and published snapshots
pub mod scheduler;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::mate3::listener::Listener;
use crate::prelude::*;
use crate::scheduler::Scheduler;

fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .init();
}

pub async fn app() -> Result<()> {
    let options = Options::new();

    // the log level lives in the config, so read it before the logger exists
    let config = ConfigWrapper::new(options.config_file.clone());
    let loglevel = config
        .as_ref()
        .map(|config| config.loglevel())
        .unwrap_or_else(|_| "info".to_string());
    init_logger(&loglevel);

    info!("mate3-bridge {} starting", CARGO_PKG_VERSION);

    let config = config.unwrap_or_else(|err| {
        error!("Failed to load config {}: {:?}", options.config_file, err);
        std::process::exit(255);
    });
    if let Some(port) = options.port {
        config.set_port(port);
    }
    config.log_summary();

    let channels = Channels::new();
    let store = Store::new();

    let coordinator = Coordinator::new(&config, channels.clone(), store.clone());
    let stats = coordinator.stats.clone();

    let listener = Listener::new(&config, &channels, coordinator);
    let socket = listener.bind().await?;

    let scheduler = Scheduler::new(config.clone(), channels.clone(), store, stats.clone());

    let listener_handle = tokio::spawn(listener.run(socket));
    let scheduler_handle = tokio::spawn(async move { scheduler.start().await });

    match options.runtime {
        Some(secs) => {
            info!("running for {}s", secs);
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
                _ = tokio::time::sleep(std::time::Duration::from_secs(secs)) => info!("runtime limit reached"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("ctrl-c received");
        }
    }

    info!("Stopping all components...");
    let _ = channels.shutdown.send(());

    let _ = listener_handle.await??;
    scheduler_handle.await??;

    if let Ok(stats) = stats.lock() {
        stats.print_summary();
    }

    info!("Shutdown complete");
    Ok(())
}
