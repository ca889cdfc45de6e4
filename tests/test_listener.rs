mod common;
use common::*;
use mate3_bridge::mate3::listener::Listener;
use mate3_bridge::prelude::*;

use std::time::Duration;
use tokio::net::UdpSocket;

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn datagrams_reach_the_store_and_stop_ends_the_loop() -> Result<()> {
    common_setup();
    let config = Factory::config();
    let channels = Channels::new();
    let store = Store::new();
    let mut discovered = channels.discovered.subscribe();

    let coordinator = Coordinator::new(&config, channels.clone(), store.clone());
    let listener = Listener::new(&config, &channels, coordinator);

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let address = socket.local_addr()?;
    let handle = tokio::spawn(listener.run(socket));

    let sender = UdpSocket::bind("127.0.0.1:0").await?;
    sender.send_to(b"garbage", address).await?;
    sender
        .send_to(
            &Factory::datagram(&[Factory::charge_controller(4, (12, 5), (8, 140), 123, 2, 528)]),
            address,
        )
        .await?;

    let id = Factory::controller();
    assert!(wait_for(|| store.snapshot(&id).is_some()).await);
    assert_eq!(
        store.reading(&id, DeviceKind::ChargeController, 1, "battery_voltage"),
        Some(FieldValue::Number(52.8))
    );

    let event = tokio::time::timeout(Duration::from_secs(1), discovered.recv()).await??;
    assert_eq!(event.key, DeviceKey::new(id.clone(), DeviceKind::ChargeController, 1));

    channels.shutdown.send(())?;
    let coordinator = tokio::time::timeout(Duration::from_secs(2), handle).await???;

    let stats = coordinator.stats.lock().unwrap().clone();
    assert_eq!(stats.datagrams_received, 2);
    assert_eq!(stats.frame_errors, 1);
    assert_eq!(stats.devices_discovered, 1);
    assert_eq!(coordinator.registry().len(), 1);

    Ok(())
}

#[tokio::test]
async fn stop_before_any_traffic() -> Result<()> {
    common_setup();
    let config = Factory::config();
    let channels = Channels::new();
    let coordinator = Coordinator::new(&config, channels.clone(), Store::new());
    let listener = Listener::new(&config, &channels, coordinator);

    // sent before the loop starts, still honoured
    channels.shutdown.send(())?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let coordinator = tokio::time::timeout(Duration::from_secs(2), listener.run(socket)).await??;
    assert!(coordinator.registry().is_empty());

    Ok(())
}

#[tokio::test]
async fn bind_failure_is_reported() -> Result<()> {
    common_setup();
    let taken = std::net::UdpSocket::bind("127.0.0.1:0")?;
    let port = taken.local_addr()?.port();

    let mut config = Config::default();
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = port;
    let config = ConfigWrapper::from_config(config);
    let channels = Channels::new();
    let coordinator = Coordinator::new(&config, channels.clone(), Store::new());
    let listener = Listener::new(&config, &channels, coordinator);

    let err = listener.bind().await.unwrap_err();
    assert!(err.to_string().contains("failed to bind"));

    Ok(())
}
