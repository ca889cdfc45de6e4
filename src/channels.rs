use crate::prelude::*;

/// A device seen for the first time since startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub key: DeviceKey,
}

#[derive(Debug, Clone)]
pub struct Channels {
    pub shutdown: broadcast::Sender<()>,
    pub discovered: broadcast::Sender<DiscoveryEvent>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            shutdown: Self::channel(),
            discovered: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
