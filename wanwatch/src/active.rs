//! The currently preferred interface, published by the controller and read by
//! status queries without locking.

use arc_swap::ArcSwapOption;

use std::sync::Arc;
use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub device: String,
    /// Time of the transition that made `device` active.
    pub since: SystemTime,
}

/// Single writer, many readers. Empty until a link was confirmed live once.
#[derive(Clone, Debug, Default)]
pub struct ActiveLink(Arc<ArcSwapOption<Snapshot>>);

impl ActiveLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<Snapshot>> {
        self.0.load_full()
    }

    pub fn device(&self) -> Option<String> {
        self.load().map(|s| s.device.clone())
    }

    pub(crate) fn publish(&self, device: &str) {
        self.0.store(Some(Arc::new(Snapshot {
            device: device.to_string(),
            since: SystemTime::now(),
        })));
    }
}
