//! Process-wide transport registry.
//!
//! Initialized once on first use: a statically known list of transport
//! constructors is walked and every system that reports itself available is
//! inserted. Queries hand out shared references by key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, info};

use crate::io::network::NetworkSystem;
use crate::io::serial::SerialSystem;
use crate::io::test_sensor::TestSensorSystem;
use crate::io::TransportSystem;

pub struct TransportRegistry {
    systems: Mutex<HashMap<&'static str, Arc<dyn TransportSystem>>>,
}

impl TransportRegistry {
    fn new() -> Self {
        Self {
            systems: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts a system under its key. Returns false if the key was taken.
    pub fn register(&self, system: Arc<dyn TransportSystem>) -> bool {
        let mut guard = self.systems.lock().unwrap();
        match guard.entry(system.key()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                info!(key = system.key(), "registered transport system");
                slot.insert(system);
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn TransportSystem>> {
        self.systems.lock().unwrap().get(key).cloned()
    }

    /// All registered systems, for the discovery loop.
    pub fn systems(&self) -> Vec<Arc<dyn TransportSystem>> {
        self.systems.lock().unwrap().values().cloned().collect()
    }
}

fn builtin_systems() -> Vec<Arc<dyn TransportSystem>> {
    vec![
        Arc::new(SerialSystem::new()),
        Arc::new(NetworkSystem::new()),
        Arc::new(TestSensorSystem::new()),
    ]
}

/// The process-wide registry, built on first access.
pub fn registry() -> &'static TransportRegistry {
    static REGISTRY: OnceLock<TransportRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = TransportRegistry::new();
        for system in builtin_systems() {
            if system.available() {
                registry.register(system);
            } else {
                debug!(key = system.key(), "transport system unavailable, skipped");
            }
        }
        registry
    })
}
