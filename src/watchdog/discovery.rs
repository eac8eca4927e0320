//! Watchdog discovery
//!
//! A running watchdog publishes its pid under a well-known name. A revived
//! application inherits the value and uses it to recognise the watchdog
//! that spawned it instead of starting another one.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Named string values visible to the processes a side spawns
pub trait DiscoveryChannel: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn publish(&self, name: &str, value: &str);
    fn retract(&self, name: &str);
}

/// Discovery through the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvDiscovery;

impl DiscoveryChannel for EnvDiscovery {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    // The environment is only written from the single-threaded start and
    // end of the watchdog executable.
    fn publish(&self, name: &str, value: &str) {
        std::env::set_var(name, value);
    }

    fn retract(&self, name: &str) {
        std::env::remove_var(name);
    }
}

/// In-process discovery table, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiscoveryChannel for MemoryDiscovery {
    fn get(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }

    fn publish(&self, name: &str, value: &str) {
        self.values.write().insert(name.to_string(), value.to_string());
    }

    fn retract(&self, name: &str) {
        self.values.write().remove(name);
    }
}

/// Read a published pid; absent, zero and unparsable values are all "none"
pub fn published_pid(channel: &dyn DiscoveryChannel, name: &str) -> Option<u32> {
    channel
        .get(name)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|pid| *pid != 0)
}

/// Publish a pid under `name`
pub fn publish_pid(channel: &dyn DiscoveryChannel, name: &str, pid: u32) {
    channel.publish(name, &pid.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_publish_and_retract() {
        let channel = MemoryDiscovery::new();
        assert_eq!(published_pid(&channel, "WD"), None);

        publish_pid(&channel, "WD", 4242);
        assert_eq!(published_pid(&channel, "WD"), Some(4242));

        channel.retract("WD");
        assert_eq!(published_pid(&channel, "WD"), None);
    }

    #[test]
    fn test_garbage_values_are_ignored() {
        let channel = MemoryDiscovery::new();
        channel.publish("WD", "not-a-pid");
        assert_eq!(published_pid(&channel, "WD"), None);

        channel.publish("WD", "0");
        assert_eq!(published_pid(&channel, "WD"), None);

        channel.publish("WD", " 17\n");
        assert_eq!(published_pid(&channel, "WD"), Some(17));
    }

    #[test]
    fn test_env_discovery_round_trip() {
        let channel = EnvDiscovery;
        let name = "IMMORTAL_DISCOVERY_TEST_ONLY";
        publish_pid(&channel, name, 31337);
        assert_eq!(published_pid(&channel, name), Some(31337));
        channel.retract(name);
        assert_eq!(channel.get(name), None);
    }
}
