//! MQTT topic derivation.
//!
//! The four topics are computed once at boot from the configured prefix
//! and never recomputed.  Derivation is a pure function of the prefix, so
//! deriving twice yields identical strings with exactly one prefix each.

use core::fmt::Write;

pub type TopicString = heapless::String<80>;

const PING_SUFFIX: &str = "ping";
const PONG_SUFFIX: &str = "pong";
const ALIVE_SUFFIX: &str = "alive";
const INFO_SUFFIX: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Subscribed; any message triggers a pong.
    pub ping: TopicString,
    /// Reply to a ping.
    pub pong: TopicString,
    /// Periodic heartbeat with the uptime.
    pub alive: TopicString,
    /// Reason for the previous reboot, once per boot.
    pub info: TopicString,
}

impl TopicSet {
    pub fn derive(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            ping: join(prefix, PING_SUFFIX),
            pong: join(prefix, PONG_SUFFIX),
            alive: join(prefix, ALIVE_SUFFIX),
            info: join(prefix, INFO_SUFFIX),
        }
    }

    /// Topics in the order shown on the status page.
    pub fn all(&self) -> [&str; 4] {
        [
            self.ping.as_str(),
            self.info.as_str(),
            self.pong.as_str(),
            self.alive.as_str(),
        ]
    }
}

fn join(prefix: &str, suffix: &str) -> TopicString {
    let mut topic = TopicString::new();
    if write!(topic, "{prefix}/{suffix}").is_err() {
        log::warn!("topics: '{}/{}' truncated to {} bytes", prefix, suffix, topic.capacity());
    }
    topic
}
