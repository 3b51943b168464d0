//! Error type for broker connection attempts.
//!
//! A reconnect either finds no broker or fails at the transport.  Both
//! variants are `Copy` and only ever end up in log lines.

use core::fmt;

use crate::app::ports::MqttError;

/// Why a reconnect attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No broker answered the service-discovery query.
    BrokerNotFound,
    /// The MQTT transport failed.
    Mqtt(MqttError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrokerNotFound => write!(f, "discovery: no broker advertised"),
            Self::Mqtt(e) => write!(f, "mqtt: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<MqttError> for Error {
    fn from(e: MqttError) -> Self {
        Self::Mqtt(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
