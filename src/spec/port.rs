//! Port specifications for exposed container ports.

use std::fmt;
use std::str::FromStr;

use crate::error::SpecError;

/// Transport protocol of an exposed port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// TCP, the default when no protocol suffix is given.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    /// Return the engine spelling of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// A container port with its protocol, displayed as `80/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortSpec {
    port: u16,
    protocol: Protocol,
}

impl PortSpec {
    /// A TCP port.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    /// A UDP port.
    #[must_use]
    pub const fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }

    /// Return the port number.
    #[must_use]
    pub const fn port(self) -> u16 {
        self.port
    }

    /// Return the protocol.
    #[must_use]
    pub const fn protocol(self) -> Protocol {
        self.protocol
    }

    /// Parse `80`, `80/tcp`, or `53/udp`.
    ///
    /// # Errors
    ///
    /// Returns `SpecError::InvalidPort` when the value is not a number with an
    /// optional known protocol suffix, and `SpecError::PortOutOfRange` when
    /// the number lies outside `1..=65535`.
    pub fn parse(value: &str) -> Result<Self, SpecError> {
        let trimmed = value.trim();
        let (number, protocol) = match trimmed.split_once('/') {
            Some((number, suffix)) => (number, parse_protocol(suffix, value)?),
            None => (trimmed, Protocol::Tcp),
        };

        let parsed = number.parse::<u64>().map_err(|_| SpecError::InvalidPort {
            value: value.to_owned(),
        })?;

        let port = u16::try_from(parsed)
            .ok()
            .filter(|candidate| *candidate != 0)
            .ok_or(SpecError::PortOutOfRange { port: parsed })?;

        Ok(Self { port, protocol })
    }
}

fn parse_protocol(suffix: &str, original: &str) -> Result<Protocol, SpecError> {
    match suffix.to_ascii_lowercase().as_str() {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        _ => Err(SpecError::InvalidPort {
            value: original.to_owned(),
        }),
    }
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        Self::tcp(port)
    }
}

impl FromStr for PortSpec {
    type Err = SpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol.as_str())
    }
}
