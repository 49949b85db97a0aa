//! Device sessions: one NETCONF session per configured device

use tracing::info;

use crate::config::DeviceDescriptor;
use crate::netconf::ssh::SshTransport;
use crate::netconf::{CloseOutcome, NetconfError, NetconfSession, Transport, TransportError};

/// Failure to bring up a session (unreachable, auth, protocol mismatch)
#[derive(Debug, thiserror::Error)]
#[error("cannot connect to {host}:{port}: {source}")]
pub struct ConnectionError {
    pub host: String,
    pub port: u16,
    #[source]
    pub source: NetconfError,
}

impl ConnectionError {
    pub fn new(descriptor: &DeviceDescriptor, source: impl Into<NetconfError>) -> Self {
        Self {
            host: descriptor.host.clone(),
            port: descriptor.port,
            source: source.into(),
        }
    }
}

/// Open session to a single device, owning its transport exclusively
pub struct DeviceSession {
    descriptor: DeviceDescriptor,
    netconf: NetconfSession,
}

impl DeviceSession {
    /// Connect over SSH and run the NETCONF hello exchange
    pub fn connect(descriptor: &DeviceDescriptor) -> Result<Self, ConnectionError> {
        let transport = SshTransport::connect(descriptor)
            .map_err(|e| ConnectionError::new(descriptor, e))?;
        Self::with_transport(descriptor.clone(), Box::new(transport))
    }

    /// Establish the session over an already opened transport
    pub fn with_transport(
        descriptor: DeviceDescriptor,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ConnectionError> {
        let netconf = NetconfSession::establish(transport, descriptor.device_type)
            .map_err(|e| ConnectionError::new(&descriptor, e))?;
        info!("Connected to {}:{}", descriptor.host, descriptor.port);
        Ok(Self { descriptor, netconf })
    }

    /// Label used in tables and status lines
    pub fn label(&self) -> &str {
        &self.descriptor.host
    }

    pub fn netconf(&mut self) -> &mut NetconfSession {
        &mut self.netconf
    }

    pub fn is_connected(&self) -> bool {
        self.netconf.is_connected()
    }

    /// Release the transport; a second call reports `AlreadyClosed`
    pub fn close(&mut self) -> Result<CloseOutcome, TransportError> {
        let outcome = self.netconf.close()?;
        if outcome == CloseOutcome::Closed {
            info!("Closed session to {}", self.descriptor.host);
        }
        Ok(outcome)
    }
}
