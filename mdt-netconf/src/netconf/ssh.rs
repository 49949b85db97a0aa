//! NETCONF over SSH using the `netconf` subsystem (RFC 6242)

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use ssh2::{CheckResult, KnownHostFileKind, Session};
use tracing::{debug, info};

use super::framing::Framing;
use super::{Transport, TransportError};
use crate::config::DeviceDescriptor;

const READ_CHUNK: usize = 8192;

pub struct SshTransport {
    session: Session,
    channel: ssh2::Channel,
    framing: Framing,
    buffer: Vec<u8>,
    connected: bool,
}

impl SshTransport {
    /// Open TCP, authenticate and start the `netconf` subsystem
    pub fn connect(descriptor: &DeviceDescriptor) -> Result<Self, TransportError> {
        debug!("Opening SSH connection to {}:{}", descriptor.host, descriptor.port);

        let timeout = Duration::from_secs(descriptor.timeout_secs);
        let tcp = open_tcp(&descriptor.host, descriptor.port, timeout)?;
        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        session.handshake()?;

        if descriptor.hostkey_verify {
            verify_host_key(&session, &descriptor.host, descriptor.port)?;
        } else {
            debug!("Host key verification disabled for {}", descriptor.host);
        }

        if let Err(e) = session.userauth_password(&descriptor.user, &descriptor.password) {
            debug!("Password authentication failed on {}: {}", descriptor.host, e);
            return Err(TransportError::Authentication(descriptor.user.clone()));
        }
        if !session.authenticated() {
            return Err(TransportError::Authentication(descriptor.user.clone()));
        }

        let mut channel = session.channel_session()?;
        channel.subsystem("netconf")?;
        info!("NETCONF subsystem started on {}:{}", descriptor.host, descriptor.port);

        Ok(Self {
            session,
            channel,
            framing: Framing::EndOfMessage,
            buffer: Vec::new(),
            connected: true,
        })
    }
}

impl Transport for SshTransport {
    fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Closed);
        }
        self.channel.write_all(&self.framing.encode(message))?;
        self.channel.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::Closed);
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(message) = self.framing.decode(&mut self.buffer)? {
                return Ok(message);
            }
            let read = self.channel.read(&mut chunk)?;
            if read == 0 {
                self.connected = false;
                return Err(TransportError::Closed);
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    fn upgrade(&mut self) {
        self.framing = Framing::Chunked;
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.channel.send_eof()?;
        self.channel.wait_close()?;
        self.session.disconnect(None, "session closed", None)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.channel.eof()
    }
}

/// Try every resolved address, each bounded by `timeout`
fn open_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("TCP connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{host} did not resolve")))
        .into())
}

fn known_hosts_path() -> Result<PathBuf, TransportError> {
    let mut path = dirs::home_dir()
        .ok_or_else(|| TransportError::HostKey("could not find home directory".to_string()))?;
    path.push(".ssh");
    path.push("known_hosts");
    Ok(path)
}

fn verify_host_key(session: &Session, host: &str, port: u16) -> Result<(), TransportError> {
    let (key, _) = session
        .host_key()
        .ok_or_else(|| TransportError::HostKey(format!("{host} presented no host key")))?;

    let path = known_hosts_path()?;
    let mut known_hosts = session.known_hosts()?;
    known_hosts.read_file(&path, KnownHostFileKind::OpenSSH)?;

    match known_hosts.check_port(host, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(TransportError::HostKey(format!(
            "{host} is not listed in {}",
            path.display()
        ))),
        CheckResult::Mismatch => Err(TransportError::HostKey(format!(
            "key presented by {host} does not match {}",
            path.display()
        ))),
        CheckResult::Failure => Err(TransportError::HostKey(format!(
            "could not check key for {host}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn test_open_tcp_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = open_tcp("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[test]
    fn test_open_tcp_fails_fast_on_closed_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let started = Instant::now();
        let err = open_tcp("127.0.0.1", port, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_open_tcp_is_bounded_by_timeout() {
        // 10.255.255.1 is non-routable: SYNs are dropped or rejected
        let started = Instant::now();
        let result = open_tcp("10.255.255.1", 830, Duration::from_millis(300));
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
