//! Minimal NETCONF client used by the device sessions
//!
//! Handles:
//! - hello exchange and capability negotiation (base:1.0 / base:1.1)
//! - message-id bookkeeping for every rpc
//! - `<rpc-error>` decoding into typed errors
//! - get-config, edit-config and close-session on the running datastore
//!
//! Byte transport is abstracted behind [`Transport`]; the SSH implementation
//! lives in [`ssh`].

pub mod framing;
pub mod ssh;

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::DeviceProfile;
use crate::xml::{self, XmlElement, XmlError};
use framing::FramingError;

pub const NETCONF_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// Errors raised below the rpc layer
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),
    #[error("authentication rejected for user {0}")]
    Authentication(String),
    #[error("host key verification failed: {0}")]
    HostKey(String),
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("transport is closed")]
    Closed,
}

/// Byte-level channel carrying NETCONF messages
pub trait Transport: Send {
    /// Send one complete message, framed for the current mode
    fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Block until one complete message has been received
    fn receive(&mut self) -> Result<String, TransportError>;

    /// Switch to base:1.1 chunked framing after the hello exchange
    fn upgrade(&mut self);

    fn close(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// One `<rpc-error>` element reported by the device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RpcError {
    pub error_type: String,
    pub tag: String,
    pub severity: String,
    pub message: Option<String>,
    pub path: Option<String>,
}

impl RpcError {
    fn from_element(element: &XmlElement) -> Self {
        let field = |name: &str| element.child(name).map(|e| e.text().to_string());
        Self {
            error_type: field("error-type").unwrap_or_default(),
            tag: field("error-tag").unwrap_or_default(),
            severity: field("error-severity").unwrap_or_default(),
            message: field("error-message").filter(|m| !m.is_empty()),
            path: field("error-path").filter(|p| !p.is_empty()),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.tag, self.error_type, self.severity)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        Ok(())
    }
}

fn join_errors(errors: &[RpcError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum NetconfError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device rejected rpc: {}", join_errors(.0))]
    Rejected(Vec<RpcError>),
    #[error("unparseable reply: {0}")]
    Xml(#[from] XmlError),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("reply message-id {received:?} does not match request {expected}")]
    MessageIdMismatch { expected: u64, received: Option<String> },
    #[error("session is closed")]
    SessionClosed,
}

impl NetconfError {
    /// Error tags reported by the device, empty when the failure was local
    pub fn rejection_tags(&self) -> Vec<&str> {
        match self {
            NetconfError::Rejected(errors) => errors.iter().map(|e| e.tag.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Successful `<rpc-reply>`
#[derive(Debug, Clone)]
pub struct RpcReply {
    pub message_id: u64,
    pub ok: bool,
    data: Option<XmlElement>,
    raw: String,
}

impl RpcReply {
    fn from_root(root: XmlElement, raw: String, expected_id: u64) -> Result<Self, NetconfError> {
        if root.name() != "rpc-reply" {
            return Err(NetconfError::UnexpectedReply(format!(
                "expected <rpc-reply>, got <{}>",
                root.name()
            )));
        }

        let received = root.attribute("message-id");
        if received != Some(expected_id.to_string().as_str()) {
            return Err(NetconfError::MessageIdMismatch {
                expected: expected_id,
                received: received.map(str::to_string),
            });
        }

        let errors: Vec<RpcError> = root
            .children_named("rpc-error")
            .map(RpcError::from_element)
            .collect();
        if !errors.is_empty() {
            return Err(NetconfError::Rejected(errors));
        }

        Ok(Self {
            message_id: expected_id,
            ok: root.child("ok").is_some(),
            data: root.child("data").cloned(),
            raw,
        })
    }

    /// `<data>` element of a get/get-config reply
    pub fn data(&self) -> Option<&XmlElement> {
        self.data.as_ref()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
}

/// Established NETCONF session over some [`Transport`]
pub struct NetconfSession {
    transport: Box<dyn Transport>,
    session_id: Option<String>,
    server_capabilities: Vec<String>,
    next_message_id: u64,
    closed: bool,
}

impl NetconfSession {
    /// Run the hello exchange over a freshly opened transport
    pub fn establish(
        mut transport: Box<dyn Transport>,
        profile: DeviceProfile,
    ) -> Result<Self, NetconfError> {
        transport.send(&client_hello(profile))?;
        let reply = transport.receive()?;
        let hello = xml::parse(&reply)?;
        if hello.name() != "hello" {
            return Err(NetconfError::UnexpectedReply(format!(
                "expected <hello>, got <{}>",
                hello.name()
            )));
        }

        let server_capabilities: Vec<String> = hello
            .child("capabilities")
            .map(|caps| {
                caps.children_named("capability")
                    .map(|c| c.text().to_string())
                    .collect()
            })
            .unwrap_or_default();
        if server_capabilities.is_empty() {
            return Err(NetconfError::UnexpectedReply(
                "server hello advertises no capabilities".to_string(),
            ));
        }
        let session_id = hello.child("session-id").map(|s| s.text().to_string());

        if server_capabilities.iter().any(|c| c == BASE_1_1) {
            debug!("server supports base:1.1, switching to chunked framing");
            transport.upgrade();
        }

        info!(
            "NETCONF session {} established ({} server capabilities)",
            session_id.as_deref().unwrap_or("?"),
            server_capabilities.len()
        );

        Ok(Self {
            transport,
            session_id,
            server_capabilities,
            next_message_id: 1,
            closed: false,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn server_capabilities(&self) -> &[String] {
        &self.server_capabilities
    }

    pub fn is_connected(&self) -> bool {
        !self.closed && self.transport.is_connected()
    }

    /// Send one rpc body and wait for its reply
    pub fn rpc(&mut self, body: &str) -> Result<RpcReply, NetconfError> {
        if !self.is_connected() {
            return Err(NetconfError::SessionClosed);
        }

        let message_id = self.next_message_id;
        self.next_message_id += 1;

        let request = format!(r#"<rpc message-id="{message_id}" xmlns="{NETCONF_NS}">{body}</rpc>"#);
        debug!("-> {}", request);
        self.transport.send(&request)?;

        // replies to earlier rpcs that timed out may still be queued
        loop {
            let raw = self.transport.receive()?;
            debug!("<- {}", raw);
            let root = xml::parse(&raw)?;
            let stale = root
                .attribute("message-id")
                .and_then(|id| id.parse::<u64>().ok())
                .filter(|id| *id < message_id);
            if let Some(stale) = stale {
                warn!("Discarding late reply to rpc {} while waiting for {}", stale, message_id);
                continue;
            }
            return RpcReply::from_root(root, raw, message_id);
        }
    }

    /// `<get-config>` on running with an optional `<filter>` element
    pub fn get_config(&mut self, filter: Option<&str>) -> Result<RpcReply, NetconfError> {
        let body = format!(
            "<get-config><source><running/></source>{}</get-config>",
            filter.map(str::trim).unwrap_or_default()
        );
        self.rpc(&body)
    }

    /// `<edit-config>` on running carrying a complete `<config>` element
    pub fn edit_config(&mut self, config: &str) -> Result<RpcReply, NetconfError> {
        let body = format!(
            "<edit-config><target><running/></target>{}</edit-config>",
            config.trim()
        );
        self.rpc(&body)
    }

    /// Send `<close-session/>` and release the transport.
    ///
    /// The transport is closed even when the device fails to acknowledge;
    /// calling this on a closed session is a no-op.
    pub fn close(&mut self) -> Result<CloseOutcome, TransportError> {
        if self.closed || !self.transport.is_connected() {
            self.closed = true;
            return Ok(CloseOutcome::AlreadyClosed);
        }

        if let Err(e) = self.rpc("<close-session/>") {
            warn!("close-session not acknowledged: {}", e);
        }
        self.closed = true;
        self.transport.close()?;
        Ok(CloseOutcome::Closed)
    }
}

fn client_hello(profile: DeviceProfile) -> String {
    let capabilities: String = [BASE_1_0, BASE_1_1]
        .iter()
        .chain(profile.extra_capabilities())
        .map(|c| format!("<capability>{c}</capability>"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="{NETCONF_NS}"><capabilities>{capabilities}</capabilities></hello>"#
    )
}
