/*!
Mock NETCONF device for tests without real hardware

Implements `Transport` and answers like an IOS-XE box: hello exchange,
get-config over its stored MDT subscriptions, edit-config that adds or
deletes them, close-session. Deleting an unknown id answers `data-missing`.
Clones share state, so a test keeps a handle while the session owns a copy.
*/

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use mdt_netconf::netconf::{Transport, TransportError, BASE_1_0};
use mdt_netconf::xml::{self, XmlElement};
use mdt_netconf::{ConnectionError, DeviceDescriptor, DeviceSession};

use crate::fixtures::{self, MockSubscription};

/// Port used for receivers when an edit does not carry one
const DEFAULT_RECEIVER_PORT: u16 = 57500;

struct DeviceState {
    host: String,
    session_id: u32,
    capabilities: Vec<String>,
    subscriptions: Vec<MockSubscription>,
    outbox: VecDeque<String>,
    received: Vec<String>,
    reachable: bool,
    connected: bool,
    upgraded: bool,
    close_calls: usize,
    get_config_error: Option<(String, String)>,
    omit_data: bool,
    next_edit_error: Option<(String, String)>,
    drop_on_next_rpc: bool,
}

#[derive(Clone)]
pub struct MockNetconfDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockNetconfDevice {
    pub fn new(host: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                host: host.to_string(),
                session_id: 100,
                capabilities: fixtures::default_capabilities(),
                subscriptions: Vec::new(),
                outbox: VecDeque::new(),
                received: Vec::new(),
                reachable: true,
                connected: true,
                upgraded: false,
                close_calls: 0,
                get_config_error: None,
                omit_data: false,
                next_edit_error: None,
                drop_on_next_rpc: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        // a panicking test must not poison the other assertions
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_subscription(self, subscription: MockSubscription) -> Self {
        self.state().subscriptions.push(subscription);
        self
    }

    /// Only advertise base:1.0, keeping end-of-message framing
    pub fn base_1_0_only(self) -> Self {
        self.state().capabilities = vec![BASE_1_0.to_string()];
        self
    }

    /// Refuse TCP connections
    pub fn unreachable(self) -> Self {
        self.state().reachable = false;
        self
    }

    /// Answer every get-config with the given rpc-error
    pub fn fail_get_config(&self, tag: &str, message: &str) {
        self.state().get_config_error = Some((tag.to_string(), message.to_string()));
    }

    /// Answer get-config with a bare `<ok/>` instead of `<data>`
    pub fn omit_data_on_get_config(&self) {
        self.state().omit_data = true;
    }

    /// Answer the next edit-config with the given rpc-error
    pub fn reject_next_edit(&self, tag: &str, message: &str) {
        self.state().next_edit_error = Some((tag.to_string(), message.to_string()));
    }

    /// Drop the connection when the next rpc arrives
    pub fn drop_connection_on_next_rpc(&self) {
        self.state().drop_on_next_rpc = true;
    }

    pub fn host(&self) -> String {
        self.state().host.clone()
    }

    pub fn subscriptions(&self) -> Vec<MockSubscription> {
        self.state().subscriptions.clone()
    }

    /// Every message the client sent, hello included
    pub fn received(&self) -> Vec<String> {
        self.state().received.clone()
    }

    /// Received messages containing `needle`
    pub fn received_matching(&self, needle: &str) -> Vec<String> {
        self.received().into_iter().filter(|m| m.contains(needle)).collect()
    }

    pub fn is_upgraded(&self) -> bool {
        self.state().upgraded
    }

    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }

    /// Build a `DeviceSession` over this mock, as `DeviceSession::connect` would
    pub fn connect(&self, descriptor: &DeviceDescriptor) -> Result<DeviceSession, ConnectionError> {
        if !self.state().reachable {
            return Err(ConnectionError::new(
                descriptor,
                TransportError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")),
            ));
        }
        DeviceSession::with_transport(descriptor.clone(), Box::new(self.clone()))
    }
}

impl DeviceState {
    fn handle(&mut self, message: &str) -> Result<(), TransportError> {
        let root = xml::parse(message)
            .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;

        match root.name() {
            "hello" => {
                let hello = fixtures::server_hello(self.session_id, &self.capabilities);
                self.outbox.push_back(hello);
            }
            "rpc" => {
                if self.drop_on_next_rpc {
                    self.drop_on_next_rpc = false;
                    self.connected = false;
                    return Err(TransportError::Closed);
                }
                let message_id = root.attribute("message-id").unwrap_or("").to_string();
                let reply = self.handle_rpc(&message_id, &root);
                self.outbox.push_back(reply);
            }
            other => log::warn!("🤷 [MOCK {}] ignoring <{}>", self.host, other),
        }
        Ok(())
    }

    fn handle_rpc(&mut self, message_id: &str, rpc: &XmlElement) -> String {
        let Some(operation) = rpc.children().first() else {
            return fixtures::rpc_error_reply(message_id, "missing-element", "empty rpc");
        };

        match operation.name() {
            "get-config" => match &self.get_config_error {
                Some((tag, msg)) => fixtures::rpc_error_reply(message_id, tag, msg),
                None if self.omit_data => fixtures::ok_reply(message_id),
                None => fixtures::mdt_data_reply(message_id, &self.subscriptions),
            },
            "edit-config" => {
                if let Some((tag, msg)) = self.next_edit_error.take() {
                    return fixtures::rpc_error_reply(message_id, &tag, &msg);
                }
                match self.apply_edit(operation) {
                    Ok(()) => fixtures::ok_reply(message_id),
                    Err((tag, msg)) => fixtures::rpc_error_reply(message_id, tag, &msg),
                }
            }
            "close-session" => fixtures::ok_reply(message_id),
            other => fixtures::rpc_error_reply(
                message_id,
                "operation-not-supported",
                &format!("{other} is not supported"),
            ),
        }
    }

    fn apply_edit(&mut self, edit: &XmlElement) -> Result<(), (&'static str, String)> {
        let Some(config) = edit.find(&["config", "mdt-config-data"]) else {
            return Err(("missing-element", "no mdt-config-data in edit".to_string()));
        };

        for sub in config.children_named("mdt-subscription") {
            let id: u32 = sub
                .child("subscription-id")
                .and_then(|e| e.text().parse().ok())
                .ok_or(("invalid-value", "subscription-id must be an integer".to_string()))?;

            if sub.attribute("operation") == Some("delete") {
                let before = self.subscriptions.len();
                self.subscriptions.retain(|s| s.id != id);
                if self.subscriptions.len() == before {
                    return Err(("data-missing", format!("subscription {id} does not exist")));
                }
                log::info!("🗑️  [MOCK {}] deleted subscription {}", self.host, id);
                continue;
            }

            let text = |path: &[&str]| sub.find(path).map(|e| e.text().to_string()).unwrap_or_default();
            let port = sub
                .find(&["mdt-receivers", "port"])
                .and_then(|e| e.text().parse().ok())
                .unwrap_or(DEFAULT_RECEIVER_PORT);
            let subscription = MockSubscription {
                id,
                xpath: text(&["base", "xpath"]),
                address: text(&["mdt-receivers", "address"]),
                port,
            };

            match self.subscriptions.iter_mut().find(|s| s.id == id) {
                Some(existing) => *existing = subscription,
                None => self.subscriptions.push(subscription),
            }
            log::info!("📥 [MOCK {}] stored subscription {}", self.host, id);
        }
        Ok(())
    }
}

impl Transport for MockNetconfDevice {
    fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::Closed);
        }
        state.received.push(message.to_string());
        state.handle(message)
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::Closed);
        }
        state.outbox.pop_front().ok_or(TransportError::Closed)
    }

    fn upgrade(&mut self) {
        self.state().upgraded = true;
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.close_calls += 1;
        state.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdt_netconf::netconf::CloseOutcome;
    use mdt_netconf::writer;

    fn descriptor(host: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(host, "admin", "admin")
    }

    #[test]
    fn test_session_over_mock_upgrades_framing() {
        let device = MockNetconfDevice::new("r1");
        let session = device.connect(&descriptor("r1")).unwrap();

        assert!(session.is_connected());
        assert!(device.is_upgraded());
        assert_eq!(device.received_matching("<hello").len(), 1);
    }

    #[test]
    fn test_base_1_0_device_is_not_upgraded() {
        let device = MockNetconfDevice::new("r1").base_1_0_only();
        device.connect(&descriptor("r1")).unwrap();
        assert!(!device.is_upgraded());
    }

    #[test]
    fn test_unreachable_device() {
        let device = MockNetconfDevice::new("r9").unreachable();
        let err = device.connect(&descriptor("r9")).err().unwrap();
        assert_eq!(err.host, "r9");
        assert_eq!(err.port, 830);
        assert!(device.received().is_empty());
    }

    #[test]
    fn test_edits_change_stored_subscriptions() {
        let device = MockNetconfDevice::new("r1");
        let mut session = device.connect(&descriptor("r1")).unwrap();

        let payload = writer::ConfigWriter::bundled()
            .unwrap()
            .build_add_payload(11, "/ios:native/hostname", "10.9.9.9")
            .unwrap();
        writer::submit(&mut session, &payload).unwrap();
        assert_eq!(
            device.subscriptions(),
            vec![MockSubscription::new(11, "/ios:native/hostname", "10.9.9.9", 57500)]
        );

        let outcome = writer::delete_subscription(&mut session, 11).unwrap();
        assert!(matches!(outcome, writer::DeleteOutcome::Deleted(_)));
        assert!(device.subscriptions().is_empty());

        let outcome = writer::delete_subscription(&mut session, 11).unwrap();
        assert!(matches!(
            outcome,
            writer::DeleteOutcome::NotConfigured { subscription_id: 11 }
        ));
    }

    #[test]
    fn test_close_is_counted_once() {
        let device = MockNetconfDevice::new("r1");
        let mut session = device.connect(&descriptor("r1")).unwrap();

        assert_eq!(session.close().unwrap(), CloseOutcome::Closed);
        assert_eq!(session.close().unwrap(), CloseOutcome::AlreadyClosed);
        assert_eq!(device.close_calls(), 1);
        assert_eq!(device.received_matching("<close-session/>").len(), 1);
    }
}
