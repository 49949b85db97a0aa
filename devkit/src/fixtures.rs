/*!
XML fixtures for NETCONF replies

Builds the messages a device sends back: hello, `<ok/>`, `<rpc-error>` and
get-config replies carrying MDT subscriptions.
*/

use mdt_netconf::netconf::{BASE_1_0, BASE_1_1, NETCONF_NS};
use mdt_netconf::query::MDT_NAMESPACE;

/// One subscription as stored on a mock device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSubscription {
    pub id: u32,
    pub xpath: String,
    pub address: String,
    pub port: u16,
}

impl MockSubscription {
    pub fn new(id: u32, xpath: &str, address: &str, port: u16) -> Self {
        Self {
            id,
            xpath: xpath.to_string(),
            address: address.to_string(),
            port,
        }
    }

    /// `<mdt-subscription>` element as reported by get-config
    pub fn to_xml(&self) -> String {
        format!(
            "<mdt-subscription>\
                <subscription-id>{}</subscription-id>\
                <base><stream>yang-push</stream><encoding>encode-kvgpb</encoding>\
                <period>1000</period><xpath>{}</xpath></base>\
                <mdt-receivers><address>{}</address><port>{}</port>\
                <protocol>grpc-tcp</protocol></mdt-receivers>\
            </mdt-subscription>",
            self.id,
            escape_text(&self.xpath),
            escape_text(&self.address),
            self.port
        )
    }
}

/// Capabilities a typical IOS-XE device advertises
pub fn default_capabilities() -> Vec<String> {
    vec![
        BASE_1_0.to_string(),
        BASE_1_1.to_string(),
        "urn:ietf:params:netconf:capability:writable-running:1.0".to_string(),
        format!("{MDT_NAMESPACE}?module=Cisco-IOS-XE-mdt-cfg"),
    ]
}

pub fn server_hello(session_id: u32, capabilities: &[String]) -> String {
    let caps: String = capabilities
        .iter()
        .map(|c| format!("<capability>{}</capability>", escape_text(c)))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="{NETCONF_NS}"><capabilities>{caps}</capabilities><session-id>{session_id}</session-id></hello>"#
    )
}

pub fn ok_reply(message_id: &str) -> String {
    format!(r#"<rpc-reply message-id="{message_id}" xmlns="{NETCONF_NS}"><ok/></rpc-reply>"#)
}

pub fn rpc_error_reply(message_id: &str, tag: &str, message: &str) -> String {
    format!(
        r#"<rpc-reply message-id="{message_id}" xmlns="{NETCONF_NS}"><rpc-error><error-type>application</error-type><error-tag>{tag}</error-tag><error-severity>error</error-severity><error-message xml:lang="en">{message}</error-message></rpc-error></rpc-reply>"#
    )
}

/// get-config reply; an empty subscription list gives an empty `<data/>`
pub fn mdt_data_reply(message_id: &str, subscriptions: &[MockSubscription]) -> String {
    let data = if subscriptions.is_empty() {
        "<data/>".to_string()
    } else {
        let elements: String = subscriptions.iter().map(MockSubscription::to_xml).collect();
        format!(r#"<data><mdt-config-data xmlns="{MDT_NAMESPACE}">{elements}</mdt-config-data></data>"#)
    };
    format!(r#"<rpc-reply message-id="{message_id}" xmlns="{NETCONF_NS}">{data}</rpc-reply>"#)
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdt_netconf::xml;

    #[test]
    fn test_fixtures_are_well_formed() {
        let subs = vec![MockSubscription::new(1, "/a", "10.0.0.1", 57500)];
        for doc in [
            server_hello(1, &default_capabilities()),
            ok_reply("1"),
            rpc_error_reply("2", "data-missing", "gone"),
            mdt_data_reply("3", &subs),
            mdt_data_reply("4", &[]),
        ] {
            xml::parse(&doc).unwrap();
        }
    }

    #[test]
    fn test_data_reply_shape() {
        let subs = vec![
            MockSubscription::new(1, "/a", "10.0.0.1", 57500),
            MockSubscription::new(2, "/b", "10.0.0.2", 57000),
        ];
        let root = xml::parse(&mdt_data_reply("9", &subs)).unwrap();
        let config = root.find(&["data", "mdt-config-data"]).unwrap();
        assert_eq!(config.children_named("mdt-subscription").count(), 2);
    }
}
