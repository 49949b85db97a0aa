//! Config queries: filtered get-config on the running datastore

use serde_json::Value;
use tracing::debug;

use crate::device::DeviceSession;
use crate::netconf::NetconfError;

/// YANG namespace of the IOS-XE model-driven telemetry configuration
pub const MDT_NAMESPACE: &str = "http://cisco.com/ns/yang/Cisco-IOS-XE-mdt-cfg";

/// Subtree filter selecting every configured `mdt-subscription`
pub const MDT_SUBSCRIPTION_FILTER: &str = r#"<filter>
    <mdt-config-data xmlns="http://cisco.com/ns/yang/Cisco-IOS-XE-mdt-cfg">
        <mdt-subscription></mdt-subscription>
    </mdt-config-data>
</filter>"#;

#[derive(Debug, thiserror::Error)]
#[error("get-config failed: {0}")]
pub struct QueryError(#[from] pub NetconfError);

/// `<data>` content of a get-config reply as a nested mapping.
///
/// `Value::Null` means the device returned no matching configuration,
/// which is distinct from a failed query.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload(pub Value);

impl ParsedPayload {
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    /// Follow object keys from the data root
    pub fn pointer(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.0, |node, key| node.get(key))
    }
}

pub fn query(session: &mut DeviceSession, filter: &str) -> Result<ParsedPayload, QueryError> {
    let reply = session.netconf().get_config(Some(filter))?;
    // <data/> means nothing matched; no <data> at all is not a get-config answer
    let data = reply
        .data()
        .ok_or_else(|| NetconfError::UnexpectedReply("get-config reply carries no <data>".to_string()))?;
    let payload = ParsedPayload(data.to_value());
    debug!(
        "get-config on {} returned {} payload",
        session.label(),
        if payload.is_empty() { "an empty" } else { "a" }
    );
    Ok(payload)
}
