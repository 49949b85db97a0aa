//! Config writer: builds subscription payloads and pushes them with edit-config
//!
//! Add payloads come from a handlebars template with three inputs
//! (`subscription_id`, `xpath`, `receiver`). The receiver port is fixed by the
//! template; the add path never takes one.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::device::DeviceSession;
use crate::netconf::{NetconfError, RpcReply};
use crate::query::MDT_NAMESPACE;
use crate::xml::{self, XmlError};

const TEMPLATE_NAME: &str = "telemetry_config";

/// Template shipped with the tool, used when none exists in the working directory
pub const BUNDLED_TEMPLATE: &str = include_str!("../templates/telemetry_config.hbs");

/// Error tag a device reports when asked to delete configuration that is absent
const DATA_MISSING: &str = "data-missing";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read template {path}: {source}")]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid template: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("template rendering failed: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("rendered payload is not valid XML: {0}")]
    InvalidXml(#[from] XmlError),
    #[error("rendered payload root is <{0}>, expected <config>")]
    InvalidRoot(String),
    #[error("edit-config failed: {0}")]
    Edit(#[from] NetconfError),
}

#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted(RpcReply),
    NotConfigured { subscription_id: u32 },
}

#[derive(Serialize)]
struct AddContext<'a> {
    subscription_id: u32,
    xpath: &'a str,
    receiver: &'a str,
}

pub struct ConfigWriter {
    registry: Handlebars<'static>,
}

impl ConfigWriter {
    pub fn from_template(template: &str) -> Result<Self, ConfigError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(|s| quick_xml::escape::escape(s).into_owned());
        registry.register_template_string(TEMPLATE_NAME, template)?;
        Ok(Self { registry })
    }

    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_template(BUNDLED_TEMPLATE)
    }

    /// Use the template at `path` when present, the bundled one otherwise
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} not found, using bundled template", path.display());
            return Self::bundled();
        }
        let template = std::fs::read_to_string(path).map_err(|source| ConfigError::TemplateIo {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Using subscription template {}", path.display());
        Self::from_template(&template)
    }

    /// Render a new-subscription `<config>` document
    pub fn build_add_payload(
        &self,
        subscription_id: u32,
        xpath: &str,
        receiver_ip: &str,
    ) -> Result<String, ConfigError> {
        let payload = self.registry.render(
            TEMPLATE_NAME,
            &AddContext {
                subscription_id,
                xpath,
                receiver: receiver_ip,
            },
        )?;
        validate(&payload)?;
        Ok(payload)
    }
}

fn validate(payload: &str) -> Result<(), ConfigError> {
    let root = xml::parse(payload)?;
    if root.name() != "config" {
        return Err(ConfigError::InvalidRoot(root.name().to_string()));
    }
    Ok(())
}

/// `<config>` document deleting one subscription by id
pub fn build_delete_payload(subscription_id: u32) -> String {
    format!(
        r#"<config>
    <mdt-config-data xmlns="{MDT_NAMESPACE}">
        <mdt-subscription operation="delete">
            <subscription-id>{subscription_id}</subscription-id>
        </mdt-subscription>
    </mdt-config-data>
</config>"#
    )
}

/// Push a `<config>` document to the running datastore
pub fn submit(session: &mut DeviceSession, payload: &str) -> Result<RpcReply, ConfigError> {
    let reply = session.netconf().edit_config(payload)?;
    debug!("edit-config on {} answered: {}", session.label(), reply.raw());
    Ok(reply)
}

/// Delete a subscription, mapping a `data-missing` rejection to `NotConfigured`.
///
/// Transport failures and any other rejection stay errors.
pub fn delete_subscription(
    session: &mut DeviceSession,
    subscription_id: u32,
) -> Result<DeleteOutcome, ConfigError> {
    match submit(session, &build_delete_payload(subscription_id)) {
        Ok(reply) => Ok(DeleteOutcome::Deleted(reply)),
        Err(ConfigError::Edit(e)) if is_data_missing(&e) => {
            warn!(
                "subscription {} not configured on {}",
                subscription_id,
                session.label()
            );
            Ok(DeleteOutcome::NotConfigured { subscription_id })
        }
        Err(e) => Err(e),
    }
}

fn is_data_missing(error: &NetconfError) -> bool {
    let tags = error.rejection_tags();
    !tags.is_empty() && tags.iter().all(|tag| *tag == DATA_MISSING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netconf::RpcError;

    #[test]
    fn test_add_payload_places_values() {
        let writer = ConfigWriter::bundled().unwrap();
        let payload = writer.build_add_payload(7, "/a/b/c", "10.0.0.5").unwrap();

        let root = xml::parse(&payload).unwrap();
        let sub = root.find(&["mdt-config-data", "mdt-subscription"]).unwrap();
        assert_eq!(sub.child("subscription-id").unwrap().text(), "7");
        assert_eq!(sub.find(&["base", "xpath"]).unwrap().text(), "/a/b/c");
        assert_eq!(sub.find(&["mdt-receivers", "address"]).unwrap().text(), "10.0.0.5");

        // fixed by the template, not by the caller
        assert_eq!(sub.find(&["mdt-receivers", "port"]).unwrap().text(), "57500");
        assert_eq!(sub.find(&["base", "stream"]).unwrap().text(), "yang-push");
        assert!(payload.contains(MDT_NAMESPACE));
    }

    #[test]
    fn test_add_payload_escapes_xml() {
        let writer = ConfigWriter::bundled().unwrap();
        let payload = writer
            .build_add_payload(8, "/if:interfaces/interface[name=\"Gi1\"] & <x>", "10.0.0.5")
            .unwrap();
        assert!(payload.contains("&lt;x&gt;"));

        let root = xml::parse(&payload).unwrap();
        assert_eq!(
            root.find(&["mdt-config-data", "mdt-subscription", "base", "xpath"]).unwrap().text(),
            "/if:interfaces/interface[name=\"Gi1\"] & <x>"
        );
    }

    #[test]
    fn test_delete_payload_only_carries_id() {
        let payload = build_delete_payload(7);
        let root = xml::parse(&payload).unwrap();
        assert_eq!(root.name(), "config");

        let sub = root.find(&["mdt-config-data", "mdt-subscription"]).unwrap();
        assert_eq!(sub.attribute("operation"), Some("delete"));
        assert_eq!(sub.children().len(), 1);
        assert_eq!(sub.child("subscription-id").unwrap().text(), "7");
    }

    #[test]
    fn test_custom_template_must_render_config() {
        let writer = ConfigWriter::from_template("<filter>{{xpath}}</filter>").unwrap();
        assert!(matches!(
            writer.build_add_payload(1, "/x", "1.1.1.1"),
            Err(ConfigError::InvalidRoot(root)) if root == "filter"
        ));

        let strict = ConfigWriter::from_template("<config>{{missing}}</config>").unwrap();
        assert!(matches!(
            strict.build_add_payload(1, "/x", "1.1.1.1"),
            Err(ConfigError::Render(_))
        ));
    }

    #[test]
    fn test_load_falls_back_to_bundled() {
        let writer = ConfigWriter::load(Path::new("/nonexistent/telemetry_config.hbs")).unwrap();
        assert!(writer.build_add_payload(1, "/x", "1.1.1.1").is_ok());
    }

    #[test]
    fn test_data_missing_detection() {
        let missing = NetconfError::Rejected(vec![RpcError {
            tag: "data-missing".to_string(),
            ..Default::default()
        }]);
        assert!(is_data_missing(&missing));

        let invalid = NetconfError::Rejected(vec![RpcError {
            tag: "invalid-value".to_string(),
            ..Default::default()
        }]);
        assert!(!is_data_missing(&invalid));
        assert!(!is_data_missing(&NetconfError::SessionClosed));
    }
}
