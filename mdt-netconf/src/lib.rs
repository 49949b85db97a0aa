//! MDT NETCONF - telemetry subscription manager for network devices
//!
//! Connects to every configured device over NETCONF and lets an operator:
//! - list configured model-driven telemetry subscriptions per device
//! - push a new subscription rendered from a template
//! - delete a subscription by id
//!
//! Every operation is applied to all connected devices in turn.

pub mod config;
pub mod device;
pub mod menu;
pub mod netconf;
pub mod query;
pub mod view;
pub mod writer;
pub mod xml;

pub use config::{DeviceDescriptor, DeviceProfile, Settings};
pub use device::{ConnectionError, DeviceSession};
pub use menu::{Console, Flow, MenuChoice, Orchestrator, SessionRegistry};
pub use query::{ParsedPayload, QueryError};
pub use view::{Rendering, Subscription, SubscriptionCollection};
pub use writer::{ConfigError, ConfigWriter, DeleteOutcome};
