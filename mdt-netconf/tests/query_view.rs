//! get-config through a mock device, normalized into subscriptions

use mdt_devkit::{MockNetconfDevice, MockSubscription};
use mdt_netconf::menu::SessionRegistry;
use mdt_netconf::netconf::{CloseOutcome, NetconfError};
use mdt_netconf::query::{self, MDT_SUBSCRIPTION_FILTER};
use mdt_netconf::view::{self, Rendering};
use mdt_netconf::DeviceDescriptor;

fn descriptor(host: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(host, "admin", "admin")
}

#[test]
fn test_single_subscription_is_normalized_to_one_row() {
    let device = MockNetconfDevice::new("r1")
        .with_subscription(MockSubscription::new(42, "/ios:native/hostname", "10.0.0.9", 57500));
    let mut session = device.connect(&descriptor("r1")).unwrap();

    let payload = query::query(&mut session, MDT_SUBSCRIPTION_FILTER).unwrap();
    let collection = view::normalize(&payload).unwrap();

    assert_eq!(collection.len(), 1);
    let sub = collection.iter().next().unwrap();
    assert_eq!(sub.subscription_id, "42");
    assert_eq!(sub.xpath.as_deref(), Some("/ios:native/hostname"));
    assert_eq!(sub.receiver_address.as_deref(), Some("10.0.0.9"));
    assert_eq!(sub.receiver_port.as_deref(), Some("57500"));
}

#[test]
fn test_many_subscriptions_keep_device_order() {
    let device = MockNetconfDevice::new("r1")
        .with_subscription(MockSubscription::new(3, "/c", "10.0.0.3", 57500))
        .with_subscription(MockSubscription::new(1, "/a", "10.0.0.1", 57500));
    let mut session = device.connect(&descriptor("r1")).unwrap();

    let payload = query::query(&mut session, MDT_SUBSCRIPTION_FILTER).unwrap();
    let ids: Vec<_> = view::normalize(&payload)
        .unwrap()
        .iter()
        .map(|s| s.subscription_id.clone())
        .collect();
    assert_eq!(ids, vec!["3", "1"]);

    let request = device.received_matching("<get-config>").pop().unwrap();
    assert!(request.contains("<running/>"));
    assert!(request.contains("<mdt-subscription"));
}

#[test]
fn test_empty_data_renders_no_subscriptions() {
    let device = MockNetconfDevice::new("r1");
    let mut session = device.connect(&descriptor("r1")).unwrap();

    let payload = query::query(&mut session, MDT_SUBSCRIPTION_FILTER).unwrap();
    assert!(payload.is_empty());

    let collection = view::normalize(&payload).unwrap();
    assert_eq!(
        view::render(&collection, "r1"),
        Rendering::NoSubscriptions {
            device: "r1".to_string()
        }
    );
}

#[test]
fn test_reply_without_data_is_a_failed_query() {
    let device = MockNetconfDevice::new("r1").with_subscription(MockSubscription::new(1, "/a", "10.0.0.1", 57500));
    device.omit_data_on_get_config();
    let mut session = device.connect(&descriptor("r1")).unwrap();

    let err = query::query(&mut session, MDT_SUBSCRIPTION_FILTER).unwrap_err();
    assert!(matches!(err.0, NetconfError::UnexpectedReply(_)));
    assert!(err.to_string().contains("no <data>"));
}

#[test]
fn test_registry_close_all_twice_skips_closed_sessions() {
    let r1 = MockNetconfDevice::new("r1");
    let r2 = MockNetconfDevice::new("r2");
    let devices = vec![r1.clone(), r2.clone()];
    let (mut registry, failures) =
        SessionRegistry::establish(&[descriptor("r1"), descriptor("r2")], |d| {
            devices.iter().find(|m| m.host() == d.host).unwrap().connect(d)
        });
    assert!(failures.is_empty());
    assert_eq!(registry.len(), 2);

    let first = registry.close_all();
    assert_eq!((first.closed, first.skipped, first.failed), (2, 0, 0));
    let second = registry.close_all();
    assert_eq!((second.closed, second.skipped, second.failed), (0, 2, 0));

    for session in registry.sessions_mut() {
        assert_eq!(session.close().unwrap(), CloseOutcome::AlreadyClosed);
    }
    drop(registry);
    assert_eq!(r1.close_calls(), 1);
    assert_eq!(r2.close_calls(), 1);
}
