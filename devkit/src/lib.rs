/*!
# MDT DevKit - Test doubles and helpers for mdt-netconf

Lets the orchestrator and device sessions run without real devices:
- Stateful mock NETCONF device (hello, get-config, edit-config, close-session)
- XML reply fixtures shaped like IOS-XE answers
- Console-driven test harness with captured output
*/

pub mod fixtures;
pub mod mock_device;
pub mod test_utils;

pub use fixtures::MockSubscription;
pub use mock_device::MockNetconfDevice;
pub use test_utils::{HarnessRun, TestHarness};
