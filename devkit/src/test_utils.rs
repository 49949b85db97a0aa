/*!
Test harness driving the interactive orchestrator

Wires mock devices into `Orchestrator`, feeds scripted console input and
captures everything printed, so a test reads like an operator session.
*/

use anyhow::Result;
use std::io;

use mdt_netconf::menu::CloseReport;
use mdt_netconf::netconf::TransportError;
use mdt_netconf::{
    Console, ConfigWriter, ConnectionError, DeviceDescriptor, DeviceProfile, Orchestrator,
};

use crate::mock_device::MockNetconfDevice;

/// Harness over a set of mock devices
pub struct TestHarness {
    devices: Vec<MockNetconfDevice>,
    input: String,
}

/// Captured result of one console session
#[derive(Debug)]
pub struct HarnessRun {
    pub output: String,
    pub report: CloseReport,
}

/// Title and body row count of one rendered table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTable {
    pub title: String,
    pub rows: usize,
}

impl TestHarness {
    pub fn new() -> Self {
        env_logger::builder().is_test(true).try_init().ok();

        Self {
            devices: Vec::new(),
            input: String::new(),
        }
    }

    pub fn with_device(mut self, device: MockNetconfDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Console lines, one answer per prompt
    pub fn with_input(mut self, lines: &[&str]) -> Self {
        for line in lines {
            self.input.push_str(line);
            self.input.push('\n');
        }
        self
    }

    /// Descriptors as they would come from devices.yaml
    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.devices
            .iter()
            .map(|d| DeviceDescriptor::new(d.host(), "admin", "admin").with_profile(DeviceProfile::Iosxe))
            .collect()
    }

    pub fn device(&self, host: &str) -> Option<&MockNetconfDevice> {
        self.devices.iter().find(|d| d.host() == host)
    }

    /// Run the full menu loop until input runs out or Exit is chosen
    pub fn run(&self) -> Result<HarnessRun> {
        let descriptors = self.descriptors();
        let devices = self.devices.clone();
        let connect = move |descriptor: &DeviceDescriptor| {
            let device = devices
                .iter()
                .find(|d| d.host() == descriptor.host)
                .ok_or_else(|| {
                    ConnectionError::new(
                        descriptor,
                        TransportError::Io(io::Error::new(io::ErrorKind::NotFound, "no such mock device")),
                    )
                })?;
            device.connect(descriptor)
        };

        let mut output = Vec::new();
        let console = Console::new(self.input.as_bytes(), &mut output);
        let mut orchestrator = Orchestrator::start(&descriptors, connect, ConfigWriter::bundled()?, console)?;
        let report = orchestrator.run()?;
        drop(orchestrator);

        let output = String::from_utf8(output)?;
        log::info!("🧪 Harness run finished: {:?}", report);
        Ok(HarnessRun { output, report })
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessRun {
    /// Tables found in the output, in print order
    pub fn tables(&self) -> Vec<RenderedTable> {
        let mut tables = Vec::new();
        let mut current: Option<RenderedTable> = None;

        for line in self.output.lines() {
            if let Some(pos) = line.find("Configured Telemetry Subscriptions ") {
                current = Some(RenderedTable {
                    title: line[pos..].trim().to_string(),
                    rows: 0,
                });
            } else if let Some(table) = current.as_mut() {
                if line.starts_with('│') {
                    table.rows += 1;
                } else if line.starts_with('└') {
                    tables.extend(current.take());
                }
            }
        }
        tables
    }

    pub fn count(&self, needle: &str) -> usize {
        self.output.matches(needle).count()
    }
}
