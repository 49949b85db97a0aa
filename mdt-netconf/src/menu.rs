//! Interactive menu driving every configured device
//!
//! Sessions are opened once, before the first menu is shown, and kept in a
//! [`SessionRegistry`]. Each menu choice is applied to all connected devices
//! in turn; a failure on one device is reported and the loop moves on.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::DeviceDescriptor;
use crate::device::{ConnectionError, DeviceSession};
use crate::netconf::CloseOutcome;
use crate::query::{self, MDT_SUBSCRIPTION_FILTER};
use crate::view;
use crate::writer::{self, ConfigWriter, DeleteOutcome};

const MENU: &str = "\
Select an Option Below
1 - Get Current Subscriptions
2 - Configure New Subscription
3 - Delete Subscription
4 - Exit
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    ShowSubscriptions,
    AddSubscription,
    DeleteSubscription,
    Exit,
}

impl FromStr for MenuChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(MenuChoice::ShowSubscriptions),
            "2" => Ok(MenuChoice::AddSubscription),
            "3" => Ok(MenuChoice::DeleteSubscription),
            "4" => Ok(MenuChoice::Exit),
            other => Err(format!("'{other}' is not a menu option")),
        }
    }
}

/// What the loop does after a choice has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Line-oriented console over any reader/writer pair
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, line: impl AsRef<str>) -> Result<()> {
        writeln!(self.output, "{}", line.as_ref())?;
        Ok(())
    }

    /// Print a prompt and read one trimmed line; `None` at end of input
    pub fn prompt(&mut self, prompt: &str) -> Result<Option<String>> {
        writeln!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut input = String::new();
        if self.input.read_line(&mut input).context("Failed to read console input")? == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }

    /// Prompt until the answer parses; `None` at end of input
    pub fn prompt_parse<T>(&mut self, prompt: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        loop {
            let Some(input) = self.prompt(prompt)? else {
                return Ok(None);
            };
            match input.parse::<T>() {
                Ok(value) => return Ok(Some(value)),
                Err(e) => self.say(format!("❌ Invalid input: {e}. Please try again."))?,
            }
        }
    }
}

/// Result of closing every session at exit
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Sessions opened at startup, one per reachable device
pub struct SessionRegistry {
    sessions: Vec<DeviceSession>,
}

impl SessionRegistry {
    pub fn new(sessions: Vec<DeviceSession>) -> Self {
        Self { sessions }
    }

    /// Connect to every descriptor once; failures are returned, not retried
    pub fn establish<F>(descriptors: &[DeviceDescriptor], mut connect: F) -> (Self, Vec<ConnectionError>)
    where
        F: FnMut(&DeviceDescriptor) -> Result<DeviceSession, ConnectionError>,
    {
        let mut sessions = Vec::with_capacity(descriptors.len());
        let mut failures = Vec::new();
        for descriptor in descriptors {
            match connect(descriptor) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!("{}", e);
                    failures.push(e);
                }
            }
        }
        (Self { sessions }, failures)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut DeviceSession> {
        self.sessions.iter_mut()
    }

    /// Close every session still open; safe to call more than once
    pub fn close_all(&mut self) -> CloseReport {
        let mut report = CloseReport::default();
        for session in &mut self.sessions {
            match session.close() {
                Ok(CloseOutcome::Closed) => report.closed += 1,
                Ok(CloseOutcome::AlreadyClosed) => report.skipped += 1,
                Err(e) => {
                    warn!("Failed to close session to {}: {}", session.label(), e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

pub struct Orchestrator<R, W> {
    registry: SessionRegistry,
    writer: ConfigWriter,
    console: Console<R, W>,
}

impl<R: BufRead, W: Write> Orchestrator<R, W> {
    /// Open a session to every device, reporting each outcome on the console
    pub fn start<F>(
        descriptors: &[DeviceDescriptor],
        connect: F,
        writer: ConfigWriter,
        mut console: Console<R, W>,
    ) -> Result<Self>
    where
        F: FnMut(&DeviceDescriptor) -> Result<DeviceSession, ConnectionError>,
    {
        console.say(format!("🔌 Connecting to {} device(s)...", descriptors.len()))?;
        let (registry, failures) = SessionRegistry::establish(descriptors, connect);
        for failure in &failures {
            console.say(format!("❌ {failure}"))?;
        }
        for session in &registry.sessions {
            console.say(format!("✅ Connected to {}", session.label()))?;
        }

        Ok(Self {
            registry,
            writer,
            console,
        })
    }

    /// Menu loop; sessions are closed on every way out
    pub fn run(&mut self) -> Result<CloseReport> {
        let result = self.menu_loop();
        let report = self.shutdown();
        result?;
        report
    }

    fn menu_loop(&mut self) -> Result<()> {
        if self.registry.is_empty() {
            self.console.say("❌ No device could be reached, nothing to manage.")?;
            return Ok(());
        }

        loop {
            let Some(choice) = self.console.prompt_parse::<MenuChoice>(MENU)? else {
                info!("Console input closed, exiting");
                return Ok(());
            };
            if self.handle(choice)? == Flow::Exit {
                return Ok(());
            }
        }
    }

    /// Dispatch one menu choice
    pub fn handle(&mut self, choice: MenuChoice) -> Result<Flow> {
        match choice {
            MenuChoice::ShowSubscriptions => {
                self.show_subscriptions()?;
                Ok(Flow::Continue)
            }
            MenuChoice::AddSubscription => {
                let Some(subscription_id) = self.console.prompt_parse::<u32>("Enter Subscription Number:")? else {
                    return Ok(Flow::Exit);
                };
                let Some(xpath) = self.console.prompt("Enter Subscription xpath:")? else {
                    return Ok(Flow::Exit);
                };
                let Some(receiver) = self.console.prompt("Enter Destination Receiver IP Address:")? else {
                    return Ok(Flow::Exit);
                };
                self.add_subscription(subscription_id, &xpath, &receiver)?;
                Ok(Flow::Continue)
            }
            MenuChoice::DeleteSubscription => {
                let Some(subscription_id) = self.console.prompt_parse::<u32>("Enter Subscription Number:")? else {
                    return Ok(Flow::Exit);
                };
                self.delete_subscription(subscription_id)?;
                Ok(Flow::Continue)
            }
            MenuChoice::Exit => Ok(Flow::Exit),
        }
    }

    /// One table (or "no subscriptions" line) per device
    pub fn show_subscriptions(&mut self) -> Result<()> {
        for session in self.registry.sessions.iter_mut() {
            let label = session.label().to_string();
            let collection = query::query(session, MDT_SUBSCRIPTION_FILTER)
                .map_err(anyhow::Error::from)
                .and_then(|payload| view::normalize(&payload).map_err(anyhow::Error::from));

            match collection {
                Ok(collection) => {
                    let rendering = view::render(&collection, &label);
                    match rendering {
                        view::Rendering::Table(table) => self.console.say(table)?,
                        empty => self.console.say(format!("❌ {empty}"))?,
                    }
                }
                Err(e) => {
                    warn!("Query failed on {}: {}", label, e);
                    self.console.say(format!("❌ {label}: {e}"))?;
                }
            }
        }
        Ok(())
    }

    /// Push the same new subscription to every device
    pub fn add_subscription(&mut self, subscription_id: u32, xpath: &str, receiver: &str) -> Result<()> {
        // the payload is identical for every device
        let payload = match self.writer.build_add_payload(subscription_id, xpath, receiver) {
            Ok(payload) => payload,
            Err(e) => {
                self.console.say(format!("❌ Cannot build subscription {subscription_id}: {e}"))?;
                return Ok(());
            }
        };

        for session in self.registry.sessions.iter_mut() {
            let label = session.label().to_string();
            match writer::submit(session, &payload) {
                Ok(reply) if reply.ok => {
                    self.console.say(format!("✅ {label}: subscription {subscription_id} configured"))?
                }
                Ok(_) => self.console.say(format!(
                    "⚠️  {label}: subscription {subscription_id} sent, device did not answer <ok/>"
                ))?,
                Err(e) => {
                    warn!("Add failed on {}: {}", label, e);
                    self.console.say(format!("❌ {label}: {e}"))?;
                }
            }
        }
        Ok(())
    }

    /// Delete the same subscription id on every device
    pub fn delete_subscription(&mut self, subscription_id: u32) -> Result<()> {
        for session in self.registry.sessions.iter_mut() {
            let label = session.label().to_string();
            match writer::delete_subscription(session, subscription_id) {
                Ok(DeleteOutcome::Deleted(_)) => {
                    self.console.say(format!("✅ {label}: subscription {subscription_id} deleted"))?
                }
                Ok(DeleteOutcome::NotConfigured { subscription_id }) => self.console.say(format!(
                    "❌ {label}: Error Subscription {subscription_id} not configured"
                ))?,
                Err(e) => {
                    warn!("Delete failed on {}: {}", label, e);
                    self.console.say(format!("❌ {label}: {e}"))?;
                }
            }
        }
        Ok(())
    }

    /// Close all sessions and report; repeated calls only skip
    pub fn shutdown(&mut self) -> Result<CloseReport> {
        self.console.say("Closing connections to devices")?;
        let report = self.registry.close_all();
        self.console.say(format!(
            "👋 Sessions disconnected ({} closed, {} already closed, {} failed)",
            report.closed, report.skipped, report.failed
        ))?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_choice_parsing() {
        assert_eq!("1".parse::<MenuChoice>(), Ok(MenuChoice::ShowSubscriptions));
        assert_eq!(" 2\n".parse::<MenuChoice>(), Ok(MenuChoice::AddSubscription));
        assert_eq!("3".parse::<MenuChoice>(), Ok(MenuChoice::DeleteSubscription));
        assert_eq!("4".parse::<MenuChoice>(), Ok(MenuChoice::Exit));
        assert!("exit".parse::<MenuChoice>().is_err());
        assert!("".parse::<MenuChoice>().is_err());
    }

    #[test]
    fn test_prompt_parse_retries_until_valid() {
        let mut output = Vec::new();
        let mut console = Console::new("abc\n-1\n42\n".as_bytes(), &mut output);
        assert_eq!(console.prompt_parse::<u32>("Number:").unwrap(), Some(42));

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("Invalid input").count(), 2);
    }

    #[test]
    fn test_prompt_end_of_input() {
        let mut output = Vec::new();
        let mut console = Console::new("".as_bytes(), &mut output);
        assert_eq!(console.prompt("Anything:").unwrap(), None);
        assert_eq!(console.prompt_parse::<u32>("Number:").unwrap(), None);
    }

    #[test]
    fn test_empty_registry_closes_cleanly() {
        let mut registry = SessionRegistry::new(Vec::new());
        assert_eq!(registry.close_all(), CloseReport::default());
        assert!(registry.is_empty());
    }
}
