//! Subscription view: normalisation and table rendering
//!
//! XML-to-mapping conversion yields a bare object for one `mdt-subscription`
//! and an array for several. [`Shape`] captures that at the parsing boundary;
//! everything downstream only sees a [`SubscriptionCollection`].

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::query::ParsedPayload;

#[derive(Debug, thiserror::Error)]
#[error("subscription #{index} is malformed: {source}")]
pub struct ViewError {
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Single-vs-repeated shape of a mapping node
#[derive(Debug, Clone, PartialEq)]
pub enum Shape<T> {
    Empty,
    One(T),
    Many(Vec<T>),
}

impl Shape<Value> {
    pub fn of(node: Option<&Value>) -> Self {
        match node {
            None | Some(Value::Null) => Shape::Empty,
            Some(Value::Array(items)) => Shape::Many(items.clone()),
            Some(other) => Shape::One(other.clone()),
        }
    }
}

impl<T> Shape<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Shape::Empty => Vec::new(),
            Shape::One(item) => vec![item],
            Shape::Many(items) => items,
        }
    }
}

/// One configured telemetry subscription as reported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscription_id: String,
    pub xpath: Option<String>,
    pub receiver_address: Option<String>,
    pub receiver_port: Option<String>,
}

#[derive(Deserialize)]
struct RawSubscription {
    #[serde(rename = "subscription-id")]
    subscription_id: String,
    #[serde(default)]
    base: Option<RawBase>,
    #[serde(rename = "mdt-receivers", default)]
    receivers: Value,
}

#[derive(Deserialize)]
struct RawBase {
    #[serde(default)]
    xpath: Option<String>,
}

#[derive(Deserialize)]
struct RawReceiver {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    port: Option<String>,
}

impl Subscription {
    fn from_value(index: usize, value: Value) -> Result<Self, ViewError> {
        let raw: RawSubscription =
            serde_json::from_value(value).map_err(|source| ViewError { index, source })?;

        let receivers = Shape::of(Some(&raw.receivers)).into_vec();
        if receivers.len() > 1 {
            debug!(
                "subscription {} has {} receivers, showing the first",
                raw.subscription_id,
                receivers.len()
            );
        }
        let receiver: Option<RawReceiver> = receivers
            .into_iter()
            .find(|r| !r.is_null())
            .map(serde_json::from_value)
            .transpose()
            .map_err(|source| ViewError { index, source })?;

        Ok(Self {
            subscription_id: raw.subscription_id,
            xpath: raw.base.and_then(|b| b.xpath),
            receiver_address: receiver.as_ref().and_then(|r| r.address.clone()),
            receiver_port: receiver.and_then(|r| r.port),
        })
    }
}

/// Ordered subscriptions of one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionCollection {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionCollection {
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }
}

/// Collapse the `mdt-config-data/mdt-subscription` node into a collection.
///
/// A missing container is an empty collection, not an error.
pub fn normalize(payload: &ParsedPayload) -> Result<SubscriptionCollection, ViewError> {
    let node = payload.pointer(&["mdt-config-data", "mdt-subscription"]);
    let subscriptions = Shape::of(node)
        .into_vec()
        .into_iter()
        .enumerate()
        .map(|(index, value)| Subscription::from_value(index, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SubscriptionCollection { subscriptions })
}

/// Result of rendering one device's subscriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendering {
    Table(String),
    NoSubscriptions { device: String },
}

impl fmt::Display for Rendering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendering::Table(table) => f.write_str(table),
            Rendering::NoSubscriptions { device } => {
                write!(f, "No subscriptions configured on {device}")
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Align {
    Right,
    Center,
}

const COLUMNS: [(&str, Align); 4] = [
    ("ID", Align::Right),
    ("Path", Align::Center),
    ("Receiver", Align::Center),
    ("Receiver Port", Align::Center),
];

const MISSING: &str = "-";

pub fn render(collection: &SubscriptionCollection, device_label: &str) -> Rendering {
    if collection.is_empty() {
        return Rendering::NoSubscriptions {
            device: device_label.to_string(),
        };
    }

    let rows: Vec<[&str; 4]> = collection
        .iter()
        .map(|s| {
            [
                s.subscription_id.as_str(),
                s.xpath.as_deref().unwrap_or(MISSING),
                s.receiver_address.as_deref().unwrap_or(MISSING),
                s.receiver_port.as_deref().unwrap_or(MISSING),
            ]
        })
        .collect();

    let mut widths = COLUMNS.map(|(header, _)| width(header));
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(width(cell));
        }
    }

    let line = |left: &str, fill: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| fill.repeat(w + 2)).collect();
        format!("{left}{}{right}", segments.join(mid))
    };
    let cells = |values: [&str; 4], edge: &str, aligns: Option<Align>| {
        let padded: Vec<String> = values
            .iter()
            .zip(COLUMNS.iter())
            .zip(widths.iter())
            .map(|((value, (_, align)), w)| format!(" {} ", pad(value, *w, aligns.unwrap_or(*align))))
            .collect();
        format!("{edge}{}{edge}", padded.join(edge))
    };

    let title = format!("Configured Telemetry Subscriptions {device_label}");
    let table_width = widths.iter().map(|w| w + 3).sum::<usize>() + 1;

    let mut out = Vec::with_capacity(rows.len() + 5);
    out.push(pad(&title, table_width, Align::Center).trim_end().to_string());
    out.push(line("┏", "━", "┳", "┓"));
    out.push(cells(COLUMNS.map(|(h, _)| h), "┃", Some(Align::Center)));
    out.push(line("┡", "━", "╇", "┩"));
    for row in rows {
        out.push(cells(row, "│", None));
    }
    out.push(line("└", "─", "┴", "┘"));

    Rendering::Table(out.join("\n"))
}

fn width(s: &str) -> usize {
    s.chars().count()
}

fn pad(s: &str, target: usize, align: Align) -> String {
    let gap = target.saturating_sub(width(s));
    match align {
        Align::Right => format!("{}{s}", " ".repeat(gap)),
        Align::Center => {
            let left = gap / 2;
            format!("{}{s}{}", " ".repeat(left), " ".repeat(gap - left))
        }
    }
}
