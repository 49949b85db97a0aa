//! XML document handling for NETCONF payloads
//!
//! Replies are read into a small element tree ([`XmlElement`]) and can be
//! turned into a nested `serde_json::Value` mapping:
//! - an element with children becomes an object keyed by child name
//! - a child name seen once maps to a bare value, seen twice or more to an array
//! - a text-only element becomes a string, an empty element becomes `null`
//! - attributes become `@name` keys, text beside children becomes `#text`
//!
//! Namespace prefixes are dropped and `xmlns` declarations are not kept.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(#[from] quick_xml::Error),
    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("document has no root element")]
    MissingRoot,
    #[error("unexpected closing tag </{0}>")]
    UnbalancedTag(String),
    #[error("document ended inside <{0}>")]
    Truncated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    /// Local name of the element (prefix stripped)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// First child with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Walk down through first-match children
    pub fn find(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Trimmed character data directly inside this element
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Convert into the nested mapping form described in the module docs
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();

        for (key, value) in &self.attributes {
            map.insert(format!("@{key}"), Value::String(value.clone()));
        }

        for child in &self.children {
            let value = child.to_value();
            match map.get_mut(&child.name) {
                // child values are never arrays themselves, so an array here
                // means the name was already repeated
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(child.name.clone(), value);
                }
            }
        }

        if map.is_empty() {
            if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text.clone())
            }
        } else {
            if !self.text.is_empty() {
                map.insert("#text".to_string(), Value::String(self.text.clone()));
            }
            Value::Object(map)
        }
    }
}

/// Parse a complete document and return its root element
pub fn parse(xml: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                stack.push(XmlElement::from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(end) => {
                let element = stack.pop().ok_or_else(|| {
                    XmlError::UnbalancedTag(String::from_utf8_lossy(end.local_name().as_ref()).into_owned())
                })?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(text.unescape()?.trim());
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(String::from_utf8_lossy(&data).trim());
                }
            }
            Event::Eof => break,
            // declarations, comments, processing instructions
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Truncated(open.name));
    }
    root.ok_or(XmlError::MissingRoot)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
