//! Minimal element tree for the OFD manifests and page descriptions.
//!
//! Every element lives in the OFD namespace; names are stored as local names
//! and the `ofd:` prefix is added on serialization. Parsing accepts the
//! namespace prefix present or absent.

use crate::error::Error;

pub const OFD_NS: &str = "http://www.ofdspec.org/2016";
pub const OFD_PREFIX: &str = "ofd";

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Shorthand for `<name>text</name>`.
    pub fn text_node(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets or replaces an attribute, keeping the position of an existing one
    /// so serialization stays stable.
    pub fn set_attr(&mut self, name: &str, value: impl ToString) -> &mut Self {
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl ToString) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn push(&mut self, child: Element) -> &mut Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Replaces all text children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.children.retain(|c| matches!(c, Node::Element(_)));
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn remove_children(&mut self, name: &str) {
        self.children
            .retain(|c| !matches!(c, Node::Element(e) if e.name == name));
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Full document serialization: XML declaration plus namespace declaration
    /// on the root element.
    pub fn to_xml_bytes(&self) -> Vec<u8> {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_into(&mut out, true);
        out.into_bytes()
    }

    /// Serialization without declaration or namespace attribute; used for
    /// content fingerprints.
    pub fn to_fragment_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        self.write_into(&mut out, false);
        out.into_bytes()
    }

    fn write_into(&self, out: &mut String, root: bool) {
        out.push('<');
        out.push_str(OFD_PREFIX);
        out.push(':');
        out.push_str(&self.name);
        if root {
            out.push_str(" xmlns:");
            out.push_str(OFD_PREFIX);
            out.push_str("=\"");
            out.push_str(OFD_NS);
            out.push('"');
        }
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            escape_into(out, v, true);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_into(out, false),
                Node::Text(t) => escape_into(out, t, false),
            }
        }
        out.push_str("</");
        out.push_str(OFD_PREFIX);
        out.push(':');
        out.push_str(&self.name);
        out.push('>');
    }

    pub fn parse(xml: &str) -> Result<Element, Error> {
        let doc = roxmltree::Document::parse(xml)?;
        Ok(Self::from_node(doc.root_element()))
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Element, Error> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::InvalidPackage(format!("xml is not valid UTF-8: {e}")))?;
        Self::parse(text.trim_start_matches('\u{feff}'))
    }

    fn from_node(node: roxmltree::Node) -> Element {
        let mut el = Element::new(node.tag_name().name());
        for a in node.attributes() {
            el.attrs.push((a.name().to_string(), a.value().to_string()));
        }
        for child in node.children() {
            if child.is_element() {
                el.children.push(Node::Element(Self::from_node(child)));
            } else if let Some(text) = child.text()
                && child.is_text()
                && !text.trim().is_empty()
            {
                el.children.push(Node::Text(text.to_string()));
            }
        }
        el
    }
}

fn escape_into(out: &mut String, s: &str, attr: bool) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Formats a length for OFD attributes: at most three decimals, no trailing
/// zeros, no negative zero.
pub fn fmt_num(v: f64) -> String {
    let s = format!("{v:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

pub fn fmt_nums(values: &[f64]) -> String {
    values.iter().map(|v| fmt_num(*v)).collect::<Vec<_>>().join(" ")
}
