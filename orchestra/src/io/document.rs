//! This module defines [Document] and [Element],
//! a small XML tree used to describe compiled delta rules.

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use crate::error::Error;

fn serialization_error<E: std::fmt::Display>(error: E) -> Error {
    Error::Serialization(error.to_string())
}

/// XML element with attributes, child elements and optional text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    /// Create a new empty [Element].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Set the text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Add a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Return the name of the element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the value of the attribute with the given key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Return the child elements.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Return the text content.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Iterate over the children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), Error> {
        let start = BytesStart::new(self.name.as_str()).with_attributes(
            self.attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );

        if self.children.is_empty() && self.text.is_none() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(serialization_error);
        }

        writer
            .write_event(Event::Start(start))
            .map_err(serialization_error)?;
        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(serialization_error)?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(serialization_error)
    }

    fn from_start(start: &BytesStart) -> Result<Self, Error> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut element = Element::new(name);

        for attribute in start.attributes() {
            let attribute = attribute.map_err(serialization_error)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(serialization_error)?;
            element.attributes.push((key, value.into_owned()));
        }

        Ok(element)
    }
}

/// XML document with a single root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Create a new [Document].
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Return the root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Write the document as indented XML.
    pub fn to_xml_string(&self) -> Result<String, Error> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(serialization_error)?;
        self.root.write(&mut writer)?;

        String::from_utf8(writer.into_inner()).map_err(serialization_error)
    }

    /// Read a document from XML.
    pub fn from_xml_str(xml: &str) -> Result<Self, Error> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack = Vec::<Element>::new();
        let mut root = None;

        loop {
            match reader.read_event().map_err(serialization_error)? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(serialization_error)?;
                    if let Some(current) = stack.last_mut() {
                        current.text = Some(text.into_owned());
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Serialization("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.map(Document::new)
            .ok_or_else(|| Error::Serialization("document without root element".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::{Document, Element};

    #[test]
    fn write_and_read() {
        let mut root = Element::new("deltaRules").with_attribute("type", "Insertion");
        let mut sequence = Element::new("sequence").with_attribute("name", "prep");
        sequence.push(Element::new("rule").with_text("A_NEW(X) := A(X) ."));
        root.push(sequence);
        root.push(Element::new("sequence").with_attribute("name", "empty"));
        let document = Document::new(root);

        let xml = document.to_xml_string().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<deltaRules type=\"Insertion\">"));
        assert!(xml.contains("A_NEW(X) := A(X) ."));
        assert!(xml.contains("<sequence name=\"empty\"/>"));

        let parsed = Document::from_xml_str(&xml).unwrap();
        assert_eq!(parsed, document);
        assert_eq!(parsed.root().attribute("type"), Some("Insertion"));
        assert_eq!(parsed.root().children_named("sequence").count(), 2);
    }

    #[test]
    fn escaping() {
        let document = Document::new(
            Element::new("rule").with_text("T(X) :- S(X, \"a<b\") ."),
        );

        let xml = document.to_xml_string().unwrap();
        assert!(xml.contains("&lt;"));
        assert_eq!(Document::from_xml_str(&xml).unwrap(), document);
    }

    #[test]
    fn missing_root() {
        assert!(Document::from_xml_str("").is_err());
    }
}
