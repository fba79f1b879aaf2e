//! Minimal element tree for Flickr's XML (`format=rest`) responses.

use std::collections::BTreeMap;

use quick_xml::{
    escape::unescape,
    events::{BytesStart, Event},
    reader::Reader,
};

use crate::FlickrError;

/// A parsed XML element: name, attributes, direct text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Concatenated text content directly inside this element (trimmed).
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a document and return its root element.
    pub fn parse(input: &str) -> Result<Self, FlickrError> {
        let mut reader = Reader::from_str(input);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(element_from(&e)),
                Event::Empty(e) => attach(&mut stack, &mut root, element_from(&e))?,
                Event::Text(e) => {
                    if let Some(current) = stack.last_mut() {
                        let raw = String::from_utf8_lossy(e.as_ref());
                        current.text.push_str(&unescape_lossy(&raw));
                    }
                }
                Event::GeneralRef(e) => {
                    if let Some(current) = stack.last_mut() {
                        let name = String::from_utf8_lossy(e.as_ref());
                        current.text.push_str(&unescape_lossy(&format!("&{name};")));
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::End(_) => {
                    let Some(mut done) = stack.pop() else {
                        return Err(FlickrError::MissingField("unbalanced xml document"));
                    };
                    // Entity references split text into several events, so trim once here.
                    done.text = done.text.trim().to_string();
                    attach(&mut stack, &mut root, done)?;
                }
                Event::Eof => break,
                _ => (),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(FlickrError::MissingField("unterminated xml element"));
        }
        root.ok_or(FlickrError::MissingField("xml document has no root element"))
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// First direct child with the given element name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }
}

fn element_from(start: &BytesStart<'_>) -> XmlElement {
    let attributes = start
        .attributes()
        .filter_map(Result::ok)
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = unescape_lossy(&String::from_utf8_lossy(&attr.value));
            (key, value)
        })
        .collect();

    XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).to_string(),
        attributes,
        ..Default::default()
    }
}

/// Push `element` onto its parent, or make it the root. A second root is an error.
fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), FlickrError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(FlickrError::MissingField("xml document has more than one root element"));
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn unescape_lossy(raw: &str) -> String {
    unescape(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_success() {
        let doc = r#"<?xml version="1.0" encoding="utf-8" ?>
<rsp stat="ok">
<photoid>1234</photoid>
</rsp>"#;
        let root = XmlElement::parse(doc).unwrap();
        assert_eq!(root.name, "rsp");
        assert_eq!(root.attr("stat"), Some("ok"));
        assert_eq!(root.find("photoid").unwrap().text, "1234");
    }

    #[test]
    fn parses_self_closing_error() {
        let doc = r#"<rsp stat="fail"><err code="99" msg="Insufficient permissions. Method requires write privileges; read granted." /></rsp>"#;
        let root = XmlElement::parse(doc).unwrap();
        let err = root.find("err").unwrap();
        assert_eq!(err.attr("code"), Some("99"));
        assert!(err.attr("msg").unwrap().starts_with("Insufficient permissions"));
        assert!(err.children.is_empty());
    }

    #[test]
    fn unescapes_attribute_values() {
        let root = XmlElement::parse(r#"<rsp stat="fail"><err code="5" msg="a &amp; b"/></rsp>"#)
            .unwrap();
        assert_eq!(root.find("err").unwrap().attr("msg"), Some("a & b"));
    }

    #[test]
    fn nested_children_keep_order() {
        let root = XmlElement::parse("<a><b>1</b><c><d/></c><b>2</b></a>").unwrap();
        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "b"]);
        assert_eq!(root.find("c").unwrap().find("d").unwrap().name, "d");
        assert_eq!(root.find("b").unwrap().text, "1");
    }

    #[test]
    fn keeps_spaces_around_entities() {
        let root = XmlElement::parse(
            "<rsp stat=\"ok\"><title>Tom &amp; Jerry</title><desc>  a &lt;b&gt; c  </desc></rsp>",
        )
        .unwrap();
        assert_eq!(root.find("title").unwrap().text, "Tom & Jerry");
        assert_eq!(root.find("desc").unwrap().text, "a <b> c");
    }

    #[test]
    fn text_is_trimmed_once() {
        let root = XmlElement::parse("<rsp>\n  <photoid>\n 1234 \n</photoid>\n</rsp>").unwrap();
        assert_eq!(root.text, "");
        assert_eq!(root.find("photoid").unwrap().text, "1234");
    }

    #[test]
    fn rejects_second_root() {
        assert!(matches!(
            XmlElement::parse("<rsp stat=\"ok\"/><rsp stat=\"fail\"/>"),
            Err(FlickrError::MissingField(_))
        ));
        assert!(XmlElement::parse("<a>1</a><b>2</b>").is_err());
    }

    #[test]
    fn rejects_empty_document() {
        assert!(XmlElement::parse("").is_err());
    }
}
