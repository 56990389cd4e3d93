//! Hardened XML reader producing a small element tree.
//!
//! Document type declarations are refused outright, so no entity can ever be
//! declared and expanded; references to unknown entities fail during
//! unescaping. Element nesting is capped at [`MAX_DEPTH`].

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XmlError {
    #[error("document is not valid UTF-8")]
    Encoding,
    #[error("DTD is forbidden")]
    DtdForbidden,
    #[error("element nesting exceeds {0} levels")]
    TooDeep(usize),
    #[error("document has no root element")]
    NoRoot,
    #[error("content outside the root element")]
    OutsideRoot,
    #[error("unclosed element <{0}>")]
    Unclosed(String),
    #[error("{0}")]
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.name == name)
    }

    /// Concatenated character data of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

pub fn parse(body: &[u8]) -> Result<Element, XmlError> {
    let text = std::str::from_utf8(body).map_err(|_| XmlError::Encoding)?;
    let mut reader = Reader::from_str(text);
    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(syntax)? {
            Event::Start(start) => {
                ensure_room(&open, &root)?;
                open.push(Element::new(element_name(&start)?));
            }
            Event::Empty(start) => {
                ensure_room(&open, &root)?;
                let element = Element::new(element_name(&start)?);
                attach(&mut open, &mut root, element);
            }
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unexpected end tag".to_string()))?;
                attach(&mut open, &mut root, element);
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(syntax)?;
                push_text(&mut open, value.into_owned())?;
            }
            Event::CData(data) => {
                let value =
                    String::from_utf8(data.into_inner().into_owned()).map_err(|_| XmlError::Encoding)?;
                push_text(&mut open, value)?;
            }
            Event::DocType(_) => return Err(XmlError::DtdForbidden),
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(unclosed) = open.pop() {
        return Err(XmlError::Unclosed(unclosed.name));
    }
    root.ok_or(XmlError::NoRoot)
}

fn syntax(err: impl std::fmt::Display) -> XmlError {
    XmlError::Syntax(err.to_string())
}

fn element_name(start: &BytesStart<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|_| XmlError::Encoding)
}

fn ensure_room(open: &[Element], root: &Option<Element>) -> Result<(), XmlError> {
    if root.is_some() {
        return Err(XmlError::OutsideRoot);
    }
    if open.len() >= MAX_DEPTH {
        return Err(XmlError::TooDeep(MAX_DEPTH));
    }
    Ok(())
}

fn attach(open: &mut [Element], root: &mut Option<Element>, element: Element) {
    match open.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(open: &mut [Element], text: String) -> Result<(), XmlError> {
    match open.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::OutsideRoot),
    }
}
