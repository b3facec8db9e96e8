//! Pull reader over the XML parts of a workbook package, plus attribute and text helpers.

use crate::error::ImportError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Unknown entity reference '&{0};'")]
    UnknownEntity(String),

    #[error("Invalid character reference '&{0};'")]
    InvalidCharacterReference(String),

    #[error("Attribute '{name}' has an invalid value '{value}'")]
    InvalidAttributeValue { name: String, value: String },
}

/// Event reader for package parts. Self-closing elements are reported as a start and an end
/// event, so handlers only match `Event::Start`.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(source: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        XmlReader { reader, buffer: Vec::with_capacity(1024) }
    }

    /// Next event, `None` at the end of the part.
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, ImportError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer)? {
            Event::Eof => Ok(None),
            event => Ok(Some(event)),
        }
    }
}

fn attribute_text<'a>(attribute: Attribute<'a>) -> Result<Cow<'a, str>, ImportError> {
    Ok(attribute.unescape_value()?)
}

pub(crate) trait XmlNodeHelper<'a> {
    /// Unescaped value of the attribute with this qualified name.
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, ImportError>;

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, ImportError>;

    /// Attribute looked up by local name, whatever its namespace prefix.
    fn get_local_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, ImportError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, ImportError> {
        self.try_get_attribute(name)?.map(attribute_text).transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, ImportError> {
        let Some(value) = self.try_get_attribute(name)?.map(attribute_text).transpose()? else {
            return Ok(None);
        };
        match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(XmlError::InvalidAttributeValue { name: name.to_owned(), value: value.into_owned() }.into()),
        }
    }

    fn get_local_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, ImportError> {
        for attribute in self.attributes() {
            let attribute = attribute?;
            if attribute.key.local_name().as_ref() == name.as_bytes() {
                return attribute_text(attribute).map(Some);
            }
        }
        Ok(None)
    }
}

/// Accumulates the character data of an element.
pub(crate) trait XmlTextContent {
    /// Appends the content of a text, CDATA or reference event.
    /// Returns `false` for any other event, which is left untouched.
    fn push_content(&mut self, event: &Event) -> Result<bool, ImportError>;

    fn push_reference(&mut self, reference: &BytesRef) -> Result<(), ImportError>;
}

impl XmlTextContent for String {
    fn push_content(&mut self, event: &Event) -> Result<bool, ImportError> {
        match event {
            Event::Text(text) => self.push_str(&text.xml_content()?),
            Event::CData(data) => self.push_str(&data.xml_content()?),
            Event::GeneralRef(reference) => self.push_reference(reference)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn push_reference(&mut self, reference: &BytesRef) -> Result<(), ImportError> {
        let raw = reference.xml_content()?;
        match raw.strip_prefix('#') {
            Some(number) => {
                let code = match number.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => number.parse::<u32>(),
                };
                let character = code
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| XmlError::InvalidCharacterReference(raw.to_string()))?;
                self.push(character);
            }
            None => {
                let entity = resolve_xml_entity(&raw).ok_or_else(|| XmlError::UnknownEntity(raw.to_string()))?;
                self.push_str(entity);
            }
        }
        Ok(())
    }
}

/// Loops over the remaining events of a reader; unmatched events are skipped.
#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
