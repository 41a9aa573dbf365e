//! Streaming XMLTV reader.
//!
//! Works through any buffered byte source, decoding per the document's
//! declared charset, and dispatches `<channel>` and `<programme>` subtrees
//! into a sink. Unknown elements are skipped wholesale. The reader keeps no
//! state of its own, so several inputs can be streamed back to back while
//! the sink accumulates interns and counters across all of them.

use crate::ingest::{IngestError, IngestResult};
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

/// A decoded `<channel>` element.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XmltvChannel {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
}

/// A decoded `<programme>` element.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XmltvProgramme {
    pub start: String,
    pub stop: String,
    pub channel: String,
    pub title: String,
    pub sub_title: String,
    pub description: String,
    pub icons: Vec<String>,
    pub categories: Vec<String>,
    pub year: Option<String>,
}

/// Receives decoded schedule elements in document order.
///
/// Returning `Ok(true)` means the element was accepted (counted in the
/// per-input totals); `Ok(false)` means it was filtered out.
pub trait ScheduleSink {
    fn channel(&mut self, channel: XmltvChannel) -> IngestResult<bool>;
    fn programme(&mut self, programme: XmltvProgramme) -> IngestResult<bool>;
}

/// Streams one XMLTV document into the sink.
///
/// Returns `(accepted_channels, accepted_programmes)` for this input.
/// Fails if the first element is not `<tv>` or a token cannot be read.
pub fn read_schedule<R: BufRead>(
    input: R,
    sink: &mut dyn ScheduleSink,
) -> IngestResult<(usize, usize)> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();

    // Seek the root element.
    loop {
        match read_event(&mut reader, &mut buf)? {
            Event::Start(ref e) => {
                expect_root(e, "tv")?;
                break;
            }
            Event::Empty(ref e) => {
                // A self-closing root is a well-formed, empty schedule.
                expect_root(e, "tv")?;
                return Ok((0, 0));
            }
            Event::Eof => {
                return Err(IngestError::MalformedXml(
                    "<tv> root tag not found".to_string(),
                ));
            }
            _ => {}
        }
    }

    let mut channels = 0;
    let mut programmes = 0;

    loop {
        match read_event(&mut reader, &mut buf)? {
            Event::Start(e) => {
                let decoder = reader.decoder();
                match e.name().as_ref() {
                    b"channel" => {
                        let attrs = CollectedAttrs::from_element(decoder, &e)?;
                        let channel = read_channel(&mut reader, attrs)?;
                        if sink.channel(channel)? {
                            channels += 1;
                        }
                    }
                    b"programme" => {
                        let attrs = CollectedAttrs::from_element(decoder, &e)?;
                        let programme = read_programme(&mut reader, attrs)?;
                        if sink.programme(programme)? {
                            programmes += 1;
                        }
                    }
                    _ => skip_subtree(&mut reader, &e)?,
                }
            }
            Event::End(_) | Event::Empty(_) => {}
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((channels, programmes))
}

fn expect_root(element: &BytesStart, expected: &str) -> IngestResult<()> {
    let name = element.name();
    if name.as_ref() == expected.as_bytes() {
        Ok(())
    } else {
        Err(IngestError::MalformedXml(format!(
            "<{expected}> tag not found, got <{}> instead",
            String::from_utf8_lossy(name.as_ref())
        )))
    }
}

/// Owned copy of an element's attributes, decoded and unescaped.
pub(crate) struct CollectedAttrs {
    attrs: Vec<(Vec<u8>, String)>,
}

impl CollectedAttrs {
    pub(crate) fn from_element(decoder: Decoder, element: &BytesStart) -> IngestResult<Self> {
        let mut attrs = Vec::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| IngestError::MalformedXml(e.to_string()))?;
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(|e| IngestError::MalformedXml(e.to_string()))?;
            attrs.push((attr.key.as_ref().to_vec(), value.into_owned()));
        }
        Ok(Self { attrs })
    }

    pub(crate) fn take(&mut self, name: &[u8]) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.swap_remove(pos).1)
    }
}

fn read_channel<R: BufRead>(
    reader: &mut Reader<R>,
    mut attrs: CollectedAttrs,
) -> IngestResult<XmltvChannel> {
    let mut channel = XmltvChannel {
        id: attrs.take(b"id").unwrap_or_default(),
        ..Default::default()
    };

    let mut buf = Vec::new();
    loop {
        match read_event(reader, &mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"display-name" => {
                    let text = read_element_text(reader)?;
                    if channel.name.is_empty() {
                        channel.name = text;
                    }
                }
                b"icon" => {
                    let mut icon = CollectedAttrs::from_element(reader.decoder(), &e)?;
                    set_icon(&mut channel.icon, icon.take(b"src"));
                    skip_subtree(reader, &e)?;
                }
                _ => skip_subtree(reader, &e)?,
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"icon" {
                    let mut icon = CollectedAttrs::from_element(reader.decoder(), &e)?;
                    set_icon(&mut channel.icon, icon.take(b"src"));
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(unexpected_eof("channel")),
            _ => {}
        }
    }

    Ok(channel)
}

fn read_programme<R: BufRead>(
    reader: &mut Reader<R>,
    mut attrs: CollectedAttrs,
) -> IngestResult<XmltvProgramme> {
    let mut programme = XmltvProgramme {
        start: attrs.take(b"start").unwrap_or_default(),
        stop: attrs.take(b"stop").unwrap_or_default(),
        channel: attrs.take(b"channel").unwrap_or_default(),
        ..Default::default()
    };

    let mut buf = Vec::new();
    loop {
        match read_event(reader, &mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"title" => {
                    let text = read_element_text(reader)?;
                    if programme.title.is_empty() {
                        programme.title = text;
                    }
                }
                b"sub-title" => programme.sub_title = read_element_text(reader)?,
                b"desc" => programme.description = read_element_text(reader)?,
                b"category" => {
                    let text = read_element_text(reader)?;
                    if !text.is_empty() {
                        programme.categories.push(text);
                    }
                }
                b"year" => programme.year = Some(read_element_text(reader)?),
                b"icon" => {
                    let mut icon = CollectedAttrs::from_element(reader.decoder(), &e)?;
                    if let Some(src) = icon.take(b"src") {
                        programme.icons.push(src);
                    }
                    skip_subtree(reader, &e)?;
                }
                _ => skip_subtree(reader, &e)?,
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"icon" {
                    let mut icon = CollectedAttrs::from_element(reader.decoder(), &e)?;
                    if let Some(src) = icon.take(b"src") {
                        programme.icons.push(src);
                    }
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(unexpected_eof("programme")),
            _ => {}
        }
    }

    Ok(programme)
}

/// Collects the text content of the current element, trimmed, flattening
/// any nested markup, and consumes the matching end tag.
pub(crate) fn read_element_text<R: BufRead>(reader: &mut Reader<R>) -> IngestResult<String> {
    let mut out = String::new();
    let mut depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match read_event(reader, &mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Text(t) => {
                let decoded = reader
                    .decoder()
                    .decode(t.as_ref())
                    .map_err(|e| IngestError::MalformedXml(e.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|e| IngestError::MalformedXml(e.to_string()))?;
                out.push_str(&unescaped);
            }
            Event::CData(t) => {
                let decoded = reader
                    .decoder()
                    .decode(t.as_ref())
                    .map_err(|e| IngestError::MalformedXml(e.to_string()))?;
                out.push_str(&decoded);
            }
            Event::Eof => return Err(unexpected_eof("text")),
            _ => {}
        }
    }

    Ok(out.trim().to_string())
}

/// Consumes everything up to and including the end tag matching `start`.
pub(crate) fn skip_subtree<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
) -> IngestResult<()> {
    let end = start.to_end().into_owned();
    let mut buf = Vec::new();
    reader
        .read_to_end_into(end.name(), &mut buf)
        .map_err(|e| IngestError::MalformedXml(e.to_string()))?;
    Ok(())
}

pub(crate) fn read_event<'b, R: BufRead>(
    reader: &mut Reader<R>,
    buf: &'b mut Vec<u8>,
) -> IngestResult<Event<'b>> {
    buf.clear();
    reader
        .read_event_into(buf)
        .map_err(|e| IngestError::MalformedXml(e.to_string()))
}

fn unexpected_eof(context: &str) -> IngestError {
    IngestError::MalformedXml(format!("unexpected end of document inside <{context}>"))
}

fn set_icon(slot: &mut Option<String>, src: Option<String>) {
    if slot.is_none()
        && let Some(src) = src.filter(|s| !s.is_empty())
    {
        *slot = Some(src);
    }
}
