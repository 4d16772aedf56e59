//! EPG (Electronic Program Guide) Parser
//! Streaming parser for the XMLTV format - handles 100MB+ files efficiently
//! Supports both plain XML and gzip-compressed (.xml.gz) files

use crate::error::{EpgError, Result};
use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Channel information from EPG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    /// Display name, the id when the feed has none
    pub name: String,
    /// Channel icon/logo URL (optional)
    pub icon: Option<String>,
}

/// A single TV programme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Programme {
    /// Channel this programme belongs to, not checked against the channel list
    pub channel_id: String,
    /// Naive local time, any timezone suffix in the feed is ignored
    pub start: NaiveDateTime,
    pub stop: NaiveDateTime,
    /// Empty when the feed has no `<title>`
    pub title: String,
    pub description: Option<String>,
    /// Genre (optional)
    pub category: Option<String>,
}

impl Programme {
    /// Title, or `fallback` when the feed gave none
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.title.is_empty() {
            fallback
        } else {
            &self.title
        }
    }

    /// Whether the programme is on air at `now`, i.e. `start <= now < stop`
    pub fn is_airing(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now < self.stop
    }
}

/// Parsed EPG data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpgDocument {
    /// Channel information indexed by channel ID
    pub channels: HashMap<String, Channel>,
    /// Every programme kept, in document order
    pub programmes: Vec<Programme>,
    /// Programmes dropped for a missing or unparseable start/stop
    pub skipped: usize,
}

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum ParserState {
    #[default]
    Root,
    Channel,
    DisplayName,
    Programme,
    Title,
    Desc,
    Category,
}

/// Programme under construction; start/stop stay optional until the end tag
#[derive(Debug, Default)]
struct PendingProgramme {
    channel_id: String,
    start: Option<NaiveDateTime>,
    stop: Option<NaiveDateTime>,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
}

impl PendingProgramme {
    fn finish(self) -> Option<Programme> {
        Some(Programme {
            channel_id: self.channel_id,
            start: self.start?,
            stop: self.stop?,
            title: self.title.unwrap_or_default(),
            description: self.description,
            category: self.category,
        })
    }
}

/// Accumulates channels and programmes from the event stream
#[derive(Default)]
struct XmltvBuilder {
    state: ParserState,
    channel: Option<Channel>,
    programme: Option<PendingProgramme>,
    text: String,
    doc: EpgDocument,
}

impl XmltvBuilder {
    fn open(&mut self, e: &BytesStart) {
        let name = e.name();
        match (name.as_ref(), self.state) {
            (b"channel", ParserState::Root) => {
                self.state = ParserState::Channel;
                self.channel = Some(Channel {
                    id: get_attribute(e, b"id").unwrap_or_default(),
                    name: String::new(),
                    icon: None,
                });
            }
            (b"programme", ParserState::Root) => {
                self.state = ParserState::Programme;
                self.programme = Some(PendingProgramme {
                    channel_id: get_attribute(e, b"channel").unwrap_or_default(),
                    start: get_attribute(e, b"start").and_then(|s| parse_xmltv_time(&s)),
                    stop: get_attribute(e, b"stop").and_then(|s| parse_xmltv_time(&s)),
                    ..Default::default()
                });
            }
            (b"display-name", ParserState::Channel) => {
                self.state = ParserState::DisplayName;
                self.text.clear();
            }
            (b"icon", ParserState::Channel) => {
                if let Some(ref mut chan) = self.channel {
                    if chan.icon.is_none() {
                        chan.icon = get_attribute(e, b"src").filter(|s| !s.is_empty());
                    }
                }
            }
            (b"title", ParserState::Programme) => {
                self.state = ParserState::Title;
                self.text.clear();
            }
            (b"desc", ParserState::Programme) => {
                self.state = ParserState::Desc;
                self.text.clear();
            }
            (b"category", ParserState::Programme) => {
                self.state = ParserState::Category;
                self.text.clear();
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        match self.state {
            ParserState::DisplayName
            | ParserState::Title
            | ParserState::Desc
            | ParserState::Category => self.text.push_str(text),
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match (name, self.state) {
            (b"channel", ParserState::Channel) => {
                if let Some(mut channel) = self.channel.take() {
                    if !channel.id.is_empty() {
                        if channel.name.is_empty() {
                            channel.name = channel.id.clone();
                        }
                        self.doc.channels.insert(channel.id.clone(), channel);
                    }
                }
                self.state = ParserState::Root;
            }
            (b"programme", ParserState::Programme) => {
                if let Some(pending) = self.programme.take() {
                    let channel_id = pending.channel_id.clone();
                    match pending.finish() {
                        Some(programme) => self.doc.programmes.push(programme),
                        None => {
                            debug!(channel = %channel_id, "skipping programme without valid start/stop");
                            self.doc.skipped += 1;
                        }
                    }
                }
                self.state = ParserState::Root;
            }
            (b"display-name", ParserState::DisplayName) => {
                let text = self.take_text();
                if let Some(ref mut chan) = self.channel {
                    if chan.name.is_empty() {
                        if let Some(name) = text {
                            chan.name = name;
                        }
                    }
                }
                self.state = ParserState::Channel;
            }
            (b"title", ParserState::Title) => {
                let text = self.take_text();
                if let Some(ref mut prog) = self.programme {
                    if prog.title.is_none() {
                        prog.title = text;
                    }
                }
                self.state = ParserState::Programme;
            }
            (b"desc", ParserState::Desc) => {
                let text = self.take_text();
                if let Some(ref mut prog) = self.programme {
                    if prog.description.is_none() {
                        prog.description = text;
                    }
                }
                self.state = ParserState::Programme;
            }
            (b"category", ParserState::Category) => {
                let text = self.take_text();
                if let Some(ref mut prog) = self.programme {
                    if prog.category.is_none() {
                        prog.category = text;
                    }
                }
                self.state = ParserState::Programme;
            }
            _ => {}
        }
    }

    /// Trimmed text collected since the last open, `None` when blank
    fn take_text(&mut self) -> Option<String> {
        let text = self.text.trim().to_string();
        self.text.clear();
        (!text.is_empty()).then_some(text)
    }
}

/// EPG Parser for XMLTV format - streaming, memory efficient
pub struct EpgParser;

impl EpgParser {
    /// Parse EPG from XMLTV string (for smaller documents)
    pub fn parse(xml: &str) -> Result<EpgDocument> {
        Self::parse_reader(xml.as_bytes())
    }

    /// Parse EPG from a reader. Any document-level XML error aborts the parse;
    /// individual programmes with bad timestamps are only counted as skipped.
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<EpgDocument> {
        let mut xml_reader = Reader::from_reader(reader);

        let mut builder = XmltvBuilder::default();
        let mut buf = Vec::with_capacity(8192);
        let mut depth: usize = 0;
        let mut seen_root = false;

        loop {
            let position = xml_reader.buffer_position() as u64;
            let event = xml_reader
                .read_event_into(&mut buf)
                .map_err(|e| EpgError::Malformed {
                    position,
                    message: e.to_string(),
                })?;

            if matches!(event, Event::Start(_) | Event::Empty(_)) && depth == 0 {
                if seen_root {
                    return Err(EpgError::Malformed {
                        position,
                        message: "document has more than one root element".to_string(),
                    });
                }
                seen_root = true;
            }

            match event {
                Event::Start(ref e) => {
                    depth += 1;
                    builder.open(e);
                }
                Event::Empty(ref e) => {
                    builder.open(e);
                    builder.close(e.name().as_ref());
                }
                Event::Text(ref e) => {
                    builder.text(&String::from_utf8_lossy(e.as_ref()));
                }
                Event::CData(ref e) => {
                    builder.text(&String::from_utf8_lossy(e.as_ref()));
                }
                Event::GeneralRef(ref e) => {
                    builder.text(&resolve_reference(e));
                }
                Event::End(ref e) => {
                    depth = depth.saturating_sub(1);
                    builder.close(e.name().as_ref());
                }
                Event::Eof => {
                    if !seen_root {
                        return Err(EpgError::Malformed {
                            position,
                            message: "document has no root element".to_string(),
                        });
                    }
                    if depth > 0 {
                        return Err(EpgError::Malformed {
                            position,
                            message: format!("document ended with {} unclosed element(s)", depth),
                        });
                    }
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(builder.doc)
    }

    /// Parse EPG from file - auto-detects gzip compression
    pub fn parse_file(path: &Path) -> Result<EpgDocument> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EpgError::MissingInput(path.to_path_buf()),
            _ => EpgError::io(path, e),
        })?;
        let mut reader = BufReader::with_capacity(64 * 1024, file);

        // Gzip magic number (1f 8b)
        let is_gzip = reader
            .fill_buf()
            .map_err(|e| EpgError::io(path, e))?
            .starts_with(&[0x1f, 0x8b]);

        if is_gzip {
            let decoder = BufReader::with_capacity(64 * 1024, GzDecoder::new(reader));
            Self::parse_reader(SanitizingReader::new(decoder))
        } else {
            Self::parse_reader(SanitizingReader::new(reader))
        }
    }
}

/// Parse XMLTV time: "20240115120000 +0100" -> 2024-01-15 12:00:00.
/// Only the date-time part is used; the timezone token is dropped.
pub fn parse_xmltv_time(time_str: &str) -> Option<NaiveDateTime> {
    let token = time_str.split_whitespace().next()?;

    // "20240115120000+0100" has no separator before the offset
    let datetime = match token.char_indices().nth(14) {
        Some((i, '+' | '-')) => &token[..i],
        _ => token,
    };

    NaiveDateTime::parse_from_str(datetime, XMLTV_TIME_FORMAT).ok()
}

/// Predefined XML entities, then the HTML5 set feeds use for accented letters
fn resolve_entity(name: &str) -> Option<&'static str> {
    resolve_predefined_entity(name).or_else(|| resolve_html5_entity(name))
}

/// Entity references arrive as their own events; unknown names are kept as written
fn resolve_reference(e: &BytesRef) -> String {
    if let Ok(Some(c)) = e.resolve_char_ref() {
        return c.to_string();
    }
    let name = e.decode().map(|n| n.into_owned()).unwrap_or_default();
    match resolve_entity(&name) {
        Some(text) => text.to_string(),
        None => format!("&{};", name),
    }
}

/// Unescape an attribute value, keeping it as written when it doesn't unescape cleanly
fn unescape_attribute(raw: String) -> String {
    let unescaped = unescape_with(&raw, resolve_entity).map(|v| v.into_owned());
    unescaped.unwrap_or(raw)
}

/// Get attribute value from XML element
fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(unescape_attribute(raw));
        }
    }
    None
}

/// Longest entity we try to recognise, "&#x10FFFF;" included
const MAX_ENTITY_LEN: usize = 10;

#[derive(Debug, PartialEq)]
enum EntityStatus {
    Valid,
    Bare,
    /// Chunk ended before we could tell
    Incomplete,
}

/// Reader wrapper that filters out illegal XML 1.0 control characters and
/// escapes bare ampersands, which real-world feeds are full of
struct SanitizingReader<R> {
    inner: R,
    carry: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
}

impl<R: Read> SanitizingReader<R> {
    const CHUNK: usize = 64 * 1024;

    fn new(inner: R) -> Self {
        Self {
            inner,
            carry: Vec::new(),
            out: Vec::with_capacity(Self::CHUNK + Self::CHUNK / 2),
            pos: 0,
        }
    }

    fn sanitize_byte(b: u8) -> u8 {
        match b {
            0x09 | 0x0A | 0x0D => b,
            0x00..=0x1F | 0x7F => b' ',
            _ => b,
        }
    }

    fn entity_status(bytes: &[u8]) -> EntityStatus {
        for (i, &b) in bytes.iter().enumerate().skip(1).take(MAX_ENTITY_LEN) {
            match b {
                b';' if i > 1 && bytes[i - 1] != b'#' => return EntityStatus::Valid,
                b'#' if i == 1 => {}
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => {}
                _ => return EntityStatus::Bare,
            }
        }
        if bytes.len() <= MAX_ENTITY_LEN {
            EntityStatus::Incomplete
        } else {
            EntityStatus::Bare
        }
    }

    /// Refill `out`; returns false once the inner reader is exhausted
    fn refill(&mut self) -> io::Result<bool> {
        let mut chunk = std::mem::take(&mut self.carry);
        let start = chunk.len();
        chunk.resize(start + Self::CHUNK, 0);
        let n = loop {
            match self.inner.read(&mut chunk[start..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        chunk.truncate(start + n);
        let at_eof = n == 0;

        self.out.clear();
        self.pos = 0;

        let mut i = 0;
        while i < chunk.len() {
            let b = Self::sanitize_byte(chunk[i]);
            if b == b'&' {
                match Self::entity_status(&chunk[i..]) {
                    EntityStatus::Valid => self.out.push(b),
                    EntityStatus::Incomplete if !at_eof => {
                        self.carry = chunk[i..].to_vec();
                        break;
                    }
                    _ => self.out.extend_from_slice(b"&amp;"),
                }
            } else {
                self.out.push(b);
            }
            i += 1;
        }

        Ok(!(at_eof && self.out.is_empty()))
    }
}

impl<R: Read> Read for SanitizingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let to_copy = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(to_copy);
        Ok(to_copy)
    }
}

impl<R: Read> BufRead for SanitizingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.out.len() {
            if !self.refill()? {
                break;
            }
        }
        Ok(&self.out[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.out.len());
    }
}
