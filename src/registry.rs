//! Endpoint registry (C3): the service catalog, loaded once and held
//! read-only for the life of the process.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;
use std::str;

use crate::error::RemoteError;

/// Password hashing scheme advertised by a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Plain,
    Md5,
    Sha1,
    Sha256,
    None,
}

impl AuthMethod {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "plain" => Self::Plain,
            "md5" => Self::Md5,
            "sha1" | "sha-1" => Self::Sha1,
            "sha256" | "sha-256" => Self::Sha256,
            _ => Self::None,
        }
    }
}

/// One `<option>` entry: a remote-lab service the host can connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOption {
    pub name: String,
    pub url: String,
    pub auth: AuthMethod,
}

fn normalize_url(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// The loaded, process-wide catalog. Construct once via
/// [`EndpointRegistry::load_file`] or [`EndpointRegistry::parse`].
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    options: Vec<EndpointOption>,
}

impl EndpointRegistry {
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, RemoteError> {
        let content = fs::read_to_string(path)
            .map_err(|e| RemoteError::config_missing(format!("reading service catalog: {e}")))?;
        Self::parse(&content)
    }

    /// Parse an `endpoints` document from a string. An empty or
    /// malformed catalog yields an empty registry rather than an error —
    /// per §4.3, "an empty or malformed catalog disables the device."
    pub fn parse(xml: &str) -> Result<Self, RemoteError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut options = Vec::new();
        let mut current: Option<PartialOption> = None;
        let mut current_tag: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let tag = tag_name(e)?;
                    if tag == "option" {
                        current = Some(PartialOption::new(attr(e, "name").unwrap_or_default()));
                    }
                    current_tag = Some(tag);
                }
                Ok(Event::Text(t)) => {
                    if let (Some(opt), Some(tag)) = (current.as_mut(), current_tag.as_deref()) {
                        let text = t.unescape().unwrap_or_default().into_owned();
                        match tag {
                            "url" => opt.url = Some(text),
                            "auth" => opt.auth = Some(text),
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(ref e)) => {
                    let tag = end_tag_name(e)?;
                    if tag == "option" {
                        if let Some(opt) = current.take() {
                            if let Some(finished) = opt.finish() {
                                options.push(finished);
                            }
                        }
                    }
                    current_tag = None;
                }
                Ok(Event::Eof) => break,
                Err(_) => {
                    // Malformed catalog: stop parsing, keep whatever
                    // well-formed options were already collected.
                    break;
                }
                _ => {}
            }
        }

        Ok(Self { options })
    }

    pub fn options(&self) -> &[EndpointOption] {
        &self.options
    }

    pub fn find(&self, name: &str) -> Option<&EndpointOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

struct PartialOption {
    name: String,
    url: Option<String>,
    auth: Option<String>,
}

impl PartialOption {
    fn new(name: String) -> Self {
        Self {
            name,
            url: None,
            auth: None,
        }
    }

    fn finish(self) -> Option<EndpointOption> {
        let url = self.url?;
        Some(EndpointOption {
            name: self.name,
            url: normalize_url(url),
            auth: self
                .auth
                .map(|a| AuthMethod::parse(&a))
                .unwrap_or(AuthMethod::None),
        })
    }
}

fn tag_name(e: &BytesStart<'_>) -> Result<String, RemoteError> {
    str::from_utf8(e.name().as_ref())
        .map(str::to_owned)
        .map_err(|_| RemoteError::protocol("invalid utf-8 tag name in service catalog"))
}

fn end_tag_name(e: &quick_xml::events::BytesEnd<'_>) -> Result<String, RemoteError> {
    str::from_utf8(e.name().as_ref())
        .map(str::to_owned)
        .map_err(|_| RemoteError::protocol("invalid utf-8 tag name in service catalog"))
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.as_ref() == key.as_bytes() {
            String::from_utf8(a.value.to_vec()).ok()
        } else {
            None
        }
    })
}
