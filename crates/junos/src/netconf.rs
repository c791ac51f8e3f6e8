//! NETCONF 1.0 framing, Junos RPC bodies and reply parsing.
//!
//! Messages are delimited by `]]>]]>`. Only the few elements the rollout
//! needs are inspected, so replies are scanned as text rather than parsed
//! into a document.

use crate::error::{Error, Result};
use std::io::{self, Read};

/// End-of-message marker for NETCONF 1.0.
pub const DELIMITER: &str = "]]>]]>";

/// Base namespace of NETCONF messages.
pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Splits a byte stream into NETCONF messages.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Read the next message, without its delimiter. `None` at end of stream.
    pub fn next_frame(&mut self) -> io::Result<Option<String>> {
        let delimiter = DELIMITER.as_bytes();
        loop {
            if let Some(pos) = self.buf.windows(delimiter.len()).position(|w| w == delimiter) {
                let frame: Vec<u8> = self.buf.drain(..pos + delimiter.len()).collect();
                let text = String::from_utf8_lossy(&frame[..pos]).trim().to_string();
                return Ok(Some(text));
            }

            let mut chunk = [0u8; 8192];
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// The client hello, advertising base 1.0 only.
pub fn client_hello() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <hello xmlns=\"{BASE_NS}\"><capabilities>\
         <capability>urn:ietf:params:netconf:base:1.0</capability>\
         </capabilities></hello>"
    )
}

/// Check that a frame is a server hello.
pub fn check_hello(frame: &str) -> Result<()> {
    if elements(frame, "hello").is_empty() {
        return Err(Error::Malformed {
            message: format!("expected hello, got: {}", preview(frame)),
        });
    }
    Ok(())
}

/// Wrap an RPC body in an `<rpc>` envelope.
pub fn envelope(message_id: u64, body: &str) -> String {
    format!("<rpc xmlns=\"{BASE_NS}\" message-id=\"{message_id}\">{body}</rpc>")
}

/// RPC bodies understood by Junos.
pub mod rpc {
    use super::escape;
    use rollout::ConfigFormat;

    /// Open a private candidate for this session.
    pub fn open_configuration() -> String {
        "<open-configuration><private/></open-configuration>".to_string()
    }

    /// Merge candidate text into the private candidate.
    pub fn load_configuration(text: &str, format: ConfigFormat) -> String {
        match format {
            ConfigFormat::Set => format!(
                "<load-configuration action=\"set\" format=\"text\">\
                 <configuration-set>{}</configuration-set></load-configuration>",
                escape(text)
            ),
            ConfigFormat::Text => format!(
                "<load-configuration action=\"merge\" format=\"text\">\
                 <configuration-text>{}</configuration-text></load-configuration>",
                escape(text)
            ),
        }
    }

    /// Difference between candidate and active configuration.
    pub fn compare_configuration() -> String {
        "<get-configuration compare=\"rollback\" rollback=\"0\" format=\"text\"/>".to_string()
    }

    /// Validate the candidate without activating it.
    pub fn commit_check() -> String {
        "<commit-configuration><check/></commit-configuration>".to_string()
    }

    /// Activate the candidate.
    pub fn commit() -> String {
        "<commit-configuration/>".to_string()
    }

    /// Reset the candidate to the active configuration.
    pub fn rollback() -> String {
        "<load-configuration rollback=\"0\"/>".to_string()
    }

    /// Release the private candidate.
    pub fn close_configuration() -> String {
        "<close-configuration/>".to_string()
    }

    /// End the session.
    pub fn close_session() -> String {
        "<close-session/>".to_string()
    }
}

/// One `<rpc-error>` from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// `error` or `warning`
    pub severity: String,
    /// Human readable message
    pub message: String,
}

impl RpcError {
    /// Whether this entry makes the request fail.
    pub fn is_error(&self) -> bool {
        self.severity.eq_ignore_ascii_case("error")
    }
}

/// Extract every `<rpc-error>` from a reply.
pub fn rpc_errors(reply: &str) -> Vec<RpcError> {
    elements(reply, "rpc-error")
        .into_iter()
        .map(|block| {
            let severity = element_text(block, "error-severity").unwrap_or_else(|| "error".to_string());
            let message = element_text(block, "error-message").unwrap_or_else(|| {
                element_text(block, "error-tag").unwrap_or_else(|| "unspecified error".to_string())
            });
            let message = match element_text(block, "bad-element") {
                Some(bad) => format!("{message} (at '{bad}')"),
                None => message,
            };
            RpcError { severity, message }
        })
        .collect()
}

/// Check that `reply` is an `<rpc-reply>` without errors of severity `error`.
///
/// Warnings are logged and ignored.
pub fn check_reply(reply: &str) -> Result<()> {
    if elements(reply, "rpc-reply").is_empty() {
        return Err(Error::Malformed {
            message: format!("expected rpc-reply, got: {}", preview(reply)),
        });
    }

    let (errors, warnings): (Vec<_>, Vec<_>) = rpc_errors(reply).into_iter().partition(RpcError::is_error);
    for warning in &warnings {
        log::debug!("device warning: {}", warning.message);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Rpc {
            message: errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        })
    }
}

/// The text diff from a compare reply; `None` when the diff is blank.
pub fn configuration_output(reply: &str) -> Option<String> {
    element_text(reply, "configuration-output").filter(|text| !text.is_empty())
}

/// The `message-id` attribute of the `<rpc-reply>` element, if any.
pub fn reply_message_id(reply: &str) -> Option<u64> {
    let mut rest = reply;
    while let Some(open) = rest.find('<') {
        let tag = &rest[open + 1..];
        let end = tag.find('>')?;
        let head = &tag[..end];
        let name = head
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or(head);
        if name.rsplit(':').next() == Some("rpc-reply") {
            return attribute(head, "message-id")?.parse().ok();
        }
        rest = &tag[end + 1..];
    }
    None
}

/// Value of an attribute inside a start tag.
fn attribute<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = head;
    while let Some(pos) = rest.find(name) {
        let after = &rest[pos + name.len()..];
        if rest[..pos].ends_with(char::is_whitespace) {
            if let Some(value) = after.trim_start().strip_prefix('=') {
                let value = value.trim_start();
                let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
                let inner = &value[1..];
                return inner.find(quote).map(|end| &inner[..end]);
            }
        }
        rest = after;
    }
    None
}

/// Inner content of every element with the given local name.
///
/// Namespace prefixes are ignored. Self-closing elements yield `""`.
fn elements<'a>(xml: &'a str, name: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = xml;
    let mut offset = 0;

    while let Some(open) = rest.find('<') {
        let start = offset + open;
        let tag_area = &xml[start + 1..];
        let tag_len = tag_area
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(tag_area.len());
        let tag = &tag_area[..tag_len];
        let local = tag.rsplit(':').next().unwrap_or(tag);

        let Some(close) = tag_area.find('>') else {
            break;
        };
        let after_start = start + 1 + close + 1;

        if local == name {
            if tag_area[..close].ends_with('/') {
                found.push("");
            } else {
                let end_tag = format!("</{tag}>");
                if let Some(end) = xml[after_start..].find(&end_tag) {
                    found.push(&xml[after_start..after_start + end]);
                    let next = after_start + end + end_tag.len();
                    offset = next;
                    rest = &xml[next..];
                    continue;
                }
            }
        }

        offset = after_start;
        rest = &xml[after_start..];
    }

    found
}

/// Unescaped, trimmed text of the first element with the given local name.
fn element_text(xml: &str, name: &str) -> Option<String> {
    elements(xml, name)
        .first()
        .map(|inner| unescape(inner).trim().to_string())
}

/// Escape text for an XML element body.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolve the predefined and numeric XML entities.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };

        let entity = &tail[1..semi];
        let resolved = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                .and_then(|code| code.ok())
                .and_then(char::from_u32),
        };

        match resolved {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(120).collect();
    if text.chars().count() > 120 {
        preview.push_str("...");
    }
    preview
}
