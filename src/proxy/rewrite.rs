// src/proxy/rewrite.rs
// =============================================================================
// Makes cached pages self-consistent when served from a different base URL.
//
// Textual bodies (HTML, CSS, JS, JSON, XML) are decoded with their declared
// charset, every "http(s)://<origin-host>" and bare "//<origin-host>" is
// replaced by the gateway's own base, and the text is re-encoded in the same
// charset. Binary bodies pass through untouched.
// =============================================================================

use crate::error::{ArchiveError, Result};
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use url::{Position, Url};

static CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)charset=([^;]+)").expect("charset pattern is valid"));

pub fn is_textual(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("text/")
        || ct.contains("javascript")
        || ct.starts_with("application/json")
        || ct.starts_with("application/xml")
        || ct.starts_with("application/xhtml")
}

pub fn is_html(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

// The charset label from a content-type header, if any
fn declared_charset(content_type: &str) -> Option<&str> {
    CHARSET
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_matches('"'))
}

fn encoding_for(content_type: &str) -> &'static Encoding {
    declared_charset(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8)
}

/// Decodes a body using the charset in `content_type` (UTF-8 by default).
/// Malformed sequences become U+FFFD instead of failing.
pub fn decode_text(body: &[u8], content_type: &str) -> String {
    let (text, _, _) = encoding_for(content_type).decode(body);
    text.into_owned()
}

/// Literal base-address substitutions applied to textual bodies.
#[derive(Debug, Clone)]
pub struct Rewriter {
    absolute: Regex,
    protocol_relative: Regex,
    aliases: Vec<Regex>,
    local_base: String,
    local_authority: String,
}

impl Rewriter {
    pub fn new(origin: &Url, local_base: &str, also_rewrite: &[String]) -> Result<Self> {
        let origin_authority = authority(origin)?;
        let local = Url::parse(local_base).map_err(|e| ArchiveError::invalid_url(local_base, e))?;
        let local_authority = authority(&local)?;

        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| ArchiveError::Config(format!("rewrite pattern: {}", e)))
        };
        let escaped = regex::escape(&origin_authority);

        let aliases = also_rewrite
            .iter()
            .map(|base| compile(format!("(?i){}", regex::escape(base))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            absolute: compile(format!("(?i)https?://{}", escaped))?,
            // no look-behind in `regex`: keep the preceding char and put it back
            protocol_relative: compile(format!("(?i)(^|[^:])//{}", escaped))?,
            aliases,
            local_base: local_base.trim_end_matches('/').to_string(),
            local_authority,
        })
    }

    pub fn rewrite(&self, text: &str) -> String {
        let text = self.absolute.replace_all(text, NoExpand(&self.local_base));
        let replacement = format!("${{1}}//{}", self.local_authority);
        let mut text = self
            .protocol_relative
            .replace_all(&text, replacement.as_str())
            .into_owned();
        for alias in &self.aliases {
            text = alias.replace_all(&text, NoExpand(&self.local_base)).into_owned();
        }
        text
    }

    /// Decode, rewrite and re-encode a textual body in its own charset.
    pub fn rewrite_body(&self, body: &[u8], content_type: &str) -> Vec<u8> {
        let encoding = encoding_for(content_type);
        let (text, used, _) = encoding.decode(body);
        let rewritten = self.rewrite(&text);
        let (bytes, _, _) = used.encode(&rewritten);
        bytes.into_owned()
    }
}

// "host[:port]" of a URL
fn authority(url: &Url) -> Result<String> {
    if url.host_str().is_none() {
        return Err(ArchiveError::Config(format!("{} has no host", url)));
    }
    Ok(url[Position::BeforeHost..Position::AfterPort].to_string())
}
