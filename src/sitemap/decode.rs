// src/sitemap/decode.rs
// =============================================================================
// This module pulls URLs out of a sitemap document, one at a time.
//
// A sitemap looks like:
//
//   <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//     <url><loc>https://example.com/a</loc><lastmod>...</lastmod></url>
//     <url><loc>https://example.com/b</loc></url>
//   </urlset>
//
// We only care about the text inside <url><loc>. Everything else (lastmod,
// priority, changefreq, ...) is skipped.
//
// Why streaming?
// - Sitemaps can hold 50,000 URLs and be tens of megabytes
// - quick-xml reads token by token straight from the HTTP body, so memory
//   stays flat no matter how large the document is
// - The caller asks for the next URL only when the queue has room for it,
//   which is how backpressure reaches the network
//
// Rust concepts:
// - Generics: SitemapDecoder<R> works over any async buffered reader
//   (an HTTP body stream in production, a byte slice in tests)
// - State machines: a few fields remember where in the document we are
// =============================================================================

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tokio::io::AsyncBufRead;

/// What the root element of the document says it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `<urlset>`: a regular sitemap.
    UrlSet,
    /// `<sitemapindex>`: a list of other sitemaps (not followed).
    SitemapIndex,
    /// Some other root element; `<url>` entries are still honored.
    Other,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("unexpected end of document ({open} element(s) left open)")]
    UnexpectedEof { open: usize },

    #[error("document has no root element")]
    NoRootElement,

    #[error("invalid UTF-8 in CDATA at byte {position}: {source}")]
    InvalidUtf8 {
        position: u64,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Streaming pull decoder for `<url><loc>` entries.
pub struct SitemapDecoder<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    // Number of currently open elements.
    depth: usize,
    // Depth of the <url> element we are inside, if any.
    url_depth: Option<usize>,
    in_loc: bool,
    loc: String,
    kind: Option<DocumentKind>,
}

impl<R: AsyncBufRead + Unpin> SitemapDecoder<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);

        Self {
            reader,
            buf: Vec::new(),
            depth: 0,
            url_depth: None,
            in_loc: false,
            loc: String::new(),
            kind: None,
        }
    }

    /// The kind of document, known once the root element has been read.
    pub fn kind(&self) -> Option<DocumentKind> {
        self.kind
    }

    /// Reads until the next complete `<url>` entry and returns its location.
    ///
    /// Returns `Ok(None)` at the end of the document. `<url>` elements
    /// without a (non-blank) `<loc>` are skipped. A document that ends
    /// before any element was opened is an error.
    pub async fn next_url(&mut self) -> Result<Option<String>, DecodeError> {
        loop {
            self.buf.clear();

            let event = match self.reader.read_event_into_async(&mut self.buf).await {
                Ok(event) => event,
                Err(source) => {
                    return Err(DecodeError::Xml {
                        position: self.reader.buffer_position() as u64,
                        source,
                    })
                }
            };

            match event {
                Event::Start(e) => {
                    self.depth += 1;
                    let name = e.local_name();

                    if self.depth == 1 {
                        self.kind = Some(root_kind(name.as_ref()));
                    }

                    match name.as_ref() {
                        b"url" if self.url_depth.is_none() => {
                            self.url_depth = Some(self.depth);
                            self.loc.clear();
                        }
                        // <loc> must be a direct child of <url>; the first
                        // non-blank one wins
                        b"loc" if self.url_depth == Some(self.depth - 1) => {
                            if self.loc.trim().is_empty() {
                                self.loc.clear();
                                self.in_loc = true;
                            }
                        }
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    // A self-closing root, e.g. `<urlset/>`
                    if self.depth == 0 {
                        self.kind = Some(root_kind(e.local_name().as_ref()));
                    }
                }
                Event::Text(e) if self.in_loc => {
                    let text = e.unescape().map_err(|source| DecodeError::Xml {
                        position: self.reader.buffer_position() as u64,
                        source: source.into(),
                    })?;
                    self.loc.push_str(&text);
                }
                Event::CData(e) if self.in_loc => {
                    let text =
                        std::str::from_utf8(&e).map_err(|source| DecodeError::InvalidUtf8 {
                            position: self.reader.buffer_position() as u64,
                            source,
                        })?;
                    self.loc.push_str(text);
                }
                Event::End(e) => {
                    let closing_url = self.url_depth == Some(self.depth);
                    self.depth = self.depth.saturating_sub(1);

                    if e.local_name().as_ref() == b"loc" {
                        self.in_loc = false;
                    }

                    if closing_url {
                        self.url_depth = None;
                        let loc = self.loc.trim();
                        if !loc.is_empty() {
                            let url = loc.to_string();
                            self.loc.clear();
                            return Ok(Some(url));
                        }
                    }
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(DecodeError::UnexpectedEof { open: self.depth });
                    }
                    // Empty body, plain text, an HTML error page without
                    // a single element...
                    if self.kind.is_none() {
                        return Err(DecodeError::NoRootElement);
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

fn root_kind(name: &[u8]) -> DocumentKind {
    match name {
        b"urlset" => DocumentKind::UrlSet,
        b"sitemapindex" => DocumentKind::SitemapIndex,
        _ => DocumentKind::Other,
    }
}
