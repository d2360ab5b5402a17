// src/sitemap/fetch.rs
// =============================================================================
// This module downloads a sitemap and hands back its body as a reader.
//
// Strategy:
// - GET the sitemap URL (the shared client adds our User-Agent)
// - Anything other than a 2xx status is a FetchError
// - Plain XML is streamed: the HTTP body is wrapped in a StreamReader and
//   fed straight into the XML decoder, never fully buffered
// - Gzip sitemaps (sitemap.xml.gz) are usually served as raw gzip files,
//   not with Content-Encoding, so reqwest cannot unpack them for us. Those
//   are buffered, checked for the gzip magic bytes and decompressed
//
// Rust concepts:
// - Trait objects: Box<dyn AsyncBufRead> lets both paths return one type
// - spawn_blocking: flate2 is synchronous, so decompression runs on
//   tokio's blocking thread pool
// =============================================================================

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;

use crate::checker::error_chain;
use crate::error::CheckError;

/// A sitemap body ready to be decoded.
pub type SitemapBody = Box<dyn AsyncBufRead + Send + Unpin>;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Downloads a sitemap.
///
/// Returns a reader over the (decompressed) XML.
pub async fn fetch_sitemap(client: &Client, source: &str) -> Result<SitemapBody, CheckError> {
    let response = client
        .get(source)
        .send()
        .await
        .map_err(|e| CheckError::fetch(source, error_chain(&e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CheckError::fetch(source, format!("HTTP {}", status.as_u16())));
    }

    if may_be_gzipped(source, &response) {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CheckError::fetch(source, error_chain(&e)))?;
        let xml = gunzip_if_needed(source, bytes.to_vec()).await?;
        return Ok(Box::new(Cursor::new(xml)));
    }

    let stream = response.bytes_stream().map_err(std::io::Error::other);
    Ok(Box::new(StreamReader::new(Box::pin(stream))))
}

// Either the URL or the Content-Type hints at a gzip file
fn may_be_gzipped(source: &str, response: &Response) -> bool {
    let path_hint = response.url().path().ends_with(".gz") || source.ends_with(".gz");

    let type_hint = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    path_hint || type_hint
}

// Only the magic bytes decide: a .gz URL served with Content-Encoding: gzip
// has already been decoded by reqwest
async fn gunzip_if_needed(source: &str, bytes: Vec<u8>) -> Result<Vec<u8>, CheckError> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }

    tokio::task::spawn_blocking(move || gunzip(&bytes))
        .await
        .map_err(|e| CheckError::decode(source, e))?
        .map_err(|e| CheckError::decode(source, format!("invalid gzip data: {e}")))
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut xml = Vec::new();
    decoder.read_to_end(&mut xml)?;
    Ok(xml)
}
