// src/sitemap/mod.rs
// =============================================================================
// This module turns sitemap URLs into a stream of page URLs to check.
//
// Submodules:
// - fetch: Downloads a sitemap (plain or gzip) as a streaming reader
// - decode: Pulls <url><loc> entries out of the XML one at a time
// - fanout: Runs one task per sitemap, all writing into the shared queue
// =============================================================================

mod decode;
mod fanout;
mod fetch;

pub use fanout::{FanOut, SitemapFailure, SitemapSummary};
