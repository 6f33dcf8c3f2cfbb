use thiserror::Error;

/// Errors surfaced by the crawl phase. Field-level parse failures are not
/// represented here: they degrade to a null field value (see extract.rs).
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid selector '{expr}': {message}")]
    Selector { expr: String, message: String },
}
