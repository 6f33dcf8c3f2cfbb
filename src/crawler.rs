use std::sync::LazyLock;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::config::CrawlTarget;
use crate::extract::{self, CompiledSelectors};
use crate::fetch::{DelayPolicy, Fetcher};
use crate::record::{FieldValue, ProductRecord};

static PAGE_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"page=\d+").unwrap());

/// Sequential pagination driver: one listing page is fetched and fully
/// processed, detail fetches included, before the next page begins.
pub struct Crawler {
    fetcher: Fetcher,
    delay: DelayPolicy,
    product_counter: usize,
}

impl Crawler {
    pub fn new(fetcher: Fetcher, delay: DelayPolicy) -> Self {
        Self {
            fetcher,
            delay,
            product_counter: 0,
        }
    }

    /// Crawl listing pages for `target` up to its page limit and return the
    /// accumulated batch. The run ends early on a page fetch failure, an
    /// empty results page, or a missing next-page control; whatever was
    /// collected up to that point is kept.
    pub async fn products_scrape(&mut self, target: &CrawlTarget) -> Result<Vec<ProductRecord>> {
        let selectors = CompiledSelectors::compile(&target.selectors)?;
        let mut batch: Vec<ProductRecord> = Vec::new();
        let mut page_number: u32 = 1;

        loop {
            if page_number > target.page_limit {
                break;
            }
            let url = page_url(&target.base_url, &target.url_suffix, page_number);
            info!("scraping page {}: {}", page_number, url);

            let html = match self.fetcher.get(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("stopping run, page {} failed: {}", page_number, e);
                    break;
                }
            };

            let listing = extract::parse_listing(&html, &selectors, &target.base_url);
            if listing.matched == 0 {
                info!("page {} has no products, end of catalog", page_number);
                break;
            }

            let pb = ProgressBar::new(listing.products.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} products")?
                    .progress_chars("=> "),
            );

            for mut record in listing.products {
                let detail = self.single_product_scrape(&record, &selectors).await;
                for (key, value) in detail {
                    // Listing-derived fields win on collision.
                    record.entry(key).or_insert(value);
                }
                batch.push(record);
                pb.inc(1);
            }
            pb.finish_and_clear();

            if !listing.has_next {
                info!("no next-page control on page {}, stopping", page_number);
                break;
            }
            page_number += 1;
            self.delay.pause().await;
        }

        Ok(batch)
    }

    /// Fetch and extract one product's detail page. A failure here is
    /// isolated to this product: the listing fields stand and the record
    /// simply gains no detail fields.
    async fn single_product_scrape(
        &mut self,
        record: &ProductRecord,
        selectors: &CompiledSelectors,
    ) -> ProductRecord {
        let url = match record.get("product_link").and_then(FieldValue::as_str) {
            Some(url) => url.to_string(),
            None => return ProductRecord::new(),
        };

        self.product_counter += 1;
        debug!("scraping product {}: {}", self.product_counter, url);
        self.delay.pause().await;

        let html = match self.fetcher.get(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("detail fetch failed, keeping listing fields only: {}", e);
                return ProductRecord::new();
            }
        };

        let doc = Html::parse_document(&html);
        extract::detail_fields(&doc, selectors)
    }
}

/// Build the listing URL for `page_number`: substitute the embedded page
/// parameter, then append the page number, since the suffix ends
/// mid-parameter (`...ref=sr_pg_`).
fn page_url(base_url: &str, url_suffix: &str, page_number: u32) -> String {
    let url = format!("{}{}", base_url, url_suffix);
    let url = PAGE_PARAM_RE.replace(&url, format!("page={}", page_number).as_str());
    format!("{}{}", url, page_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlTarget, SelectorConfig};

    const LISTING_WITH_NEXT: &str = r##"
        <div class="result">
            <h2 class="title">Widget Phone</h2>
            <span class="whole">19.</span><span class="fraction">99</span>
            <span class="currency">$</span>
            <a class="link" href="/dp/1">Widget Phone</a>
        </div>
        <a class="next" href="#">Next</a>
    "##;

    const LISTING_LAST_PAGE: &str = r#"
        <div class="result">
            <h2 class="title">Last Phone</h2>
            <span class="whole">5.</span><span class="fraction">00</span>
            <span class="currency">$</span>
            <a class="link" href="/dp/2">Last Phone</a>
        </div>
    "#;

    const LISTING_EMPTY: &str = r#"<p>No results found.</p>"#;

    // The Title spec row collides with the fixed listing field after
    // normalization; the listing value must survive the merge.
    const DETAIL_HTML: &str = r#"
        <i class="stars">4.5 out of 5 stars</i>
        <span class="reviews">1,234 ratings</span>
        <ul class="crumbs"><li><a>Electronics</a></li><li><a>Smartphones</a></li></ul>
        <table class="info">
            <tr><td class="k">Screen Size</td><td class="v">6.1 inches</td></tr>
            <tr><td class="k">Title</td><td class="v">Detail-page title</td></tr>
        </table>
    "#;

    fn selectors() -> SelectorConfig {
        SelectorConfig {
            products_selector: "div.result".into(),
            title_selector: "h2.title".into(),
            price_whole_selector: "span.whole".into(),
            price_fraction_selector: "span.fraction".into(),
            price_currency_selector: "span.currency".into(),
            product_link_selector: "a.link".into(),
            rate_selector: "i.stars".into(),
            num_of_rates_selector: "span.reviews".into(),
            categories_selector: "ul.crumbs li a".into(),
            product_info_selector: "table.info".into(),
            product_info_key_selector: "td.k".into(),
            product_info_value_selector: "td.v".into(),
            next_page_selector: "a.next".into(),
        }
    }

    fn target(server: &mockito::ServerGuard, page_limit: u32) -> CrawlTarget {
        CrawlTarget {
            name: "test".into(),
            base_url: server.url(),
            url_suffix: "/catalog?page=1&ref=pg_".into(),
            page_limit,
            data_path: "unused.json".into(),
            selectors: selectors(),
        }
    }

    fn crawler() -> Crawler {
        Crawler::new(Fetcher::new().unwrap(), DelayPolicy::new(0, 0))
    }

    #[test]
    fn page_url_substitutes_and_appends() {
        assert_eq!(
            page_url("https://shop.example", "/s?page=1&ref=sr_pg_", 3),
            "https://shop.example/s?page=3&ref=sr_pg_3"
        );
        // No embedded placeholder: only the append applies.
        assert_eq!(
            page_url("https://shop.example", "/s?ref=sr_pg_", 2),
            "https://shop.example/s?ref=sr_pg_2"
        );
    }

    #[tokio::test]
    async fn collects_listing_and_detail_fields() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/catalog?page=1&ref=pg_1")
            .with_body(LISTING_LAST_PAGE)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/dp/2")
            .with_body(DETAIL_HTML)
            .create_async()
            .await;

        let batch = crawler().products_scrape(&target(&server, 1)).await.unwrap();
        assert_eq!(batch.len(), 1);

        let record = &batch[0];
        assert_eq!(record["title"], FieldValue::Text("Last Phone".into()));
        assert_eq!(record["price"], FieldValue::Float(5.0));
        assert_eq!(record["product_rate"], FieldValue::Float(4.5));
        assert_eq!(record["product_rate_count"], FieldValue::Int(1234));
        assert_eq!(record["category"], FieldValue::Text("Smartphones".into()));
        assert_eq!(record["screen_size"], FieldValue::Text("6.1 inches".into()));
    }

    #[tokio::test]
    async fn listing_fields_win_over_detail_fields() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/catalog?page=1&ref=pg_1")
            .with_body(LISTING_LAST_PAGE)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/dp/2")
            .with_body(DETAIL_HTML)
            .create_async()
            .await;

        let batch = crawler().products_scrape(&target(&server, 1)).await.unwrap();
        assert_eq!(batch[0]["title"], FieldValue::Text("Last Phone".into()));
    }

    #[tokio::test]
    async fn page_limit_caps_the_run_despite_next_control() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("GET", "/catalog?page=1&ref=pg_1")
            .with_body(LISTING_WITH_NEXT)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/dp/1")
            .with_body(DETAIL_HTML)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/catalog?page=2&ref=pg_2")
            .with_body(LISTING_LAST_PAGE)
            .expect(0)
            .create_async()
            .await;

        let batch = crawler().products_scrape(&target(&server, 1)).await.unwrap();
        assert_eq!(batch.len(), 1);
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn empty_results_page_ends_the_run_cleanly() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("GET", "/catalog?page=1&ref=pg_1")
            .with_body(LISTING_WITH_NEXT)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/dp/1")
            .with_body(DETAIL_HTML)
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", "/catalog?page=2&ref=pg_2")
            .with_body(LISTING_EMPTY)
            .create_async()
            .await;

        let batch = crawler().products_scrape(&target(&server, 5)).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn missing_next_control_stops_before_the_limit() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("GET", "/catalog?page=1&ref=pg_1")
            .with_body(LISTING_LAST_PAGE)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/dp/2")
            .with_body(DETAIL_HTML)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/catalog?page=2&ref=pg_2")
            .with_body(LISTING_LAST_PAGE)
            .expect(0)
            .create_async()
            .await;

        let batch = crawler().products_scrape(&target(&server, 3)).await.unwrap();
        assert_eq!(batch.len(), 1);
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn page_fetch_failure_keeps_what_was_collected() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("GET", "/catalog?page=1&ref=pg_1")
            .with_body(LISTING_WITH_NEXT)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/dp/1")
            .with_body(DETAIL_HTML)
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", "/catalog?page=2&ref=pg_2")
            .with_status(500)
            .create_async()
            .await;

        let batch = crawler().products_scrape(&target(&server, 5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["title"], FieldValue::Text("Widget Phone".into()));
    }

    #[tokio::test]
    async fn detail_fetch_failure_keeps_listing_fields() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/catalog?page=1&ref=pg_1")
            .with_body(LISTING_LAST_PAGE)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/dp/2")
            .with_status(500)
            .create_async()
            .await;

        let batch = crawler().products_scrape(&target(&server, 1)).await.unwrap();
        assert_eq!(batch.len(), 1);

        let record = &batch[0];
        assert_eq!(record["title"], FieldValue::Text("Last Phone".into()));
        assert_eq!(record["price"], FieldValue::Float(5.0));
        assert!(!record.contains_key("product_rate"));
        assert!(!record.contains_key("category"));
    }
}
