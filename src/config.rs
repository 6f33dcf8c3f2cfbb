use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

const AMAZON_BASE_URL: &str = "https://www.amazon.com";

/// Logical field name -> CSS selector expression, supplied per crawl target.
/// An empty expression means the field is never extracted (the record gets
/// an empty/null value); it is not an error.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub products_selector: String,
    pub title_selector: String,
    pub price_whole_selector: String,
    pub price_fraction_selector: String,
    pub price_currency_selector: String,
    pub product_link_selector: String,
    pub rate_selector: String,
    pub num_of_rates_selector: String,
    pub categories_selector: String,
    pub product_info_selector: String,
    pub product_info_key_selector: String,
    pub product_info_value_selector: String,
    pub next_page_selector: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            products_selector: String::new(),
            title_selector: String::new(),
            price_whole_selector: String::new(),
            price_fraction_selector: String::new(),
            price_currency_selector: String::new(),
            product_link_selector: String::new(),
            rate_selector: String::new(),
            num_of_rates_selector: String::new(),
            categories_selector: String::new(),
            product_info_selector: String::new(),
            product_info_key_selector: String::new(),
            product_info_value_selector: String::new(),
            next_page_selector: default_next_page(),
        }
    }
}

fn default_next_page() -> String {
    "a.s-pagination-next".to_string()
}

/// One crawl target: where to start, how to page, where the snapshot goes.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlTarget {
    pub name: String,
    pub base_url: String,
    /// URL suffix with an embedded `page=N` placeholder. The current page
    /// number is substituted in and then appended, since the suffix ends
    /// mid-parameter (`...ref=sr_pg_`).
    pub url_suffix: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    pub data_path: PathBuf,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

fn default_page_limit() -> u32 {
    1
}

pub fn from_json_file(path: &Path) -> Result<CrawlTarget> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading crawl target {}", path.display()))?;
    let target = serde_json::from_str(&raw)
        .with_context(|| format!("parsing crawl target {}", path.display()))?;
    Ok(target)
}

/// Mobile-phones category listing, ordered by popularity.
pub fn by_category() -> CrawlTarget {
    CrawlTarget {
        name: "by-category".into(),
        base_url: AMAZON_BASE_URL.into(),
        url_suffix: "/s?i=mobile&page=1&rh=n%3A7072561011&s=popularity-rank&fs=true&ref=sr_pg_"
            .into(),
        page_limit: 1,
        data_path: PathBuf::from("amazon_data_by_category.json"),
        selectors: amazon_selectors(
            "div.sg-col-4-of-24.sg-col-4-of-12.s-result-item",
            "h2.a-size-base-plus.a-spacing-none.a-color-base.a-text-normal",
            "a.a-link-normal.s-line-clamp-4.s-link-style.a-text-normal",
        ),
    }
}

/// Keyword search listing. The keyword is already URL-encoded (`+`-joined).
pub fn by_keyword(keyword: &str) -> CrawlTarget {
    CrawlTarget {
        name: "by-keyword".into(),
        base_url: AMAZON_BASE_URL.into(),
        url_suffix: format!("/s?k={}&page=1&s=popularity-rank&ref=sr_pg_", keyword),
        page_limit: 1,
        data_path: PathBuf::from("amazon_data_by_keyword.json"),
        selectors: amazon_selectors(
            "div.sg-col-20-of-24.s-result-item",
            "h2.a-size-medium.a-spacing-none.a-color-base.a-text-normal",
            "a.a-link-normal.s-line-clamp-2.s-link-style.a-text-normal",
        ),
    }
}

// The two built-in targets share every detail-page selector; only the
// listing-side markup differs between category and keyword result pages.
fn amazon_selectors(products: &str, title: &str, product_link: &str) -> SelectorConfig {
    SelectorConfig {
        products_selector: products.into(),
        title_selector: title.into(),
        price_whole_selector: "span.a-price-whole".into(),
        price_fraction_selector: "span.a-price-fraction".into(),
        price_currency_selector: "span.a-price-symbol".into(),
        product_link_selector: product_link.into(),
        rate_selector: "i.a-icon.a-icon-star.cm-cr-review-stars-spacing-big".into(),
        num_of_rates_selector: "#acrCustomerReviewLink #acrCustomerReviewText".into(),
        categories_selector:
            "#wayfinding-breadcrumbs_feature_div ul li a.a-link-normal.a-color-tertiary".into(),
        product_info_selector: "#productOverview_feature_div table".into(),
        product_info_key_selector: "td.a-span3 span.a-size-base.a-text-bold".into(),
        product_info_value_selector: "td.a-span9 span.a-size-base.po-break-word".into(),
        next_page_selector: default_next_page(),
    }
}
