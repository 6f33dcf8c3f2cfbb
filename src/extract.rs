use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::config::SelectorConfig;
use crate::error::CrawlError;
use crate::record::{FieldValue, ProductRecord};

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").unwrap());
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d,]*").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

/// Selector expressions compiled once per crawl target. A field whose
/// expression was empty compiles to `None` and simply never matches.
pub struct CompiledSelectors {
    products: Option<Selector>,
    title: Option<Selector>,
    price_whole: Option<Selector>,
    price_fraction: Option<Selector>,
    price_currency: Option<Selector>,
    product_link: Option<Selector>,
    rate: Option<Selector>,
    num_of_rates: Option<Selector>,
    categories: Option<Selector>,
    product_info: Option<Selector>,
    info_key: Option<Selector>,
    info_value: Option<Selector>,
    next_page: Option<Selector>,
}

impl CompiledSelectors {
    pub fn compile(cfg: &SelectorConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            products: compile_one(&cfg.products_selector)?,
            title: compile_one(&cfg.title_selector)?,
            price_whole: compile_one(&cfg.price_whole_selector)?,
            price_fraction: compile_one(&cfg.price_fraction_selector)?,
            price_currency: compile_one(&cfg.price_currency_selector)?,
            product_link: compile_one(&cfg.product_link_selector)?,
            rate: compile_one(&cfg.rate_selector)?,
            num_of_rates: compile_one(&cfg.num_of_rates_selector)?,
            categories: compile_one(&cfg.categories_selector)?,
            product_info: compile_one(&cfg.product_info_selector)?,
            info_key: compile_one(&cfg.product_info_key_selector)?,
            info_value: compile_one(&cfg.product_info_value_selector)?,
            next_page: compile_one(&cfg.next_page_selector)?,
        })
    }
}

// An empty expression is a deliberately absent field; a malformed one is a
// configuration error.
fn compile_one(expr: &str) -> Result<Option<Selector>, CrawlError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(None);
    }
    Selector::parse(expr).map(Some).map_err(|e| CrawlError::Selector {
        expr: expr.to_string(),
        message: e.to_string(),
    })
}

/// One parsed listing page.
pub struct ListingPage {
    /// Accepted products (non-empty title and link), listing fields set.
    pub products: Vec<ProductRecord>,
    /// Raw count of nodes the products selector matched, before filtering.
    pub matched: usize,
    pub has_next: bool,
}

/// Parse a listing page into per-product records carrying the fixed fields:
/// title, price, price_currency, product_link. Products missing a title or
/// a link are dropped entirely.
pub fn parse_listing(html: &str, sel: &CompiledSelectors, base_url: &str) -> ListingPage {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let nodes: Vec<ElementRef> = match &sel.products {
        Some(s) => root.select(s).collect(),
        None => Vec::new(),
    };
    let matched = nodes.len();

    let mut products = Vec::new();
    for node in nodes {
        let title = first_text(node, &sel.title);
        let link = first_attr(node, &sel.product_link, "href");
        let link = link.trim();
        if title.is_empty() || link.is_empty() {
            continue;
        }

        let whole = first_text(node, &sel.price_whole);
        let fraction = first_text(node, &sel.price_fraction);
        let currency = first_text(node, &sel.price_currency);

        let mut record = ProductRecord::new();
        record.insert("title".into(), FieldValue::Text(title));
        record.insert("price".into(), assemble_price(&whole, &fraction));
        record.insert("price_currency".into(), FieldValue::Text(currency));
        record.insert(
            "product_link".into(),
            FieldValue::Text(format!("{}{}", base_url, link)),
        );
        products.push(record);
    }

    let has_next = sel
        .next_page
        .as_ref()
        .is_some_and(|s| root.select(s).next().is_some());

    ListingPage {
        products,
        matched,
        has_next,
    }
}

/// Extract the detail-page fields for one product: rating, rating count,
/// deepest breadcrumb category, and the specification table. Each field
/// fails independently; a parse failure yields null, never an error.
pub fn detail_fields(doc: &Html, sel: &CompiledSelectors) -> ProductRecord {
    let root = doc.root_element();
    let mut fields = ProductRecord::new();

    fields.insert("product_rate".into(), parse_rate(&first_text(root, &sel.rate)));
    fields.insert(
        "product_rate_count".into(),
        parse_count(&first_text(root, &sel.num_of_rates)),
    );

    // Breadcrumbs list the category path root-first; the last match is the
    // most specific entry.
    let category = sel
        .categories
        .as_ref()
        .and_then(|s| root.select(s).last())
        .map(element_text)
        .unwrap_or_default();
    fields.insert("category".into(), FieldValue::Text(category));

    if let Some(info) = sel.product_info.as_ref().and_then(|s| root.select(s).next()) {
        for row in info.select(&TR) {
            let key = first_text(row, &sel.info_key);
            let value = first_text(row, &sel.info_value);
            if key.is_empty() || value.is_empty() {
                continue;
            }
            fields.insert(normalize_key(&key), FieldValue::Text(value));
        }
    }

    fields
}

/// First decimal-number substring parsed as a float; anything else is null.
pub fn parse_rate(text: &str) -> FieldValue {
    DECIMAL_RE
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(FieldValue::Float)
        .unwrap_or(FieldValue::Null)
}

/// First digit run (thousands separators allowed) parsed as an integer.
pub fn parse_count(text: &str) -> FieldValue {
    COUNT_RE
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse::<i64>().ok())
        .map(FieldValue::Int)
        .unwrap_or(FieldValue::Null)
}

/// Join the whole and fractional price parts and parse as a float. Both
/// parts must be non-empty. The whole part may carry thousands separators
/// and a trailing decimal point ("1,299."); both are tolerated.
pub fn assemble_price(whole: &str, fraction: &str) -> FieldValue {
    let whole = whole.trim().replace(',', "");
    let whole = whole.trim_end_matches('.');
    let fraction = fraction.trim();
    if whole.is_empty() || fraction.is_empty() {
        return FieldValue::Null;
    }
    format!("{}.{}", whole, fraction)
        .parse::<f64>()
        .map(FieldValue::Float)
        .unwrap_or(FieldValue::Null)
}

/// Spec-table keys: lowercase, internal whitespace runs collapsed to a
/// single underscore.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn first_text(scope: ElementRef, sel: &Option<Selector>) -> String {
    sel.as_ref()
        .and_then(|s| scope.select(s).next())
        .map(element_text)
        .unwrap_or_default()
}

fn first_attr(scope: ElementRef, sel: &Option<Selector>, attr: &str) -> String {
    sel.as_ref()
        .and_then(|s| scope.select(s).next())
        .and_then(|el| el.value().attr(attr))
        .unwrap_or_default()
        .to_string()
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}
