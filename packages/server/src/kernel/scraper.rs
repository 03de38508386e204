//! Brand site scraper - local HTTP + HTML parsing
//!
//! Extracts brand identity and a product catalog from an e-commerce
//! storefront:
//! - Uses reqwest for HTTP requests
//! - Uses scraper crate for HTML parsing
//! - Uses htmd for HTML to Markdown conversion (product descriptions)
//! - Shopify stores get a fast path through the public /products.json feed
//!
//! Limitations:
//! - No JavaScript rendering (static HTML and JSON feeds only)

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::jobs::JobFailure;

/// Cap on products pulled from a single store.
const MAX_PRODUCTS: usize = 250;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("site returned HTTP {0}")]
    Blocked(u16),
    #[error("could not parse site content: {0}")]
    Parse(String),
}

impl From<ScrapeError> for JobFailure {
    fn from(e: ScrapeError) -> Self {
        match e {
            // A malformed target URL won't fix itself between attempts.
            ScrapeError::InvalidUrl(_) => JobFailure::terminal(e.to_string()),
            ScrapeError::Parse(_) => JobFailure::terminal(e.to_string()),
            ScrapeError::Fetch(_) | ScrapeError::Blocked(_) => {
                JobFailure::retryable(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedBrand {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedProduct {
    pub name: String,
    /// Markdown description converted from the product's HTML body.
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub source_url: String,
    pub image_urls: Vec<String>,
    pub available: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedSite {
    pub brand: ScrapedBrand,
    pub products: Vec<ScrapedProduct>,
    pub pages_scraped: i32,
}

/// Scrapes a storefront into brand identity plus product catalog.
#[async_trait]
pub trait BrandScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedSite, ScrapeError>;
}

pub struct SiteScraper {
    client: reqwest::Client,
}

impl SiteScraper {
    pub fn new(timeout_secs: u64) -> Result<Self, ScrapeError> {
        // Browser-like User-Agent to avoid trivial bot detection
        let user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ScrapeError::Fetch(e.to_string()))?;

        Ok(Self { client })
    }

    /// Normalize URL by adding https:// if no scheme is present
    fn normalize_url(url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Blocked(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ScrapeError::Fetch(e.to_string()))
    }

    /// Try the Shopify product feed. Returns None when the site isn't a
    /// Shopify store (404, HTML error page, or unparseable JSON).
    async fn try_shopify_products(&self, base: &Url) -> Option<Vec<ScrapedProduct>> {
        let feed_url = format!(
            "{}://{}/products.json?limit={}",
            base.scheme(),
            base.host_str()?,
            MAX_PRODUCTS
        );

        let body = self.fetch_text(&feed_url).await.ok()?;
        let feed: ShopifyFeed = serde_json::from_str(&body).ok()?;

        let products = feed
            .products
            .into_iter()
            .map(|p| {
                let variant = p.variants.first();
                ScrapedProduct {
                    description: p
                        .body_html
                        .as_deref()
                        .map(html_to_markdown)
                        .filter(|d| !d.trim().is_empty()),
                    price: variant.and_then(|v| v.price.parse().ok()),
                    currency: None,
                    source_url: format!(
                        "{}://{}/products/{}",
                        base.scheme(),
                        base.host_str().unwrap_or_default(),
                        p.handle
                    ),
                    image_urls: p.images.into_iter().map(|i| i.src).collect(),
                    available: variant.map(|v| v.available).unwrap_or(true),
                    name: p.title,
                }
            })
            .collect::<Vec<_>>();

        if products.is_empty() {
            None
        } else {
            debug!(url = %feed_url, count = products.len(), "shopify product feed found");
            Some(products)
        }
    }

    fn extract_brand(document: &Html, base: &Url) -> ScrapedBrand {
        ScrapedBrand {
            name: select_text(document, "title")
                .map(|t| t.split(['|', '-']).next().unwrap_or(&t).trim().to_string())
                .filter(|t| !t.is_empty()),
            description: select_attr(document, "meta[name='description']", "content")
                .or_else(|| select_attr(document, "meta[property='og:description']", "content")),
            logo_url: select_attr(document, "meta[property='og:image']", "content")
                .or_else(|| select_attr(document, "link[rel~='icon']", "href"))
                .and_then(|href| base.join(&href).ok())
                .map(|u| u.to_string()),
        }
    }

    /// Fallback product discovery for non-Shopify sites: collect product
    /// page links from the homepage. Price and availability stay unknown.
    fn extract_product_links(document: &Html, base: &Url) -> Vec<ScrapedProduct> {
        let selector = match Selector::parse("a[href*='/products/'], a[href*='/product/']") {
            Ok(s) => s,
            Err(_) => return vec![],
        };

        let mut seen = std::collections::HashSet::new();
        document
            .select(&selector)
            .filter_map(|el| {
                let href = el.value().attr("href")?;
                let url = base.join(href).ok()?;
                let name = el.text().collect::<String>().trim().to_string();
                if name.is_empty() || !seen.insert(url.to_string()) {
                    return None;
                }
                Some(ScrapedProduct {
                    name,
                    description: None,
                    price: None,
                    currency: None,
                    source_url: url.to_string(),
                    image_urls: vec![],
                    available: true,
                })
            })
            .take(MAX_PRODUCTS)
            .collect()
    }
}

#[async_trait]
impl BrandScraper for SiteScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedSite, ScrapeError> {
        let url = Self::normalize_url(url);
        let base = Url::parse(&url).map_err(|e| ScrapeError::InvalidUrl(e.to_string()))?;
        if base.host_str().is_none() {
            return Err(ScrapeError::InvalidUrl(format!("no host in {url}")));
        }

        info!(url = %url, "scraping brand site");
        let mut pages_scraped = 0;

        let html = self.fetch_text(&url).await?;
        pages_scraped += 1;
        let brand = {
            let document = Html::parse_document(&html);
            Self::extract_brand(&document, &base)
        };

        let products = match self.try_shopify_products(&base).await {
            Some(products) => {
                pages_scraped += 1;
                products
            }
            None => {
                let document = Html::parse_document(&html);
                let products = Self::extract_product_links(&document, &base);
                if products.is_empty() {
                    warn!(url = %url, "no products discovered on site");
                }
                products
            }
        };

        info!(
            url = %url,
            products = products.len(),
            pages_scraped,
            "brand site scraped"
        );

        Ok(ScrapedSite {
            brand,
            products,
            pages_scraped,
        })
    }
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn html_to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| {
        let document = Html::parse_document(html);
        document.root_element().text().collect::<String>()
    })
}

// Shopify /products.json feed shapes, only the fields we read.

#[derive(Deserialize)]
struct ShopifyFeed {
    products: Vec<ShopifyProduct>,
}

#[derive(Deserialize)]
struct ShopifyProduct {
    title: String,
    handle: String,
    body_html: Option<String>,
    #[serde(default)]
    variants: Vec<ShopifyVariant>,
    #[serde(default)]
    images: Vec<ShopifyImage>,
}

#[derive(Deserialize)]
struct ShopifyVariant {
    price: String,
    #[serde(default = "default_available")]
    available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Deserialize)]
struct ShopifyImage {
    src: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            SiteScraper::normalize_url("example.com"),
            "https://example.com"
        );
        assert_eq!(
            SiteScraper::normalize_url("https://example.com"),
            "https://example.com"
        );
    }

    #[test]
    fn test_extract_brand_from_meta_tags() {
        let html = r#"<html><head>
            <title>Acme Goods | Handmade Candles</title>
            <meta name="description" content="Hand-poured soy candles.">
            <meta property="og:image" content="/logo.png">
        </head><body></body></html>"#;
        let document = Html::parse_document(html);
        let base = Url::parse("https://acme.example").unwrap();

        let brand = SiteScraper::extract_brand(&document, &base);
        assert_eq!(brand.name.as_deref(), Some("Acme Goods"));
        assert_eq!(brand.description.as_deref(), Some("Hand-poured soy candles."));
        assert_eq!(brand.logo_url.as_deref(), Some("https://acme.example/logo.png"));
    }

    #[test]
    fn test_extract_product_links_dedupes() {
        let html = r#"<html><body>
            <a href="/products/candle">Soy Candle</a>
            <a href="/products/candle">Soy Candle</a>
            <a href="/products/wick">Wick Trimmer</a>
            <a href="/about">About</a>
        </body></html>"#;
        let document = Html::parse_document(html);
        let base = Url::parse("https://acme.example").unwrap();

        let products = SiteScraper::extract_product_links(&document, &base);
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Soy Candle");
        assert_eq!(products[1].source_url, "https://acme.example/products/wick");
    }

    #[test]
    fn test_shopify_feed_parses() {
        let body = r#"{"products":[{
            "title":"Soy Candle","handle":"soy-candle",
            "body_html":"<p>Smells <b>great</b></p>",
            "variants":[{"price":"24.00","available":true}],
            "images":[{"src":"https://cdn.example/candle.jpg"}]
        }]}"#;
        let feed: ShopifyFeed = serde_json::from_str(body).unwrap();
        assert_eq!(feed.products.len(), 1);
        assert_eq!(feed.products[0].variants[0].price, "24.00");
    }

    #[test]
    fn test_invalid_url_is_terminal() {
        let failure = JobFailure::from(ScrapeError::InvalidUrl("nope".into()));
        assert!(!failure.should_retry());

        let failure = JobFailure::from(ScrapeError::Blocked(503));
        assert!(failure.should_retry());
    }
}
