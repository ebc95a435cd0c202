use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a catalog (search-results) parse attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogStatus {
    Success,
    Empty,
    ProxyBlocked,
    ProxyAuthRequired,
    CaptchaFailed,
    LoadTimeout,
    PageNotDetected,
    WrongPage,
    ServerUnavailable,
}

/// Outcome of a single listing detail-page parse attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Success,
    ProxyBlocked,
    CaptchaFailed,
    NotFound,
    PageNotDetected,
    WrongPage,
    ServerUnavailable,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawListing {
    pub avito_item_id: String,
    pub title: String,
    pub price: Option<i64>,
    pub snippet: Option<String>,
    pub seller_name: Option<String>,
    pub seller_reviews: i32,
    pub image_urls: Vec<String>,
}

/// Where a catalog parse left off, so a proxy rotation or a retry can
/// resume without redoing already-captured pages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogParseResult {
    pub status: CatalogStatus,
    pub listings: Vec<RawListing>,
    pub resume_page_number: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawCard {
    pub avito_item_id: String,
    pub title: String,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub seller_name: Option<String>,
    pub view_count: Option<i64>,
    pub characteristics: Value,
    pub image_urls: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardParseResult {
    pub status: CardStatus,
    pub data: Option<RawCard>,
}

/// Everything a worker needs to have in hand before handing a task to the
/// browser library: which proxy it is tunneling through and which page of
/// results to resume from.
#[derive(Clone, Debug)]
pub struct CatalogParseRequest {
    pub articulum: String,
    pub proxy_url: String,
    pub start_page: i32,
    pub max_pages: i32,
}

#[derive(Clone, Debug)]
pub struct CardParseRequest {
    pub avito_item_id: String,
    pub proxy_url: String,
}

/// The browser-automation driver itself — headless browser control, page
/// navigation, and CAPTCHA handling — is an external collaborator. This
/// trait is the seam: the orchestration core depends only on this contract,
/// never on a concrete browser binding.
#[async_trait]
pub trait BrowserLibrary: Send + Sync {
    async fn parse_catalog(&self, request: CatalogParseRequest) -> CatalogParseResult;
    async fn parse_card(&self, request: CardParseRequest) -> CardParseResult;
}

/// Talks to the browser-automation service over HTTP. The service owns the
/// headless browser, proxy tunneling at the transport level, and CAPTCHA
/// handling; this adapter only serializes requests and deserializes typed
/// results, the same way the rest of the pipeline treats the AI validation
/// endpoint as a plain HTTP collaborator.
pub struct HttpBrowserLibrary {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBrowserLibrary {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl BrowserLibrary for HttpBrowserLibrary {
    async fn parse_catalog(&self, request: CatalogParseRequest) -> CatalogParseResult {
        #[derive(Serialize)]
        struct Body {
            articulum: String,
            proxy_url: String,
            start_page: i32,
            max_pages: i32,
        }

        let body = Body {
            articulum: request.articulum,
            proxy_url: request.proxy_url,
            start_page: request.start_page,
            max_pages: request.max_pages,
        };

        let response = self
            .client
            .post(format!("{}/parse_catalog", self.base_url))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) => resp.json::<CatalogParseResult>().await.unwrap_or(CatalogParseResult {
                status: CatalogStatus::ServerUnavailable,
                listings: Vec::new(),
                resume_page_number: request.start_page,
            }),
            Err(_) => CatalogParseResult {
                status: CatalogStatus::ServerUnavailable,
                listings: Vec::new(),
                resume_page_number: request.start_page,
            },
        }
    }

    async fn parse_card(&self, request: CardParseRequest) -> CardParseResult {
        #[derive(Serialize)]
        struct Body {
            avito_item_id: String,
            proxy_url: String,
        }

        let body = Body {
            avito_item_id: request.avito_item_id,
            proxy_url: request.proxy_url,
        };

        let response = self
            .client
            .post(format!("{}/parse_card", self.base_url))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) => resp.json::<CardParseResult>().await.unwrap_or(CardParseResult {
                status: CardStatus::ServerUnavailable,
                data: None,
            }),
            Err(_) => CardParseResult {
                status: CardStatus::ServerUnavailable,
                data: None,
            },
        }
    }
}

/// A scripted double for exercising the orchestration core without a real
/// browser. Each call consumes the next scripted response for its kind,
/// falling back to `Success`/empty-listings once the script is exhausted.
pub struct MockBrowserLibrary {
    catalog_script: std::sync::Mutex<Vec<CatalogParseResult>>,
    card_script: std::sync::Mutex<Vec<CardParseResult>>,
}

impl MockBrowserLibrary {
    pub fn new(catalog_script: Vec<CatalogParseResult>, card_script: Vec<CardParseResult>) -> Self {
        Self {
            catalog_script: std::sync::Mutex::new(catalog_script),
            card_script: std::sync::Mutex::new(card_script),
        }
    }
}

#[async_trait]
impl BrowserLibrary for MockBrowserLibrary {
    async fn parse_catalog(&self, _request: CatalogParseRequest) -> CatalogParseResult {
        let mut script = self.catalog_script.lock().unwrap();
        if script.is_empty() {
            CatalogParseResult {
                status: CatalogStatus::Empty,
                listings: Vec::new(),
                resume_page_number: 1,
            }
        } else {
            script.remove(0)
        }
    }

    async fn parse_card(&self, _request: CardParseRequest) -> CardParseResult {
        let mut script = self.card_script.lock().unwrap();
        if script.is_empty() {
            CardParseResult {
                status: CardStatus::NotFound,
                data: None,
            }
        } else {
            script.remove(0)
        }
    }
}
