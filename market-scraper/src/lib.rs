pub mod parser;

pub use parser::{parse_abbreviated, parse_coin_list, parse_currency, parse_percentage};

use async_trait::async_trait;
use market_core::{CoinQuote, MarketError, QuoteSource, Result, ScraperConfig};
use parking_lot::RwLock;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// HTTP client for the market-listing page. Keeps the last non-empty list it
/// scraped so callers can serve something while the site is unreachable.
#[derive(Debug)]
pub struct CoinScraper {
    client: Client,
    url: String,
    origin: String,
    cached: RwLock<Vec<CoinQuote>>,
}

impl CoinScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| MarketError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            origin: config.origin.clone(),
            cached: RwLock::new(Vec::new()),
        })
    }

    pub async fn fetch_coin_list(&self) -> Result<Vec<CoinQuote>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MarketError::Fetch(format!("GET {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::Fetch(format!(
                "GET {} returned status {}",
                self.url, status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| MarketError::Fetch(format!("Failed to read body of {}: {}", self.url, e)))?;

        let coins = parse_coin_list(&html, &self.origin);

        if coins.is_empty() {
            warn!("No coin rows found at {}; keeping previous cache", self.url);
        } else {
            info!("Scraped {} coins from {}", coins.len(), self.url);
            *self.cached.write() = coins.clone();
        }

        Ok(coins)
    }

    pub fn cached_coin_list(&self) -> Vec<CoinQuote> {
        self.cached.read().clone()
    }
}

#[async_trait]
impl QuoteSource for CoinScraper {
    async fn fetch_quotes(&self) -> Result<Vec<CoinQuote>> {
        self.fetch_coin_list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LISTING: &str = r#"<html><body><table><tbody>
        <tr class="tradeitem coinrow">
            <td><img src="./images/coins/sol.png"></td>
            <td><div>Solana</div><div class="grey-500">SOL</div></td>
            <td>$251.10
                4.20%</td>
            <td>$251.10</td>
            <td>$120.3B</td>
            <td>$3.2M</td>
        </tr>
    </tbody></table></body></html>"#;

    /// Serves exactly one canned HTTP response and returns the base url.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "{status_line}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/tradecoins")
    }

    fn config_for(url: String) -> ScraperConfig {
        ScraperConfig {
            url,
            origin: "https://www.coinspot.com.au".to_string(),
            ..ScraperConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_parses_and_caches() {
        let url = serve_once("HTTP/1.1 200 OK", LISTING).await;
        let scraper = CoinScraper::new(&config_for(url)).unwrap();
        assert!(scraper.cached_coin_list().is_empty());

        let coins = scraper.fetch_coin_list().await.unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].code, "SOL");
        assert_eq!(
            coins[0].icon.as_deref(),
            Some("https://www.coinspot.com.au/images/coins/sol.png")
        );
        assert_eq!(scraper.cached_coin_list(), coins);
    }

    const NO_VALID_ROWS: &str = r#"<html><body><table><tbody>
        <tr class="tradeitem coinrow">
            <td><img src="./images/coins/x.png"></td>
            <td><div>Nameless</div><div class="grey-500">  </div></td>
            <td>$1.00</td>
            <td>$1.00</td>
            <td>1K</td>
            <td>1K</td>
        </tr>
    </tbody></table></body></html>"#;

    #[tokio::test]
    async fn test_empty_parse_keeps_previous_cache() {
        let first = serve_once("HTTP/1.1 200 OK", LISTING).await;
        let scraper = CoinScraper::new(&config_for(first)).unwrap();
        let coins = scraper.fetch_coin_list().await.unwrap();
        assert_eq!(coins.len(), 1);

        // Same client and cache, pointed at a page whose only row has a blank code.
        let second = serve_once("HTTP/1.1 200 OK", NO_VALID_ROWS).await;
        let scraper = CoinScraper {
            url: second,
            ..scraper
        };

        let empty = scraper.fetch_coin_list().await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(scraper.cached_coin_list(), coins);
    }

    #[tokio::test]
    async fn test_error_status_is_a_fetch_error() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", "busy").await;
        let scraper = CoinScraper::new(&config_for(url)).unwrap();

        let err = scraper.fetch_quotes().await.unwrap_err();
        assert!(matches!(err, MarketError::Fetch(_)));
        assert!(scraper.cached_coin_list().is_empty());
    }
}
