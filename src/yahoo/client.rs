// =============================================================================
// Yahoo Finance Chart Client — public v8 chart endpoint
// =============================================================================
//
// GET {base}/v8/finance/chart/{symbol}?period1=..&period2=..&interval=..
//
// The response carries parallel arrays (timestamp[], quote[0].open[], ...)
// in which any element may be null. Rows with a missing OHLC value are
// skipped; a missing volume is treated as zero (FX pairs report none).
//
// 4H candles are not served natively and are resampled from hourly data.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::CandleSource;
use crate::market_data::{resample, Candle, Timeframe};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Yahoo Finance chart client.
#[derive(Clone)]
pub struct YahooClient {
    base_url: String,
    keep_partial: bool,
    client: reqwest::Client,
}

impl YahooClient {
    /// Create a client against the public Yahoo endpoint.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against `base_url` (no trailing slash).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "YahooClient initialised");

        Ok(Self {
            base_url,
            keep_partial: true,
            client,
        })
    }

    /// Whether resampled series keep the still-forming last bucket.
    pub fn keep_partial(mut self, keep: bool) -> Self {
        self.keep_partial = keep;
        self
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            encode_symbol(symbol)
        )
    }

    /// GET the chart for a native Yahoo interval.
    #[instrument(skip(self), name = "yahoo::get_chart")]
    async fn get_chart(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let url = self.chart_url(symbol);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", interval.to_string()),
                ("includePrePost", "false".to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("GET chart for {symbol} request failed"))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("failed to read chart response for {symbol}"))?;

        if !status.is_success() {
            // Yahoo still sends a chart.error body on 404 for unknown symbols.
            let detail = parse_chart(&body)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| body.chars().take(200).collect());
            anyhow::bail!("Yahoo chart for {symbol} returned {status}: {detail}");
        }

        let candles = parse_chart(&body)
            .with_context(|| format!("failed to parse chart response for {symbol}"))?;

        debug!(symbol, interval, count = candles.len(), "chart fetched");
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for YahooClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Vec<Candle>> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(i64::from(lookback_days));

        let source = timeframe.source();
        let interval = source
            .yahoo_interval()
            .with_context(|| format!("no Yahoo interval for timeframe {source}"))?;

        let candles = self.get_chart(symbol, interval, start, end).await?;

        if source == timeframe {
            return Ok(candles);
        }

        let closed_as_of = (!self.keep_partial).then_some(end);
        let resampled = resample(&candles, timeframe, closed_as_of);
        debug!(
            symbol,
            from = candles.len(),
            to = resampled.len(),
            timeframe = %timeframe,
            "candles resampled"
        );
        Ok(resampled)
    }
}

impl std::fmt::Debug for YahooClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooClient")
            .field("base_url", &self.base_url)
            .field("keep_partial", &self.keep_partial)
            .finish()
    }
}

/// Percent-encode the characters Yahoo symbols use that are not path-safe.
fn encode_symbol(symbol: &str) -> String {
    symbol.replace('^', "%5E").replace('=', "%3D")
}

// =============================================================================
// Response parsing
// =============================================================================

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug, Default)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Parse a v8 chart JSON body into candles (oldest first).
///
/// An empty result (no timestamps) parses to an empty `Vec`; the caller
/// decides whether that is an error.
pub fn parse_chart(body: &str) -> Result<Vec<Candle>> {
    let resp: ChartResponse =
        serde_json::from_str(body).context("chart response is not valid JSON")?;

    if let Some(err) = resp.chart.error {
        anyhow::bail!("Yahoo error {}: {}", err.code, err.description);
    }

    let Some(result) = resp.chart.result.and_then(|mut r| r.pop()) else {
        anyhow::bail!("chart response has no result");
    };

    let Some(quote) = result.indicators.quote.first() else {
        return Ok(Vec::new());
    };

    fn pick(v: &[Option<f64>], i: usize) -> Option<f64> {
        v.get(i).copied().flatten().filter(|x| x.is_finite())
    }

    let mut candles = Vec::with_capacity(result.timestamp.len());
    let mut skipped = 0usize;

    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(open_time) = DateTime::from_timestamp(ts, 0) else {
            skipped += 1;
            continue;
        };
        match (
            pick(&quote.open, i),
            pick(&quote.high, i),
            pick(&quote.low, i),
            pick(&quote.close, i),
        ) {
            (Some(o), Some(h), Some(l), Some(c)) => {
                let v = pick(&quote.volume, i).unwrap_or(0.0);
                candles.push(Candle::new(open_time, o, h, l, c, v));
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, kept = candles.len(), "skipped chart rows with missing prices");
    }

    Ok(candles)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "GBPUSD=X", "currency": "USD"},
                "timestamp": [1709510400, 1709514000, 1709517600],
                "indicators": {
                    "quote": [{
                        "open":   [1.2650, null,   1.2660],
                        "high":   [1.2670, 1.2680, 1.2690],
                        "low":    [1.2640, 1.2650, 1.2655],
                        "close":  [1.2660, 1.2670, 1.2685],
                        "volume": [0, 0, null]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_quotes_and_skips_missing_prices() {
        let candles = parse_chart(SAMPLE).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time.timestamp(), 1_709_510_400);
        assert!((candles[1].close - 1.2685).abs() < 1e-12);
        assert_eq!(candles[1].volume, 0.0);
    }

    #[test]
    fn chart_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(body).unwrap_err().to_string();
        assert!(err.contains("Not Found"));
        assert!(err.contains("delisted"));
    }

    #[test]
    fn empty_result_parses_to_no_candles() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse_chart(body).unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_chart("<html>rate limited</html>").is_err());
    }

    #[test]
    fn symbols_are_path_encoded() {
        let client = YahooClient::with_base_url("http://localhost:1/").unwrap();
        assert_eq!(
            client.chart_url("^GDAXI"),
            "http://localhost:1/v8/finance/chart/%5EGDAXI"
        );
        assert_eq!(encode_symbol("BZ=F"), "BZ%3DF");
    }

    #[tokio::test]
    async fn unreachable_host_is_an_error() {
        let client = YahooClient::with_base_url("http://127.0.0.1:9").unwrap();
        let res = client.fetch_candles("EURUSD=X", Timeframe::Hour4, 5).await;
        assert!(res.is_err());
    }

    // ---- HTTP path (mock server) ------------------------------------------

    use wiremock::matchers::{method, path_regex, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    /// 2024-03-04 00:00:00 UTC.
    const MAR_4: i64 = 1_709_510_400;

    fn hourly_chart(first_hour: i64, closes: &[f64]) -> serde_json::Value {
        let ts: Vec<i64> = (0..closes.len() as i64)
            .map(|i| MAR_4 + (first_hour + i) * 3600)
            .collect();
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "GBPUSD=X"},
                    "timestamp": ts,
                    "indicators": {"quote": [{
                        "open": closes,
                        "high": closes.iter().map(|c| c + 0.5).collect::<Vec<_>>(),
                        "low": closes.iter().map(|c| c - 0.5).collect::<Vec<_>>(),
                        "close": closes,
                        "volume": vec![10.0; closes.len()],
                    }]}
                }],
                "error": null
            }
        })
    }

    #[tokio::test]
    async fn sends_chart_query_with_browser_user_agent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/v8/finance/chart/GBPUSD"))
            .and(query_param("interval", "60m"))
            .and(query_param("includePrePost", "false"))
            .and(|req: &Request| {
                let param = |k: &str| {
                    req.url
                        .query_pairs()
                        .find(|(key, _)| key == k)
                        .and_then(|(_, v)| v.parse::<i64>().ok())
                };
                matches!((param("period1"), param("period2")), (Some(p1), Some(p2)) if p2 - p1 == 5 * 86_400)
            })
            .and(|req: &Request| {
                req.headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|ua| ua == BROWSER_USER_AGENT)
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(hourly_chart(0, &[1.0])))
            .expect(1)
            .mount(&server)
            .await;

        let client = YahooClient::with_base_url(server.uri()).unwrap();
        let candles = client
            .fetch_candles("GBPUSD=X", Timeframe::Hour4, 5)
            .await
            .unwrap();
        assert_eq!(candles.len(), 1);
    }

    #[tokio::test]
    async fn not_found_reports_status_and_description() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        });
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(body))
            .mount(&server)
            .await;

        let client = YahooClient::with_base_url(server.uri()).unwrap();
        let err = client
            .fetch_candles("NOPE=X", Timeframe::Hour1, 5)
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("404"), "{err}");
        assert!(err.contains("delisted"), "{err}");
    }

    #[tokio::test]
    async fn hourly_bars_come_back_as_aligned_4h_candles() {
        let server = MockServer::start().await;
        // 02:00..09:00 => buckets 00:00 (2 bars), 04:00 (4 bars), 08:00 (2 bars)
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hourly_chart(2, &closes)))
            .mount(&server)
            .await;

        // Buckets from 2024 have long closed, so none is dropped.
        let client = YahooClient::with_base_url(server.uri())
            .unwrap()
            .keep_partial(false);
        let candles = client
            .fetch_candles("GBPUSD=X", Timeframe::Hour4, 90)
            .await
            .unwrap();

        let opens: Vec<i64> = candles.iter().map(|c| c.open_time.timestamp()).collect();
        assert_eq!(opens, vec![MAR_4, MAR_4 + 4 * 3600, MAR_4 + 8 * 3600]);
        assert!((candles[1].open - 3.0).abs() < 1e-12);
        assert!((candles[1].close - 6.0).abs() < 1e-12);
        assert!((candles[1].high - 6.5).abs() < 1e-12);
        assert!((candles[1].volume - 40.0).abs() < 1e-12);
    }
}
