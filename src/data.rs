use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::prelude::*;
use reqwest::StatusCode;
use serde::Deserialize;

/// One trading day. Only the fields the forecaster consumes are kept.
#[derive(Clone, Debug, PartialEq)]
pub struct Bar {
    pub date: DateTime<Utc>,
    pub close: f64,
    pub volume: f64,
}

#[derive(Clone, Debug)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<Bar>,
}

#[derive(Deserialize, Debug, Default)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug, Default)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Pull-based market data. Availability, rate limits and schema belong to the
/// implementation; an empty history means "nothing usable came back".
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn daily_bars(&self, symbol: &str, range: &str) -> Result<StockData>;
    async fn latest_quote(&self, symbol: &str) -> Result<f64>;
}

/// Yahoo Finance v8 chart endpoint.
#[derive(Clone, Default)]
pub struct YahooSource {
    client: reqwest::Client,
}

impl YahooSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn chart_url(symbol: &str, range: &str) -> String {
        format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{}?interval=1d&range={}",
            symbol.to_uppercase(),
            range
        )
    }

    async fn chart(&self, symbol: &str, range: &str) -> Result<YahooChartResponse> {
        let resp = self
            .client
            .get(Self::chart_url(symbol, range))
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        decode_chart(status, &body)
    }
}

/// Unknown or delisted symbols come back as 404 with a chart body and no
/// result; both decode to an empty series rather than a transport error.
fn decode_chart(status: StatusCode, body: &str) -> Result<YahooChartResponse> {
    if status == StatusCode::NOT_FOUND {
        return Ok(serde_json::from_str(body).unwrap_or_default());
    }
    if !status.is_success() {
        anyhow::bail!("Yahoo chart request failed: HTTP {}", status);
    }
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl MarketSource for YahooSource {
    async fn daily_bars(&self, symbol: &str, range: &str) -> Result<StockData> {
        let resp = self.chart(symbol, range).await?;
        Ok(StockData::from_chart(symbol, resp))
    }

    async fn latest_quote(&self, symbol: &str) -> Result<f64> {
        let data = self.daily_bars(symbol, "1d").await?;
        data.history
            .last()
            .map(|bar| bar.close)
            .ok_or_else(|| anyhow::anyhow!("no quote returned for {}", symbol))
    }
}

/// Offline source serving a random walk, for running without network access.
#[derive(Clone, Default)]
pub struct DemoSource;

#[async_trait]
impl MarketSource for DemoSource {
    async fn daily_bars(&self, symbol: &str, _range: &str) -> Result<StockData> {
        Ok(StockData::new_mock(symbol, 252))
    }

    async fn latest_quote(&self, symbol: &str) -> Result<f64> {
        StockData::new_mock(symbol, 1)
            .history
            .last()
            .map(|bar| bar.close)
            .ok_or_else(|| anyhow::anyhow!("no quote for {}", symbol))
    }
}

impl StockData {
    fn from_chart(symbol: &str, resp: YahooChartResponse) -> Self {
        let mut history = Vec::new();

        let result = resp.chart.result.and_then(|r| r.into_iter().next());
        if let Some(result) = result {
            let timestamps = result.timestamp.unwrap_or_default();
            if let Some(quote) = result.indicators.quote.first() {
                for (i, &timestamp) in timestamps.iter().enumerate() {
                    // Rows missing either field are dropped, not filled.
                    let (Some(close), Some(volume)) = (
                        quote.close.get(i).and_then(|v| *v),
                        quote.volume.get(i).and_then(|v| *v),
                    ) else {
                        continue;
                    };
                    let Some(date) = Utc.timestamp_opt(timestamp, 0).single() else {
                        continue;
                    };
                    history.push(Bar { date, close, volume });
                }
            }
        }

        Self {
            symbol: symbol.to_uppercase(),
            history,
        }
    }

    /// Deterministic series with one bar per calendar day and a rising volume.
    pub fn from_closes(symbol: &str, closes: &[f64]) -> Self {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        let history = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + Duration::days(i as i64),
                close,
                volume: 1_000.0 + i as f64,
            })
            .collect();

        Self {
            symbol: symbol.to_uppercase(),
            history,
        }
    }

    pub fn new_mock(symbol: &str, days: usize) -> Self {
        let mut rng = rand::thread_rng();
        let mut history = Vec::with_capacity(days);
        let mut current_price: f64 = 100.0;
        let mut current_date = Utc::now() - Duration::days(days as i64);

        for _ in 0..days {
            let volatility = 0.02; // 2% daily volatility
            let change_pct: f64 = rng.gen_range(-volatility..volatility);
            current_price *= 1.0 + change_pct;

            history.push(Bar {
                date: current_date,
                close: current_price,
                volume: rng.gen_range(1000.0..10000.0),
            });

            current_date += Duration::days(1);
        }

        Self {
            symbol: symbol.to_uppercase(),
            history,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.history.iter().map(|b| b.volume).collect()
    }
}

/// Supervised examples cut from a scaled series, in chronological order.
pub struct WindowedDataset {
    pub features: Vec<Vec<f64>>, // [window]
    pub targets: Vec<f64>,
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Every (previous `window` values, next value) pair in `series`.
pub fn build_windows(series: &[f64], window: usize) -> WindowedDataset {
    if window == 0 || series.len() <= window {
        return WindowedDataset {
            features: Vec::new(),
            targets: Vec::new(),
        };
    }

    let features = series
        .windows(window)
        .take(series.len() - window)
        .map(|w| w.to_vec())
        .collect();
    let targets = series[window..].to_vec();

    WindowedDataset { features, targets }
}
