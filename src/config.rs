use candle_core::Device;
use tracing::{info, warn};

pub fn get_device(use_cuda: bool) -> Device {
    if use_cuda {
        #[cfg(feature = "cuda")]
        {
            match Device::new_cuda(0) {
                Ok(device) => {
                    info!("Using CUDA device 0");
                    return device;
                }
                Err(e) => {
                    warn!("Failed to initialize CUDA: {}. Falling back to CPU.", e);
                }
            }
        }
        #[cfg(not(feature = "cuda"))]
        {
            warn!("--cuda flag set but binary was compiled without the 'cuda' feature. Falling back to CPU.");
        }
    }
    info!("Using CPU device");
    Device::Cpu
}

pub const WINDOW: usize = 60;
pub const EPOCHS: usize = 5;
pub const BATCH_SIZE: usize = 32;
pub const HIDDEN_DIM: usize = 50;
pub const LEARNING_RATE: f64 = 1e-3;
pub const MA_SHORT: usize = 20;
pub const MA_LONG: usize = 50;
pub const HISTORY_RANGE: &str = "1y";
pub const REFRESH_SECS: u64 = 60;
pub const HISTOGRAM_BINS: usize = 30;

/// Display name and symbol for every ticker the dashboard offers.
pub const APP_NAME: &str = "PulsePredict";
pub const APP_TITLE: &str = "PulsePredict - Real-Time Stock Price Forecast";
pub const ABOUT: &str = "PulsePredict is a real-time dashboard that uses machine learning to forecast \
stock prices. It visualizes historical trends, predicted prices, trading volume, and technical \
indicators with an intuitive UI.";

pub const COMPANIES: &[(&str, &str)] = &[
    ("Apple (AAPL)", "AAPL"),
    ("Google (GOOGL)", "GOOGL"),
    ("Amazon (AMZN)", "AMZN"),
    ("Microsoft (MSFT)", "MSFT"),
    ("Tesla (TSLA)", "TSLA"),
    ("Meta (META)", "META"),
    ("Netflix (NFLX)", "NFLX"),
    ("NVIDIA (NVDA)", "NVDA"),
    ("Adobe (ADBE)", "ADBE"),
    ("Intel (INTC)", "INTC"),
];

/// What to do when a persisted model already exists for a ticker.
///
/// `Reuse` trusts the file unconditionally: no hash of the data, no timestamp
/// and no shape check. A model trained on last year's prices keeps serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Reuse,
    /// Always train a fresh model and overwrite the stored one.
    Retrain,
}

#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub window: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_dim: usize,
    pub learning_rate: f64,
    pub ma_short: usize,
    pub ma_long: usize,
    pub history_range: String,
    pub cache_policy: CachePolicy,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window: WINDOW,
            epochs: EPOCHS,
            batch_size: BATCH_SIZE,
            hidden_dim: HIDDEN_DIM,
            learning_rate: LEARNING_RATE,
            ma_short: MA_SHORT,
            ma_long: MA_LONG,
            history_range: HISTORY_RANGE.to_string(),
            cache_policy: CachePolicy::Reuse,
        }
    }
}

impl ForecastConfig {
    /// Minimum number of clean bars needed to build a single window.
    pub fn required_bars(&self) -> usize {
        self.window + 1
    }
}

pub fn ticker_index(symbol: &str) -> Option<usize> {
    COMPANIES
        .iter()
        .position(|(_, s)| s.eq_ignore_ascii_case(symbol))
}
