use crate::config::{CachePolicy, ForecastConfig};
use crate::data::{build_windows, MarketSource, StockData, WindowedDataset};
use crate::indicators::sma;
use crate::models::lstm::PriceRegressor;
use crate::scaler::MinMaxScaler;
use crate::store::{weights_from_varmap, ModelStore};
use crate::train::{self, TrainParams};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("no usable price data for {ticker}")]
    DataUnavailable { ticker: String },

    #[error("{ticker} has {bars} daily bars, at least {required} are needed")]
    InsufficientHistory {
        ticker: String,
        bars: usize,
        required: usize,
    },

    #[error("{0}")]
    UpstreamFailure(String),
}

impl From<anyhow::Error> for ForecastError {
    fn from(e: anyhow::Error) -> Self {
        Self::UpstreamFailure(format!("{e:#}"))
    }
}

impl From<candle_core::Error> for ForecastError {
    fn from(e: candle_core::Error) -> Self {
        Self::UpstreamFailure(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ForecastError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::UpstreamFailure(format!("forecast task failed: {e}"))
    }
}

/// Whether the model behind a result was read from the store or trained for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelOrigin {
    Loaded,
    Trained,
}

/// Position `i` of every series refers to the same trading day.
#[derive(Clone, Debug)]
pub struct PredictionResult {
    pub ticker: String,
    pub origin: ModelOrigin,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
    pub ma20: Vec<Option<f64>>,
    pub ma50: Vec<Option<f64>>,
    pub volume: Vec<f64>,
}

impl PredictionResult {
    pub fn len(&self) -> usize {
        self.predicted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted.is_empty()
    }

    /// Actual minus predicted, per day.
    pub fn residuals(&self) -> Vec<f64> {
        self.actual
            .iter()
            .zip(&self.predicted)
            .map(|(a, p)| a - p)
            .collect()
    }
}

/// Fetch -> indicators -> scale -> window -> resolve model -> predict.
#[derive(Clone)]
pub struct Forecaster {
    source: Arc<dyn MarketSource>,
    store: Arc<dyn ModelStore>,
    config: ForecastConfig,
    device: Device,
}

impl Forecaster {
    pub fn new(
        source: Arc<dyn MarketSource>,
        store: Arc<dyn ModelStore>,
        config: ForecastConfig,
        device: Device,
    ) -> Self {
        Self {
            source,
            store,
            config,
            device,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn MarketSource> {
        &self.source
    }

    pub async fn forecast(&self, ticker: &str) -> Result<PredictionResult, ForecastError> {
        let ticker = ticker.trim().to_uppercase();
        let data = self
            .source
            .daily_bars(&ticker, &self.config.history_range)
            .await?;

        // Training and inference are CPU-bound; keep them off the async workers.
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.forecast_series(&ticker, &data)).await?
    }

    /// Everything after the fetch, on an already-cleaned series.
    pub fn forecast_series(
        &self,
        ticker: &str,
        data: &StockData,
    ) -> Result<PredictionResult, ForecastError> {
        let cfg = &self.config;
        if data.history.is_empty() {
            return Err(ForecastError::DataUnavailable {
                ticker: ticker.to_string(),
            });
        }
        if data.history.len() < cfg.required_bars() {
            return Err(ForecastError::InsufficientHistory {
                ticker: ticker.to_string(),
                bars: data.history.len(),
                required: cfg.required_bars(),
            });
        }

        let closes = data.closes();
        let volumes = data.volumes();
        let ma_short = sma(&closes, cfg.ma_short);
        let ma_long = sma(&closes, cfg.ma_long);

        let scaler = MinMaxScaler::fit(&closes).ok_or_else(|| {
            ForecastError::UpstreamFailure(format!("non-finite closing prices for {ticker}"))
        })?;
        debug!(ticker, min = scaler.min(), max = scaler.max(), "Fitted price scaler");
        let dataset = build_windows(&scaler.transform_all(&closes), cfg.window);

        let (model, origin) = self.resolve_model(ticker, &dataset)?;
        let scaled_predictions = train::predict(&model, &dataset, cfg.batch_size, &self.device)?;

        let predicted = scaler.inverse_all(&scaled_predictions);
        let actual = scaler.inverse_all(&dataset.targets);

        // Drop the leading rows that have no prediction.
        let offset = closes.len() - predicted.len();
        let result = PredictionResult {
            ticker: ticker.to_string(),
            origin,
            actual,
            predicted,
            ma20: ma_short[offset..].to_vec(),
            ma50: ma_long[offset..].to_vec(),
            volume: volumes[offset..].to_vec(),
        };

        info!(ticker, rows = result.len(), origin = ?origin, "Forecast ready");
        Ok(result)
    }

    fn resolve_model(
        &self,
        ticker: &str,
        dataset: &WindowedDataset,
    ) -> Result<(PriceRegressor, ModelOrigin), ForecastError> {
        if self.config.cache_policy == CachePolicy::Reuse {
            if let Some(weights) = self.store.lookup(ticker, &self.device)? {
                info!(ticker, "Loaded cached model");
                let vb = VarBuilder::from_tensors(weights, DType::F32, &self.device);
                let model = PriceRegressor::new(self.config.hidden_dim, vb)?;
                return Ok((model, ModelOrigin::Loaded));
            }
        }

        info!(ticker, samples = dataset.len(), "Training fresh model");
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        let model = PriceRegressor::new(self.config.hidden_dim, vb)?;

        let params = TrainParams {
            epochs: self.config.epochs,
            batch_size: self.config.batch_size,
            learning_rate: self.config.learning_rate,
        };
        train::fit(&model, &varmap, dataset, &params, &self.device)?;

        self.store.store(ticker, &weights_from_varmap(&varmap)?)?;
        info!(ticker, "Saved trained model");
        Ok((model, ModelOrigin::Trained))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{ramp, FailingSource, FixedSource};
    use crate::store::{FileModelStore, ModelWeights};
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// File store that counts writes, to tell loads from trainings.
    struct CountingStore {
        inner: FileModelStore,
        stores: AtomicUsize,
    }

    impl ModelStore for CountingStore {
        fn lookup(&self, ticker: &str, device: &Device) -> Result<Option<ModelWeights>> {
            self.inner.lookup(ticker, device)
        }

        fn store(&self, ticker: &str, weights: &ModelWeights) -> Result<()> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.inner.store(ticker, weights)
        }
    }

    fn forecaster(
        closes: Vec<f64>,
        dir: &std::path::Path,
        policy: CachePolicy,
    ) -> (Forecaster, Arc<CountingStore>) {
        let store = Arc::new(CountingStore {
            inner: FileModelStore::new(dir),
            stores: AtomicUsize::new(0),
        });
        let config = ForecastConfig {
            hidden_dim: 8,
            cache_policy: policy,
            ..Default::default()
        };
        let forecaster = Forecaster::new(
            Arc::new(FixedSource { closes }),
            store.clone(),
            config,
            Device::Cpu,
        );
        (forecaster, store)
    }

    #[tokio::test]
    async fn trains_once_then_reuses_the_stored_model() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (forecaster, store) = forecaster(ramp(120), dir.path(), CachePolicy::Reuse);
        let model_path = dir.path().join("model_AAPL.safetensors");

        let first = forecaster.forecast("aapl").await?;
        assert_eq!(first.origin, ModelOrigin::Trained);
        assert_eq!(first.ticker, "AAPL");
        assert!(model_path.exists());
        assert_eq!(store.stores.load(Ordering::SeqCst), 1);
        let written = std::fs::metadata(&model_path)?.modified()?;

        let second = forecaster.forecast("AAPL").await?;
        assert_eq!(second.origin, ModelOrigin::Loaded);
        assert_eq!(store.stores.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::metadata(&model_path)?.modified()?, written);
        assert_eq!(second.len(), 60);

        // Same weights, same inputs.
        for (a, b) in first.predicted.iter().zip(&second.predicted) {
            assert!((a - b).abs() < 1e-3);
        }
        Ok(())
    }

    #[tokio::test]
    async fn every_series_has_one_row_per_window() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (forecaster, _) = forecaster(ramp(120), dir.path(), CachePolicy::Reuse);

        let result = forecaster.forecast("MSFT").await?;
        assert_eq!(result.actual.len(), 60);
        assert_eq!(result.predicted.len(), 60);
        assert_eq!(result.ma20.len(), 60);
        assert_eq!(result.ma50.len(), 60);
        assert_eq!(result.volume.len(), 60);
        assert!(result.predicted.iter().all(|p| p.is_finite()));

        // Targets are closes 160..=219.
        assert!(result.actual.windows(2).all(|w| w[1] > w[0]));
        assert!((result.actual[0] - 160.0).abs() < 1e-9);
        assert!((result.actual[59] - 219.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn indicators_line_up_with_predictions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (forecaster, _) = forecaster(ramp(120), dir.path(), CachePolicy::Reuse);
        let result = forecaster.forecast("GOOGL").await?;

        // Output row i is input row i + 60, close = 160 + i.
        for i in 0..result.len() {
            let ma20 = result.ma20[i].expect("ma20 defined after 60 rows");
            let ma50 = result.ma50[i].expect("ma50 defined after 60 rows");
            assert!((ma20 - (150.5 + i as f64)).abs() < 1e-9);
            assert!((ma50 - (135.5 + i as f64)).abs() < 1e-9);
            assert_eq!(result.volume[i], 1_000.0 + (i + 60) as f64);
        }
        Ok(())
    }

    #[tokio::test]
    async fn sixty_one_bars_give_a_single_row() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (forecaster, _) = forecaster(ramp(61), dir.path(), CachePolicy::Reuse);
        let result = forecaster.forecast("TSLA").await?;
        assert_eq!(result.len(), 1);
        assert_eq!(result.ma50.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn short_history_is_rejected_without_training() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (forecaster, store) = forecaster(ramp(60), dir.path(), CachePolicy::Reuse);

        match forecaster.forecast("META").await {
            Err(ForecastError::InsufficientHistory { bars, required, .. }) => {
                assert_eq!(bars, 60);
                assert_eq!(required, 61);
            }
            other => panic!("expected InsufficientHistory, got {other:?}"),
        }
        assert_eq!(store.stores.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("model_META.safetensors").exists());
        Ok(())
    }

    #[tokio::test]
    async fn empty_history_is_data_unavailable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (forecaster, _) = forecaster(Vec::new(), dir.path(), CachePolicy::Reuse);
        assert!(matches!(
            forecaster.forecast("NFLX").await,
            Err(ForecastError::DataUnavailable { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_errors_surface_as_upstream_failures() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let forecaster = Forecaster::new(
            Arc::new(FailingSource),
            Arc::new(FileModelStore::new(dir.path())),
            ForecastConfig::default(),
            Device::Cpu,
        );
        match forecaster.forecast("ADBE").await {
            Err(ForecastError::UpstreamFailure(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected UpstreamFailure, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn retrain_policy_ignores_stored_model() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (forecaster, store) = forecaster(ramp(80), dir.path(), CachePolicy::Retrain);

        assert_eq!(forecaster.forecast("INTC").await?.origin, ModelOrigin::Trained);
        assert_eq!(forecaster.forecast("INTC").await?.origin, ModelOrigin::Trained);
        assert_eq!(store.stores.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn residuals_are_actual_minus_predicted() {
        let result = PredictionResult {
            ticker: "X".into(),
            origin: ModelOrigin::Loaded,
            actual: vec![10.0, 12.0],
            predicted: vec![9.0, 12.5],
            ma20: vec![None, None],
            ma50: vec![None, None],
            volume: vec![1.0, 2.0],
        };
        assert_eq!(result.residuals(), vec![1.0, -0.5]);
    }
}
