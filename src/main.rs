mod app;
mod config;
mod data;
mod export;
mod gui;
mod indicators;
mod inference;
mod models;
mod scaler;
mod stats;
mod store;
mod theme;
mod train;
mod tui;
mod ui;

use anyhow::Context;
use app::{App, Indicators};
use clap::Parser;
use config::{CachePolicy, ForecastConfig};
use data::{DemoSource, MarketSource, YahooSource};
use inference::Forecaster;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use store::FileModelStore;
use theme::ThemeMode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Pulse Predict: next-day stock price forecasts with a per-ticker LSTM",
    after_help = "EXAMPLES:
    # Terminal dashboard
    cargo run --release

    # Desktop window
    cargo run --release -- --gui

    # One forecast for NVDA, charts written to ./charts
    cargo run --release -- --once --ticker NVDA --export-dir charts

    # Ignore saved models and train again
    cargo run --release -- --retrain --epochs 10"
)]
struct Args {
    /// Launch in GUI mode
    #[arg(long)]
    gui: bool,

    /// Run one forecast for --ticker, export its charts and exit
    #[arg(long)]
    once: bool,

    /// Ticker selected at start-up
    #[arg(long, default_value = "AAPL")]
    ticker: String,

    /// Seconds between automatic refreshes
    #[arg(long, default_value_t = config::REFRESH_SECS)]
    refresh_secs: u64,

    /// Directory holding model_<TICKER>.safetensors files
    #[arg(long, default_value = ".")]
    model_dir: PathBuf,

    /// Directory PNG charts are written to
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    /// Closes per input window
    #[arg(long, default_value_t = config::WINDOW, value_parser = positive())]
    window: usize,

    /// Training epochs for a ticker without a saved model
    #[arg(long, default_value_t = config::EPOCHS, value_parser = positive())]
    epochs: usize,

    #[arg(long, default_value_t = config::BATCH_SIZE, value_parser = positive())]
    batch_size: usize,

    #[arg(long, default_value_t = config::LEARNING_RATE)]
    learning_rate: f64,

    /// Train and overwrite even when a saved model exists
    #[arg(long)]
    retrain: bool,

    /// Use CUDA GPU acceleration (requires --features cuda at compile time)
    #[arg(long)]
    cuda: bool,

    /// Serve a synthetic random walk instead of Yahoo Finance
    #[arg(long)]
    demo: bool,

    /// Log file used while the terminal dashboard owns the screen
    #[arg(long, default_value = "pulse-predict.log")]
    log_file: PathBuf,
}

fn positive() -> clap::builder::RangedU64ValueParser<usize> {
    clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
}

impl Args {
    fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            window: self.window,
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            cache_policy: if self.retrain {
                CachePolicy::Retrain
            } else {
                CachePolicy::Reuse
            },
            ..Default::default()
        }
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.gui || args.once {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let file = std::fs::File::create(&args.log_file)
            .with_context(|| format!("creating log file {}", args.log_file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

async fn run_once(forecaster: &Forecaster, ticker: &str, export_dir: &Path) -> anyhow::Result<()> {
    let result = forecaster.forecast(ticker).await?;
    let residuals = result.residuals();
    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / residuals.len().max(1) as f64;
    info!(
        ticker = %result.ticker,
        origin = ?result.origin,
        days = result.len(),
        last_actual = result.actual.last().copied().unwrap_or_default(),
        last_predicted = result.predicted.last().copied().unwrap_or_default(),
        mae,
        "Forecast complete"
    );

    match forecaster.source().latest_quote(ticker).await {
        Ok(price) => info!(ticker, price, "Current price"),
        Err(e) => warn!(ticker, "Could not fetch stock price: {:#}", e),
    }

    let paths = export::export_charts(
        export_dir,
        &result,
        Indicators::all(),
        &ThemeMode::default().theme(),
    )?;
    for path in paths {
        info!("Saved {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let source: Arc<dyn MarketSource> = if args.demo {
        Arc::new(DemoSource)
    } else {
        Arc::new(YahooSource::new())
    };
    let store = FileModelStore::new(&args.model_dir);
    info!("Model directory: {}", store.dir().display());
    let forecaster = Forecaster::new(
        source,
        Arc::new(store),
        args.forecast_config(),
        config::get_device(args.cuda),
    );

    if args.once {
        return run_once(&forecaster, &args.ticker, &args.export_dir)
            .await
            .inspect_err(|e| error!("Forecast failed: {:#}", e));
    }

    let selected = config::ticker_index(&args.ticker).unwrap_or_else(|| {
        warn!("{} is not in the company list, starting with {}", args.ticker, config::COMPANIES[0].1);
        0
    });
    let app = App::new(forecaster, args.export_dir.clone())
        .with_ticker(selected)
        .with_refresh_interval(Duration::from_secs(args.refresh_secs.max(1)));

    if args.gui {
        let options = eframe::NativeOptions::default();
        eframe::run_native(
            config::APP_TITLE,
            options,
            Box::new(|_cc| Ok(Box::new(gui::GuiApp::new(app)))),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        return Ok(());
    }

    let mut terminal = tui::init()?;
    let mut app = app;
    let res = app.run(&mut terminal).await;

    tui::restore()?;

    if let Err(e) = &res {
        error!("Error: {:?}", e);
    }
    res.map_err(Into::into)
}
