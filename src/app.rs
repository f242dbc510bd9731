use crate::config::{COMPANIES, HISTOGRAM_BINS, REFRESH_SECS};
use crate::export::{self, ChartKind};
use crate::inference::{ForecastError, Forecaster, PredictionResult};
use crate::stats::ErrorDistribution;
use crate::theme::{Theme, ThemeMode};
use chrono::{DateTime, Local};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, Receiver};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Ma20,
    Ma50,
    Volume,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [Indicator::Ma20, Indicator::Ma50, Indicator::Volume];

    pub fn label(self) -> &'static str {
        match self {
            Self::Ma20 => "MA20",
            Self::Ma50 => "MA50",
            Self::Volume => "Volume",
        }
    }
}

/// Which overlays are switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicators {
    pub ma20: bool,
    pub ma50: bool,
    pub volume: bool,
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            ma20: true,
            ma50: false,
            volume: true,
        }
    }
}

impl Indicators {
    pub fn all() -> Self {
        Self {
            ma20: true,
            ma50: true,
            volume: true,
        }
    }

    pub fn is_on(&self, which: Indicator) -> bool {
        match which {
            Indicator::Ma20 => self.ma20,
            Indicator::Ma50 => self.ma50,
            Indicator::Volume => self.volume,
        }
    }

    pub fn flag_mut(&mut self, which: Indicator) -> &mut bool {
        match which {
            Indicator::Ma20 => &mut self.ma20,
            Indicator::Ma50 => &mut self.ma50,
            Indicator::Volume => &mut self.volume,
        }
    }

    pub fn toggle(&mut self, which: Indicator) {
        let flag = self.flag_mut(which);
        *flag = !*flag;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Waiting for the first result for the selected ticker.
    Loading,
    /// Showing the latest result or error; a refresh may be running behind it.
    Dashboard,
}

type ForecastReply = (String, Result<PredictionResult, ForecastError>);
type QuoteReply = (String, anyhow::Result<f64>);

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub selected: usize,
    pub indicators: Indicators,
    pub theme_mode: ThemeMode,
    pub show_about: bool,
    pub forecast: Option<PredictionResult>,
    pub distribution: Option<ErrorDistribution>,
    pub error_msg: Option<String>,
    pub quote: Option<f64>,
    pub quote_warning: Option<String>,
    pub status: Option<String>,
    pub last_updated: Option<DateTime<Local>>,
    pub refresh_interval: Duration,
    next_refresh: Option<Instant>,
    forecaster: Forecaster,
    export_dir: PathBuf,
    result_rx: Option<Receiver<ForecastReply>>,
    quote_rx: Option<Receiver<QuoteReply>>,
}

impl App {
    pub fn new(forecaster: Forecaster, export_dir: PathBuf) -> Self {
        Self {
            should_quit: false,
            state: AppState::Loading,
            selected: 0,
            indicators: Indicators::default(),
            theme_mode: ThemeMode::default(),
            show_about: false,
            forecast: None,
            distribution: None,
            error_msg: None,
            quote: None,
            quote_warning: None,
            status: None,
            last_updated: None,
            refresh_interval: Duration::from_secs(REFRESH_SECS),
            next_refresh: None,
            forecaster,
            export_dir,
            result_rx: None,
            quote_rx: None,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_ticker(mut self, index: usize) -> Self {
        self.selected = index.min(COMPANIES.len() - 1);
        self
    }

    pub fn ticker(&self) -> &'static str {
        COMPANIES[self.selected].1
    }

    pub fn company_name(&self) -> &'static str {
        COMPANIES[self.selected].0
    }

    pub fn window(&self) -> usize {
        self.forecaster.config().window
    }

    pub fn theme(&self) -> Theme {
        self.theme_mode.theme()
    }

    pub fn is_refreshing(&self) -> bool {
        self.result_rx.is_some()
    }

    /// Time left until the next automatic refresh.
    pub fn refresh_in(&self) -> Duration {
        self.next_refresh
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        match self.quote_rx.as_mut().map(|rx| rx.try_recv()) {
            Some(Ok((ticker, res))) => {
                self.quote_rx = None;
                if ticker == self.ticker() {
                    self.apply_quote(res);
                }
            }
            Some(Err(TryRecvError::Disconnected)) => {
                self.quote_rx = None;
                self.apply_quote(Err(anyhow::anyhow!("quote task ended without a price")));
            }
            Some(Err(TryRecvError::Empty)) | None => {}
        }

        match self.result_rx.as_mut().map(|rx| rx.try_recv()) {
            Some(Ok((ticker, res))) => {
                self.result_rx = None;
                if ticker == self.ticker() {
                    self.apply_result(res);
                }
            }
            Some(Err(TryRecvError::Disconnected)) => {
                self.result_rx = None;
                self.apply_result(Err(ForecastError::UpstreamFailure(
                    "forecast task ended without a result".to_string(),
                )));
            }
            Some(Err(TryRecvError::Empty)) | None => {}
        }

        if self.next_refresh.map_or(true, |at| now >= at) {
            self.trigger_refresh_at(now);
        }
    }

    fn apply_quote(&mut self, res: anyhow::Result<f64>) {
        match res {
            Ok(price) => {
                self.quote = Some(price);
                self.quote_warning = None;
            }
            Err(e) => {
                warn!(ticker = self.ticker(), "Quote fetch failed: {:#}", e);
                self.quote = None;
                self.quote_warning = Some(format!("Could not fetch stock price: {e}"));
            }
        }
    }

    fn apply_result(&mut self, res: Result<PredictionResult, ForecastError>) {
        match res {
            Ok(forecast) => {
                self.distribution = ErrorDistribution::fit(&forecast.residuals(), HISTOGRAM_BINS);
                self.forecast = Some(forecast);
                self.error_msg = None;
            }
            Err(e) => {
                // No charts for a failed cycle.
                self.forecast = None;
                self.distribution = None;
                self.error_msg = Some(format!("Something went wrong: {e}"));
            }
        }
        self.last_updated = Some(Local::now());
        self.state = AppState::Dashboard;
    }

    pub fn trigger_refresh(&mut self) {
        self.trigger_refresh_at(Instant::now());
    }

    /// Re-run quote and pipeline for the selected ticker. A refresh that is
    /// still running is not restarted; the timer just moves on.
    fn trigger_refresh_at(&mut self, now: Instant) {
        self.next_refresh = Some(now + self.refresh_interval);
        if self.is_refreshing() {
            return;
        }

        let ticker = self.ticker().to_string();

        let (quote_tx, quote_rx) = mpsc::channel(1);
        let (res_tx, res_rx) = mpsc::channel(1);
        self.quote_rx = Some(quote_rx);
        self.result_rx = Some(res_rx);

        let source = self.forecaster.source().clone();
        let symbol = ticker.clone();
        tokio::spawn(async move {
            let res = source.latest_quote(&symbol).await;
            let _ = quote_tx.send((symbol, res)).await;
        });

        let forecaster = self.forecaster.clone();
        tokio::spawn(async move {
            let res = forecaster.forecast(&ticker).await;
            let _ = res_tx.send((ticker, res)).await;
        });
    }

    pub fn select(&mut self, index: usize) {
        let index = index.min(COMPANIES.len() - 1);
        if index == self.selected {
            return;
        }
        self.selected = index;
        self.state = AppState::Loading;
        self.forecast = None;
        self.distribution = None;
        self.error_msg = None;
        self.quote = None;
        self.quote_warning = None;
        self.status = None;
        // Abandon replies for the previous ticker.
        self.result_rx = None;
        self.quote_rx = None;
        self.next_refresh = None;
    }

    pub fn select_next(&mut self) {
        self.select((self.selected + 1) % COMPANIES.len());
    }

    pub fn select_prev(&mut self) {
        self.select((self.selected + COMPANIES.len() - 1) % COMPANIES.len());
    }

    pub fn export_all(&mut self) {
        let Some(forecast) = &self.forecast else {
            self.status = Some("Nothing to export yet".to_string());
            return;
        };
        self.status = Some(
            match export::export_charts(&self.export_dir, forecast, self.indicators, &self.theme()) {
                Ok(paths) => format!("Saved {} charts to {}", paths.len(), self.export_dir.display()),
                Err(e) => format!("Export failed: {e:#}"),
            },
        );
    }

    pub fn export_one(&mut self, chart: ChartKind) {
        let Some(forecast) = &self.forecast else {
            return;
        };
        self.status = Some(
            match export::export_chart(&self.export_dir, chart, forecast, self.indicators, &self.theme()) {
                Ok(path) => format!("Saved {}", path.display()),
                Err(e) => format!("Export failed: {e:#}"),
            },
        );
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Right | KeyCode::Tab | KeyCode::Char('l') => self.select_next(),
            KeyCode::Left | KeyCode::BackTab | KeyCode::Char('h') => self.select_prev(),
            KeyCode::Char('1') => self.indicators.toggle(Indicator::Ma20),
            KeyCode::Char('2') => self.indicators.toggle(Indicator::Ma50),
            KeyCode::Char('3') => self.indicators.toggle(Indicator::Volume),
            KeyCode::Char('t') => self.theme_mode = self.theme_mode.toggled(),
            KeyCode::Char('a') => self.show_about = !self.show_about,
            KeyCode::Char('r') => self.trigger_refresh(),
            KeyCode::Char('e') => self.export_all(),
            _ => {}
        }
    }

    pub async fn run(&mut self, terminal: &mut crate::tui::Tui) -> io::Result<()> {
        while !self.should_quit {
            terminal.draw(|f| crate::ui::render(f, self))?;

            self.tick();

            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
            // Let spawned fetches make progress between frames.
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}
