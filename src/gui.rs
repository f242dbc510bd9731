use crate::app::{App, AppState, Indicator};
use crate::config::{ABOUT, APP_NAME, APP_TITLE, COMPANIES};
use crate::export::ChartKind;
use crate::inference::PredictionResult;
use crate::stats::ErrorDistribution;
use crate::theme::{Theme, ThemeMode};
use eframe::egui;
use egui_plot::{Bar, BarChart, Legend, Line, Plot, PlotPoints};
use std::time::Duration;

pub struct GuiApp {
    app: App,
}

impl GuiApp {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.heading("Settings");
        ui.add_space(8.0);

        ui.label("Theme");
        let mut mode = self.app.theme_mode;
        ui.radio_value(&mut mode, ThemeMode::Light, ThemeMode::Light.label());
        ui.radio_value(&mut mode, ThemeMode::Dark, ThemeMode::Dark.label());
        self.app.theme_mode = mode;

        ui.add_space(8.0);
        let mut selected = self.app.selected;
        egui::ComboBox::from_label("Company")
            .selected_text(COMPANIES[selected].0)
            .show_ui(ui, |ui| {
                for (i, (name, _)) in COMPANIES.iter().enumerate() {
                    ui.selectable_value(&mut selected, i, *name);
                }
            });
        self.app.select(selected);

        ui.add_space(8.0);
        ui.label("Indicators");
        for which in Indicator::ALL {
            ui.checkbox(self.app.indicators.flag_mut(which), which.label());
        }

        ui.add_space(8.0);
        if ui.button("Refresh now").clicked() {
            self.app.trigger_refresh();
        }

        ui.add_space(8.0);
        ui.collapsing(format!("About {APP_NAME}"), |ui| {
            ui.label(ABOUT);
            ui.small(format!(
                "Model: two-layer LSTM over the previous {} closes.",
                self.app.window()
            ));
        });
    }

    fn header(&self, ui: &mut egui::Ui, theme: &Theme) {
        ui.heading(APP_TITLE);
        ui.label(self.app.company_name());
        match (&self.app.quote, &self.app.quote_warning) {
            (_, Some(warning)) => {
                ui.colored_label(theme.warning.to_egui(), warning);
            }
            (Some(price), None) => {
                ui.strong(format!("Current Price: ${price:.2}"));
            }
            (None, None) => {
                ui.label("Current Price: ...");
            }
        }
        if let Some(at) = self.app.last_updated {
            ui.small(format!("Last updated: {}", at.format("%Y-%m-%d %H:%M:%S")));
        }
    }

    fn download_button(&mut self, ui: &mut egui::Ui, chart: ChartKind) {
        if ui.button(format!("Download {}", chart.title())).clicked() {
            self.app.export_one(chart);
        }
    }
}

fn forecast_plot(ui: &mut egui::Ui, app: &App, forecast: &PredictionResult, theme: &Theme) {
    let indexed = |values: &[f64]| -> PlotPoints {
        values.iter().enumerate().map(|(i, &v)| [i as f64, v]).collect()
    };
    let indexed_some = |values: &[Option<f64>]| -> PlotPoints {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| [i as f64, v]))
            .collect()
    };

    Plot::new("forecast_plot")
        .legend(Legend::default())
        .height(280.0)
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(indexed(&forecast.actual))
                    .name("Actual")
                    .color(theme.actual.to_egui()),
            );
            plot_ui.line(
                Line::new(indexed(&forecast.predicted))
                    .name("Predicted")
                    .color(theme.predicted.to_egui()),
            );
            if app.indicators.ma20 {
                plot_ui.line(
                    Line::new(indexed_some(&forecast.ma20))
                        .name("MA20")
                        .color(theme.ma20.to_egui()),
                );
            }
            if app.indicators.ma50 {
                plot_ui.line(
                    Line::new(indexed_some(&forecast.ma50))
                        .name("MA50")
                        .color(theme.ma50.to_egui()),
                );
            }
        });
}

fn volume_plot(ui: &mut egui::Ui, forecast: &PredictionResult, theme: &Theme) {
    let bars: Vec<Bar> = forecast
        .volume
        .iter()
        .enumerate()
        .map(|(i, &v)| Bar::new(i as f64, v).width(0.8))
        .collect();
    Plot::new("volume_plot").height(140.0).show(ui, |plot_ui| {
        plot_ui.bar_chart(BarChart::new(bars).name("Volume").color(theme.volume.to_egui()));
    });
}

fn errors_plot(ui: &mut egui::Ui, dist: &ErrorDistribution, theme: &Theme) {
    let bars: Vec<Bar> = dist
        .bins
        .iter()
        .map(|b| Bar::new(b.center(), b.density).width(b.width()))
        .collect();
    let curve: PlotPoints = dist.curve.iter().map(|&(x, y)| [x, y]).collect();

    Plot::new("errors_plot")
        .legend(Legend::default())
        .height(200.0)
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(
                BarChart::new(bars)
                    .name("Errors")
                    .color(theme.histogram.to_egui()),
            );
            if !dist.curve.is_empty() {
                plot_ui.line(Line::new(curve).name("Normal fit").color(theme.curve.to_egui()));
            }
        });
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.app.tick();

        let theme = self.app.theme();
        ctx.set_visuals(match self.app.theme_mode {
            ThemeMode::Light => egui::Visuals::light(),
            ThemeMode::Dark => egui::Visuals::dark(),
        });

        egui::SidePanel::left("controls").show(ctx, |ui| self.controls(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            self.header(ui, &theme);
            ui.separator();

            if let Some(err) = &self.app.error_msg {
                ui.colored_label(theme.error.to_egui(), err);
                return;
            }

            if self.app.state == AppState::Loading {
                ui.vertical_centered(|ui| {
                    ui.add_space(100.0);
                    ui.spinner();
                    ui.label(format!("Loading {} ...", self.app.ticker()));
                });
                return;
            }

            let Some(forecast) = self.app.forecast.clone() else {
                return;
            };

            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.label(format!("Actual vs Predicted: {}", forecast.ticker));
                forecast_plot(ui, &self.app, &forecast, &theme);
                self.download_button(ui, ChartKind::Forecast);

                if self.app.indicators.volume {
                    ui.separator();
                    ui.label(format!("Volume: {}", forecast.ticker));
                    volume_plot(ui, &forecast, &theme);
                    self.download_button(ui, ChartKind::Volume);
                }

                if let Some(dist) = self.app.distribution.clone() {
                    ui.separator();
                    ui.label(format!(
                        "Error Distribution (mean {:.2}, std {:.2})",
                        dist.mean, dist.std
                    ));
                    errors_plot(ui, &dist, &theme);
                    self.download_button(ui, ChartKind::Errors);
                }

                if let Some(status) = &self.app.status {
                    ui.small(status);
                }
            });
        });

        // Wake up for finished fetches and the refresh timer.
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}
