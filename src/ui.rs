use crate::app::{App, AppState, Indicator};
use crate::config::{ABOUT, APP_NAME, APP_TITLE, COMPANIES};
use crate::inference::PredictionResult;
use crate::stats::ErrorDistribution;
use crate::theme::Theme;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Chart, Dataset, GraphType, LegendPosition, Paragraph, Sparkline,
        Tabs, Wrap,
    },
    Frame,
};

pub fn render(f: &mut Frame, app: &App) {
    let theme = app.theme();
    let base = Style::default()
        .bg(theme.background.to_ratatui())
        .fg(theme.label.to_ratatui());
    f.render_widget(Block::default().style(base), f.area());

    let about_height = if app.show_about { 6 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(about_height),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(f.area());

    render_header(f, app, &theme, chunks[0]);
    render_tickers(f, app, &theme, chunks[1]);
    render_toggles(f, app, &theme, chunks[2]);
    if app.show_about {
        render_about(f, app, &theme, chunks[3]);
    }
    render_body(f, app, &theme, chunks[4]);
    render_footer(f, app, &theme, chunks[5]);
}

fn panel<'a>(title: &'a str, theme: &Theme) -> Block<'a> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.grid.to_ratatui()))
        .style(Style::default().bg(theme.background.to_ratatui()))
}

fn render_header(f: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let title = Line::from(vec![
        Span::styled(APP_TITLE, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {}", app.company_name())),
    ]);

    let quote = match (&app.quote, &app.quote_warning) {
        (_, Some(warning)) => Line::from(Span::styled(
            warning.clone(),
            Style::default().fg(theme.warning.to_ratatui()),
        )),
        (Some(price), None) => Line::from(vec![
            Span::raw("Current Price: "),
            Span::styled(
                format!("${price:.2}"),
                Style::default()
                    .fg(theme.actual.to_ratatui())
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        (None, None) => Line::from("Current Price: ..."),
    };

    let updated = match app.last_updated {
        Some(at) => format!(
            "Last updated: {}  |  next refresh in {}s",
            at.format("%Y-%m-%d %H:%M:%S"),
            app.refresh_in().as_secs()
        ),
        None => "Last updated: never".to_string(),
    };

    let p = Paragraph::new(vec![title, quote, Line::from(updated)])
        .style(Style::default().fg(theme.label.to_ratatui()));
    f.render_widget(p, area);
}

fn render_tickers(f: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let titles: Vec<Line> = COMPANIES.iter().map(|(_, symbol)| Line::from(*symbol)).collect();
    let tabs = Tabs::new(titles)
        .block(panel(" Company (\u{2190}/\u{2192}) ", theme))
        .select(app.selected)
        .style(Style::default().fg(theme.label.to_ratatui()))
        .highlight_style(
            Style::default()
                .fg(theme.predicted.to_ratatui())
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, area);
}

fn render_toggles(f: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let mut spans = vec![Span::raw(" Indicators: ")];
    for (i, which) in Indicator::ALL.into_iter().enumerate() {
        let mark = if app.indicators.is_on(which) { "x" } else { " " };
        spans.push(Span::styled(
            format!("[{mark}] {} {}   ", i + 1, which.label()),
            Style::default().fg(indicator_color(which, theme)),
        ));
    }
    spans.push(Span::raw(format!("Theme: {}", app.theme_mode.label())));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn indicator_color(which: Indicator, theme: &Theme) -> Color {
    match which {
        Indicator::Ma20 => theme.ma20.to_ratatui(),
        Indicator::Ma50 => theme.ma50.to_ratatui(),
        Indicator::Volume => theme.volume.to_ratatui(),
    }
}

fn render_about(f: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let text = vec![
        Line::from(ABOUT),
        Line::from(format!(
            "Model: two-layer LSTM over the previous {} closes, refreshed every {}s.",
            app.window(),
            app.refresh_interval.as_secs()
        )),
    ];
    let title = format!(" About {APP_NAME} ");
    let p = Paragraph::new(text)
        .block(panel(&title, theme))
        .wrap(Wrap { trim: true });
    f.render_widget(p, area);
}

fn render_body(f: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    if let Some(err) = &app.error_msg {
        let p = Paragraph::new(err.as_str())
            .style(Style::default().fg(theme.error.to_ratatui()))
            .block(panel(" Error ", theme))
            .wrap(Wrap { trim: true });
        f.render_widget(p, area);
        return;
    }

    let Some(forecast) = app.forecast.as_ref().filter(|_| app.state == AppState::Dashboard) else {
        let p = Paragraph::new(format!("Loading {} ...", app.ticker()))
            .alignment(Alignment::Center)
            .block(panel("", theme));
        f.render_widget(p, area);
        return;
    };

    let show_volume = app.indicators.volume && !forecast.volume.is_empty();
    let mut constraints = vec![Constraint::Percentage(50)];
    if show_volume {
        constraints.push(Constraint::Percentage(20));
    }
    constraints.push(Constraint::Min(6));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    render_forecast(f, app, forecast, theme, rows[0]);
    if show_volume {
        render_volume(f, forecast, theme, rows[1]);
    }
    if let Some(dist) = &app.distribution {
        render_errors(f, dist, theme, rows[rows.len() - 1]);
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> [f64; 2] {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return [0.0, 1.0];
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    [lo - pad, hi + pad]
}

fn indexed(values: &[f64]) -> Vec<(f64, f64)> {
    values.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect()
}

fn indexed_some(values: &[Option<f64>]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
        .collect()
}

fn render_forecast(f: &mut Frame, app: &App, forecast: &PredictionResult, theme: &Theme, area: Rect) {
    let actual = indexed(&forecast.actual);
    let predicted = indexed(&forecast.predicted);
    let ma20 = indexed_some(&forecast.ma20);
    let ma50 = indexed_some(&forecast.ma50);

    let mut datasets = vec![
        Dataset::default()
            .name("Actual")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(theme.actual.to_ratatui()))
            .data(&actual),
        Dataset::default()
            .name("Predicted")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(theme.predicted.to_ratatui()))
            .data(&predicted),
    ];
    if app.indicators.ma20 {
        datasets.push(
            Dataset::default()
                .name("MA20")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(theme.ma20.to_ratatui()))
                .data(&ma20),
        );
    }
    if app.indicators.ma50 {
        datasets.push(
            Dataset::default()
                .name("MA50")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(theme.ma50.to_ratatui()))
                .data(&ma50),
        );
    }

    let x_max = forecast.len().saturating_sub(1).max(1) as f64;
    let y = bounds(
        actual
            .iter()
            .chain(&predicted)
            .chain(ma20.iter().filter(|_| app.indicators.ma20))
            .chain(ma50.iter().filter(|_| app.indicators.ma50))
            .map(|&(_, v)| v),
    );
    let axis_style = Style::default().fg(theme.grid.to_ratatui());

    let title = format!(" Actual vs Predicted: {} ", forecast.ticker);
    let chart = Chart::new(datasets)
        .block(panel(&title, theme))
        .legend_position(Some(LegendPosition::TopLeft))
        .x_axis(
            Axis::default()
                .title("Day")
                .style(axis_style)
                .bounds([0.0, x_max])
                .labels(vec![
                    Span::raw("0"),
                    Span::raw(format!("{}", (x_max / 2.0) as usize)),
                    Span::raw(format!("{}", x_max as usize)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("Price")
                .style(axis_style)
                .bounds(y)
                .labels(vec![
                    Span::raw(format!("${:.0}", y[0])),
                    Span::raw(format!("${:.0}", (y[0] + y[1]) / 2.0)),
                    Span::raw(format!("${:.0}", y[1])),
                ]),
        );
    f.render_widget(chart, area);
}

fn render_volume(f: &mut Frame, forecast: &PredictionResult, theme: &Theme, area: Rect) {
    let volumes: Vec<u64> = forecast.volume.iter().map(|&v| v.max(0.0) as u64).collect();
    let peak = volumes.iter().copied().max().unwrap_or(0);
    let title = format!(" Volume: {} (max {peak}) ", forecast.ticker);
    let sparkline = Sparkline::default()
        .block(panel(&title, theme))
        .data(&volumes)
        .style(Style::default().fg(theme.volume.to_ratatui()));
    f.render_widget(sparkline, area);
}

fn render_errors(f: &mut Frame, dist: &ErrorDistribution, theme: &Theme, area: Rect) {
    let bars: Vec<(f64, f64)> = dist.bins.iter().map(|b| (b.center(), b.density)).collect();
    let curve = dist.curve.clone();

    let mut datasets = vec![Dataset::default()
        .name("Errors")
        .marker(symbols::Marker::HalfBlock)
        .graph_type(GraphType::Bar)
        .style(Style::default().fg(theme.histogram.to_ratatui()))
        .data(&bars)];
    if !curve.is_empty() {
        datasets.push(
            Dataset::default()
                .name("Normal fit")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(theme.curve.to_ratatui()))
                .data(&curve),
        );
    }

    let x = match (dist.bins.first(), dist.bins.last()) {
        (Some(first), Some(last)) => [first.start, last.end],
        _ => [0.0, 1.0],
    };
    let y_max = dist.max_density().max(f64::EPSILON) * 1.1;
    let axis_style = Style::default().fg(theme.grid.to_ratatui());

    let title = format!(" Error Distribution (mean {:.2}, std {:.2}) ", dist.mean, dist.std);
    let chart = Chart::new(datasets)
        .block(panel(&title, theme))
        .legend_position(Some(LegendPosition::TopRight))
        .x_axis(
            Axis::default()
                .title("Error")
                .style(axis_style)
                .bounds(x)
                .labels(vec![
                    Span::raw(format!("{:.1}", x[0])),
                    Span::raw(format!("{:.1}", (x[0] + x[1]) / 2.0)),
                    Span::raw(format!("{:.1}", x[1])),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("Density")
                .style(axis_style)
                .bounds([0.0, y_max])
                .labels(vec![Span::raw("0"), Span::raw(format!("{y_max:.3}"))]),
        );
    f.render_widget(chart, area);
}

fn render_footer(f: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let status = match (&app.status, app.is_refreshing()) {
        (Some(status), _) => status.clone(),
        (None, true) => "Refreshing...".to_string(),
        (None, false) => String::new(),
    };
    let help = "\u{2190}/\u{2192} company  1/2/3 indicators  t theme  a about  r refresh  e export PNG  q quit";
    let p = Paragraph::new(vec![
        Line::from(Span::styled(status, Style::default().fg(theme.predicted.to_ratatui()))),
        Line::from(Span::styled(help, Style::default().fg(theme.grid.to_ratatui()))),
    ]);
    f.render_widget(p, area);
}
