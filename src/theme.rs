//! Chart palettes.
//!
//! The theme only recolours charts: background, grid and label text switch
//! between light and dark, while the series colours stay fixed so a line keeps
//! its meaning across themes.

use eframe::egui::Color32;
use plotters::style::RGBColor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_ratatui(self) -> ratatui::style::Color {
        ratatui::style::Color::Rgb(self.0, self.1, self.2)
    }

    pub fn to_egui(self) -> Color32 {
        Color32::from_rgb(self.0, self.1, self.2)
    }

    pub fn to_plotters(self) -> RGBColor {
        RGBColor(self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Dark => "Dark",
        }
    }

    pub fn theme(self) -> Theme {
        match self {
            Self::Light => Theme::light(),
            Self::Dark => Theme::dark(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub background: Rgb,
    pub grid: Rgb,
    pub label: Rgb,
    pub actual: Rgb,
    pub predicted: Rgb,
    pub ma20: Rgb,
    pub ma50: Rgb,
    pub volume: Rgb,
    pub histogram: Rgb,
    /// Fitted normal curve; follows the label colour so it reads on both backgrounds.
    pub curve: Rgb,
    pub warning: Rgb,
    pub error: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}

impl Theme {
    fn series(background: Rgb, grid: Rgb, label: Rgb) -> Self {
        Self {
            background,
            grid,
            label,
            actual: Rgb(0x1f, 0x77, 0xb4),
            predicted: Rgb(0xff, 0x7f, 0x0e),
            ma20: Rgb(0x2c, 0xa0, 0x2c),
            ma50: Rgb(0x94, 0x67, 0xbd),
            volume: Rgb(0x00, 0xbf, 0xa6),
            histogram: Rgb(0xe3, 0x77, 0xc2),
            curve: label,
            warning: Rgb(255, 140, 0),
            error: Rgb(220, 20, 60),
        }
    }

    pub fn light() -> Self {
        Self::series(Rgb(255, 255, 255), Rgb(0xcc, 0xcc, 0xcc), Rgb(0, 0, 0))
    }

    pub fn dark() -> Self {
        Self::series(Rgb(0x1e, 0x1e, 0x1e), Rgb(0x44, 0x44, 0x44), Rgb(255, 255, 255))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_round_trips() {
        assert_eq!(ThemeMode::Light.toggled(), ThemeMode::Dark);
        assert_eq!(ThemeMode::Light.toggled().toggled(), ThemeMode::Light);
    }

    #[test]
    fn only_chart_chrome_changes() {
        let light = ThemeMode::Light.theme();
        let dark = ThemeMode::Dark.theme();

        assert_eq!(light.background, Rgb(255, 255, 255));
        assert_eq!(dark.background, Rgb(0x1e, 0x1e, 0x1e));
        assert_ne!(light.label, dark.label);
        assert_eq!(light.actual, dark.actual);
        assert_eq!(light.predicted, dark.predicted);
        assert_eq!(light.histogram, dark.histogram);
    }

    #[test]
    fn conversions_keep_channels() {
        let c = Rgb(1, 2, 3);
        assert_eq!(c.to_egui(), Color32::from_rgb(1, 2, 3));
        assert_eq!(c.to_ratatui(), ratatui::style::Color::Rgb(1, 2, 3));
        let p = c.to_plotters();
        assert_eq!((p.0, p.1, p.2), (1, 2, 3));
    }
}
