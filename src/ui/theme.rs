use ratatui::style::Color;

pub const GAIN: Color = Color::Rgb(0x22, 0xc5, 0x5e);
pub const LOSS: Color = Color::Rgb(0xef, 0x44, 0x44);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub card_bg: Color,
    pub text: Color,
    pub accent: Color,
    pub grid: Color,
}

impl Theme {
    pub fn toggle(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "Light",
            Theme::Dark => "Dark",
        }
    }

    pub fn palette(&self) -> Palette {
        match self {
            Theme::Light => Palette {
                card_bg: Color::Rgb(0xff, 0xff, 0xff),
                text: Color::Rgb(0x11, 0x11, 0x11),
                accent: Color::Rgb(0x3b, 0x82, 0xf6),
                grid: Color::Rgb(0xd4, 0xd4, 0xd4),
            },
            Theme::Dark => Palette {
                card_bg: Color::Rgb(0x1a, 0x1a, 0x1a),
                text: Color::Rgb(0xee, 0xee, 0xee),
                accent: Color::Rgb(0x00, 0xf2, 0xff),
                grid: Color::Rgb(0x3a, 0x3a, 0x3a),
            },
        }
    }
}

pub fn change_color(change: f64) -> Color {
    if change > 0.0 {
        GAIN
    } else {
        LOSS
    }
}
