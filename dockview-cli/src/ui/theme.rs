//! Color palette and style helpers for the dashboard

use ratatui::style::{Color, Modifier, Style};

use dockview_core::model::{EntityKind, HealthStatus, LifecycleState};

#[derive(Clone, Debug)]
pub struct Palette {
    pub panel_border: Color,
    pub text: Color,
    /// Secondary info
    pub text_dim: Color,
    /// Disabled, stale or unknown
    pub text_muted: Color,
    pub accent: Color,
    pub success: Color,
    pub warn: Color,
    pub error: Color,
    pub info: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),
            success: Color::Rgb(78, 201, 176),
            warn: Color::Rgb(220, 180, 100),
            error: Color::Rgb(244, 135, 113),
            info: Color::Rgb(156, 220, 254),
            selection_bg: Color::Rgb(38, 79, 120),
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn state_style(&self, state: LifecycleState) -> Style {
        let color = match state {
            LifecycleState::Running => self.palette.success,
            LifecycleState::Restarting | LifecycleState::Created => self.palette.warn,
            LifecycleState::Paused => self.palette.info,
            LifecycleState::Exited => self.palette.text_dim,
            LifecycleState::Dead => self.palette.error,
            LifecycleState::Unknown => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    pub fn state_icon(&self, state: LifecycleState) -> &'static str {
        match state {
            LifecycleState::Running => "●",
            LifecycleState::Created => "◐",
            LifecycleState::Restarting => "⟲",
            LifecycleState::Paused => "‖",
            LifecycleState::Exited => "○",
            LifecycleState::Dead => "✗",
            LifecycleState::Unknown => "?",
        }
    }

    pub fn health_style(&self, health: HealthStatus) -> Style {
        let color = match health {
            HealthStatus::Healthy => self.palette.success,
            HealthStatus::Starting => self.palette.warn,
            HealthStatus::Unhealthy => self.palette.error,
        };
        Style::default().fg(color)
    }

    pub fn health_icon(&self, health: HealthStatus) -> &'static str {
        match health {
            HealthStatus::Healthy => "✓",
            HealthStatus::Starting => "~",
            HealthStatus::Unhealthy => "!",
        }
    }

    pub fn kind_icon(&self, kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Stack => "▣",
            EntityKind::Service => "◆",
            EntityKind::Container => "·",
        }
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn border_style(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.palette.accent)
        } else {
            Style::default().fg(self.palette.panel_border)
        }
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    /// Rows whose state is an unconfirmed optimistic transition
    pub fn optimistic_style(&self) -> Style {
        Style::default()
            .fg(self.palette.warn)
            .add_modifier(Modifier::ITALIC)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

pub mod styles {
    use super::*;

    pub fn state(state: LifecycleState) -> Style {
        theme().state_style(state)
    }

    pub fn state_icon(state: LifecycleState) -> &'static str {
        theme().state_icon(state)
    }

    pub fn health(health: HealthStatus) -> Style {
        theme().health_style(health)
    }

    pub fn health_icon(health: HealthStatus) -> &'static str {
        theme().health_icon(health)
    }

    pub fn kind_icon(kind: EntityKind) -> &'static str {
        theme().kind_icon(kind)
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn border(focused: bool) -> Style {
        theme().border_style(focused)
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn optimistic() -> Style {
        theme().optimistic_style()
    }

    pub fn text() -> Style {
        Style::default().fg(theme().palette.text)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(theme().palette.text_dim)
    }

    pub fn text_muted() -> Style {
        Style::default().fg(theme().palette.text_muted)
    }

    pub fn accent_bold() -> Style {
        Style::default()
            .fg(theme().palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn success() -> Style {
        Style::default().fg(theme().palette.success)
    }

    pub fn warn() -> Style {
        Style::default().fg(theme().palette.warn)
    }

    pub fn error() -> Style {
        Style::default().fg(theme().palette.error)
    }

    pub fn info() -> Style {
        Style::default().fg(theme().palette.info)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(theme().palette.text)
            .add_modifier(Modifier::BOLD)
    }
}
