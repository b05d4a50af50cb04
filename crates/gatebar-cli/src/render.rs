//! Polybar formatting for broker replies.

use std::env;

const DEFAULT_ICON_CONNECTED: &str = "\u{f998}";
const DEFAULT_ICON_DISCONNECTED: &str = "\u{f997}";
const DEFAULT_ICON_CONNECTING: &str = "\u{fc7e}";
const DEFAULT_ICON_ERROR: &str = "\u{f071}";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Style {
    color: String,
    icon: String,
}

impl Style {
    fn format(&self) -> String {
        format!("%{{F#{}}}{}%{{F-}}", self.color, self.icon)
    }
}

/// Colour and icon per displayed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    connected: Style,
    disconnected: Style,
    connecting: Style,
    error: Style,
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Palette {
    /// Defaults overridden by `APPGATE_COLOR_<STATE>` and `APPGATE_ICON_<STATE>`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let style = |state: &str, color: &str, icon: &str| {
            let var = |kind: &str| lookup(format!("APPGATE_{kind}_{state}").as_str());
            Style {
                color: var("COLOR").unwrap_or_else(|| color.to_string()),
                icon: var("ICON").unwrap_or_else(|| icon.to_string()),
            }
        };

        Self {
            connected: style("CONNECTED", "55AA55", DEFAULT_ICON_CONNECTED),
            disconnected: style("DISCONNECTED", "FF7070", DEFAULT_ICON_DISCONNECTED),
            connecting: style("CONNECTING", "F5A70A", DEFAULT_ICON_CONNECTING),
            error: style("ERROR", "FF7070", DEFAULT_ICON_ERROR),
        }
    }

    /// Format a broker reply; anything unrecognized shows as disconnected.
    #[must_use]
    pub fn render(&self, reply: &str) -> String {
        let style = match reply {
            "login" | "connecting" => &self.connecting,
            "connected" => &self.connected,
            "error" | "unknown" => &self.error,
            _ => &self.disconnected,
        };
        style.format()
    }

    /// Shown when the broker cannot be reached
    #[must_use]
    pub fn render_unreachable(&self) -> String {
        self.error.format()
    }
}
