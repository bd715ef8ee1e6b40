use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderContext {
    Iframe,
    Popup,
}

impl RenderContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iframe => "iframe",
            Self::Popup => "popup",
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::Iframe
    }
}

impl fmt::Display for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ParentCall,
    ChildCall,
    CloseDetected,
    UserClosed,
    ParentCloseDetected,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentCall => "parent_call",
            Self::ChildCall => "child_call",
            Self::CloseDetected => "close_detected",
            Self::UserClosed => "user_closed",
            Self::ParentCloseDetected => "parent_close_detected",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A CSS length restricted to the two units windows can be sized with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CssSize {
    Px(f64),
    Percent(f64),
}

impl CssSize {
    /// Parses `"300px"`, `"80%"`, or a bare number (treated as pixels).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(px) = raw.strip_suffix("px") {
            return px.trim().parse::<f64>().ok().map(Self::Px);
        }
        if let Some(pct) = raw.strip_suffix('%') {
            return pct.trim().parse::<f64>().ok().map(Self::Percent);
        }
        raw.parse::<f64>().ok().map(Self::Px)
    }

    /// Resolves to pixels against a total (screen or container dimension).
    pub fn to_pixels(&self, total: f64) -> f64 {
        match self {
            Self::Px(px) => *px,
            Self::Percent(pct) => total * pct / 100.0,
        }
    }
}

impl fmt::Display for CssSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Px(px) => write!(f, "{px}px"),
            Self::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: CssSize,
    pub height: CssSize,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: CssSize::Px(300.0),
            height: CssSize::Px(150.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_context_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RenderContext::Iframe).unwrap(),
            "\"iframe\""
        );
        assert_eq!(
            serde_json::to_string(&RenderContext::Popup).unwrap(),
            "\"popup\""
        );
    }

    #[test]
    fn render_context_default_is_iframe() {
        assert_eq!(RenderContext::default(), RenderContext::Iframe);
    }

    #[test]
    fn close_reason_serializes_snake_case() {
        let json = serde_json::to_string(&CloseReason::ParentCloseDetected).unwrap();
        assert_eq!(json, "\"parent_close_detected\"");

        let parsed: CloseReason = serde_json::from_str("\"user_closed\"").unwrap();
        assert_eq!(parsed, CloseReason::UserClosed);
    }

    #[test]
    fn close_reason_display_matches_wire_form() {
        assert_eq!(CloseReason::ChildCall.to_string(), "child_call");
    }

    #[test]
    fn css_size_parse_px() {
        assert_eq!(CssSize::parse("300px"), Some(CssSize::Px(300.0)));
        assert_eq!(CssSize::parse(" 42px "), Some(CssSize::Px(42.0)));
    }

    #[test]
    fn css_size_parse_percent() {
        assert_eq!(CssSize::parse("80%"), Some(CssSize::Percent(80.0)));
    }

    #[test]
    fn css_size_parse_bare_number_is_px() {
        assert_eq!(CssSize::parse("150"), Some(CssSize::Px(150.0)));
    }

    #[test]
    fn css_size_parse_invalid() {
        assert!(CssSize::parse("wide").is_none());
        assert!(CssSize::parse("px").is_none());
        assert!(CssSize::parse("%").is_none());
        assert!(CssSize::parse("").is_none());
    }

    #[test]
    fn css_size_display_roundtrip() {
        let size = CssSize::parse("250px").unwrap();
        assert_eq!(size.to_string(), "250px");
        assert_eq!(CssSize::parse(&size.to_string()), Some(size));

        let pct = CssSize::Percent(33.0);
        assert_eq!(pct.to_string(), "33%");
    }

    #[test]
    fn css_size_to_pixels() {
        assert_eq!(CssSize::Px(400.0).to_pixels(1920.0), 400.0);
        assert_eq!(CssSize::Percent(50.0).to_pixels(1920.0), 960.0);
    }

    #[test]
    fn default_dimensions() {
        let dims = Dimensions::default();
        assert_eq!(dims.width, CssSize::Px(300.0));
        assert_eq!(dims.height, CssSize::Px(150.0));
    }

    #[test]
    fn dimensions_serialization() {
        let dims = Dimensions {
            width: CssSize::Px(640.0),
            height: CssSize::Percent(100.0),
        };
        let json = serde_json::to_string(&dims).unwrap();
        let parsed: Dimensions = serde_json::from_str(&json).unwrap();
        assert_eq!(dims, parsed);
    }
}
