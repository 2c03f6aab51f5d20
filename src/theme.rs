use crate::status::Status;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Theme {
    pub font_family: String,
    pub font_size: f32,
    /// Size of the nested flow id under a flow label.
    pub flow_id_font_size: f32,
    pub text_color: String,
    pub background: String,
    pub node_fill: String,
    pub node_border: String,
    pub flow_fill: String,
    pub flow_border: String,
    pub edge_color: String,
    pub selected_border: String,
    pub disabled_opacity: f32,
    pub status_colors: StatusColors,
}

impl Default for Theme {
    fn default() -> Self {
        Self::console()
    }
}

impl Theme {
    pub fn console() -> Self {
        Self {
            font_family: "\"Helvetica Neue\", Helvetica, Arial, sans-serif".to_string(),
            font_size: 12.0,
            flow_id_font_size: 8.0,
            text_color: "#333333".to_string(),
            background: "#FFFFFF".to_string(),
            node_fill: "#FFFFFF".to_string(),
            node_border: "#999999".to_string(),
            flow_fill: "#F5F5F5".to_string(),
            flow_border: "#777777".to_string(),
            edge_color: "#777777".to_string(),
            selected_border: "#009FC9".to_string(),
            disabled_opacity: 0.35,
            status_colors: StatusColors::default(),
        }
    }

    pub fn dark() -> Self {
        Self {
            text_color: "#E6E6E6".to_string(),
            background: "#1E1F22".to_string(),
            node_fill: "#2B2D31".to_string(),
            node_border: "#6B6F76".to_string(),
            flow_fill: "#25272B".to_string(),
            flow_border: "#8A8F98".to_string(),
            edge_color: "#8A8F98".to_string(),
            selected_border: "#4FC3F7".to_string(),
            ..Self::console()
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "console" | "default" => Some(Self::console()),
            "dark" => Some(Self::dark()),
            _ => None,
        }
    }
}

/// Border colors keyed by execution status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusColors {
    pub running: String,
    pub succeeded: String,
    pub failed: String,
    pub killed: String,
    pub paused: String,
    pub queued: String,
    pub skipped: String,
}

impl Default for StatusColors {
    fn default() -> Self {
        Self {
            running: "#3398CC".to_string(),
            succeeded: "#5CB85C".to_string(),
            failed: "#D9534F".to_string(),
            killed: "#FF9999".to_string(),
            paused: "#C92CE6".to_string(),
            queued: "#009FC9".to_string(),
            skipped: "#AAAAAA".to_string(),
        }
    }
}

impl StatusColors {
    /// `None` keeps the theme's default border.
    pub fn color(&self, status: Status) -> Option<&str> {
        let color = match status {
            Status::Running | Status::Preparing | Status::Killing => &self.running,
            Status::Succeeded => &self.succeeded,
            Status::Failed | Status::FailedFinishing => &self.failed,
            Status::Killed => &self.killed,
            Status::Paused => &self.paused,
            Status::Queued | Status::Waiting => &self.queued,
            Status::Skipped | Status::Disabled => &self.skipped,
            Status::Ready | Status::Unknown => return None,
        };
        Some(color.as_str())
    }
}
