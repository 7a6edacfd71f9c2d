//! Protocol types for producer/daemon communication.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::geometry::Point;
use crate::snapshot::ControllerStatus;

/// A request from a producer or the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub command: Command,
}

/// Commands the daemon can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Replace the target list with a fresh detection result.
    UpdateTargets { targets: Vec<Point> },
    /// Replace the latest screenshot with the image stored at `path`.
    UpdateScreenshot { path: String },
    /// Report controller state.
    Status,
    /// List recorded clicks, oldest first.
    History { limit: Option<usize> },
    /// Start the controller loop.
    Start,
    /// Stop the controller loop, keeping the daemon up.
    Stop,
    /// Stop the controller and shut the daemon down.
    Shutdown,
}

/// A response from the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl Response {
    pub fn success(id: impl Into<String>, data: ResponseData) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: ApiError) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Response payload variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    Status(ControllerStatus),
    /// Recorded clicks in screenshot space, oldest first.
    History { total: usize, clicks: Vec<Point> },
    /// Generic success message.
    Ok { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_targets_wire_format() {
        let json = r#"{"id":"7","command":{"action":"update_targets","targets":[{"x":10,"y":20}]}}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            request.command,
            Command::UpdateTargets {
                targets: vec![Point::new(10, 20)]
            }
        );
    }

    #[test]
    fn unit_commands_are_tagged() {
        let json = serde_json::to_string(&Command::Shutdown).unwrap();
        assert_eq!(json, r#"{"action":"shutdown"}"#);
        let history: Command = serde_json::from_str(r#"{"action":"history"}"#).unwrap();
        assert_eq!(history, Command::History { limit: None });
    }

    #[test]
    fn error_response_omits_data() {
        let response = Response::error("1", ApiError::not_running());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("\"data\""));
        assert!(json.contains("NOT_RUNNING"));
    }
}
