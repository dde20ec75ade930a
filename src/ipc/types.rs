use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::years::YearRegistry;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub years: YearRegistry,
    /// Notifications written after the current response line.
    pub events: Vec<serde_json::Value>,
}

impl AppState {
    pub fn drain_events(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.events)
    }
}
