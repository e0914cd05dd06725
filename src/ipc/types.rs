use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::engine::PendingOp;
use crate::genguard::GenerationGuard;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub gen_guard: GenerationGuard,
    pub pending_ops: HashMap<String, PendingOp>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            gen_guard: GenerationGuard::new(),
            pending_ops: HashMap::new(),
        }
    }
}
