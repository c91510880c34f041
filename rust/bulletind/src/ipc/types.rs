use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// A parameter that is present and not `null`.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }
}

/// The open workspace, if any. Every data method needs one.
#[derive(Default)]
pub struct AppState {
    workspace: Option<(PathBuf, Connection)>,
}

impl AppState {
    pub fn open(&mut self, path: &Path, conn: Connection) {
        self.workspace = Some((path.to_path_buf(), conn));
    }

    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace.as_ref().map(|(p, _)| p.as_path())
    }

    pub fn conn(&self) -> Option<&Connection> {
        self.workspace.as_ref().map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_params_count_as_missing() {
        let req: Request = serde_json::from_value(json!({
            "id": "1",
            "method": "evaluations.record",
            "params": { "title": null, "value": 12 }
        }))
        .expect("request");
        assert!(req.param("title").is_none());
        assert!(req.param("absent").is_none());
        assert_eq!(req.param("value"), Some(&json!(12)));
    }

    #[test]
    fn missing_params_default_to_null() {
        let req: Request =
            serde_json::from_value(json!({ "id": "2", "method": "health" })).expect("request");
        assert!(req.params.is_null());
        assert!(req.param("classId").is_none());
    }

    #[test]
    fn state_starts_without_a_workspace() {
        let mut state = AppState::default();
        assert!(state.conn().is_none());
        let conn = Connection::open_in_memory().expect("memory db");
        state.open(Path::new("/tmp/ws"), conn);
        assert_eq!(state.workspace_path(), Some(Path::new("/tmp/ws")));
        assert!(state.conn().is_some());
    }
}
