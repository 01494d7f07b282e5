//! Server parameters kept in the database's `multidefs` file.
//!
//! Reading parses the file directly. Changes go through the engine's
//! change-value tool one parameter at a time; each change reports its own
//! outcome and one failing parameter does not stop the others.

use super::DatabaseControl;
use crate::utils::errors::{AdminError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Parameter file inside the data directory.
pub const PARAMETER_FILE: &str = "multidefs";

const NOT_FOUND_COMMENT: &str = "Configuration parameter not found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigParameter {
    pub config_name: String,
    /// `None` for a requested parameter the file does not define.
    pub config_value: Option<String>,
    pub config_comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigChange {
    pub config_name: String,
    /// Strings are used as given; numbers and booleans in their JSON form.
    pub config_value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    pub config_name: String,
    pub status: ChangeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ConfigChange {
    fn value_text(&self) -> String {
        match &self.config_value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// `name value comment...` per line; `--` and `#` lines are comments.
pub fn parse_parameters(content: &str) -> Vec<ConfigParameter> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--") && !line.starts_with('#'))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let name = tokens.next()?;
            let value = tokens.next()?;
            Some(ConfigParameter {
                config_name: name.to_string(),
                config_value: Some(value.to_string()),
                config_comment: tokens.collect::<Vec<_>>().join(" "),
            })
        })
        .collect()
}

/// The parameters named in `names` (case-insensitive), in request order, or
/// every parameter when `names` is empty. Unknown names are reported with
/// no value.
pub fn select_parameters(parameters: Vec<ConfigParameter>, names: &[String]) -> Vec<ConfigParameter> {
    if names.is_empty() {
        return parameters;
    }
    names
        .iter()
        .flat_map(|wanted| {
            let found: Vec<ConfigParameter> = parameters
                .iter()
                .filter(|p| p.config_name.eq_ignore_ascii_case(wanted))
                .cloned()
                .collect();
            if found.is_empty() {
                vec![ConfigParameter {
                    config_name: wanted.clone(),
                    config_value: None,
                    config_comment: NOT_FOUND_COMMENT.to_string(),
                }]
            } else {
                found
            }
        })
        .collect()
}

fn parameter_file(control: &dyn DatabaseControl, database: &str) -> Result<PathBuf> {
    Ok(control.data_directory(database)?.join(PARAMETER_FILE))
}

/// Reads the server parameters of `database`.
pub fn get_config(control: &dyn DatabaseControl, database: &str, names: &[String]) -> Result<Vec<ConfigParameter>> {
    let path = parameter_file(control, database)?;
    let content = fs::read_to_string(&path).map_err(|e| AdminError::io_at(&path, e))?;
    Ok(select_parameters(parse_parameters(&content), names))
}

/// Applies every change in order and reports each outcome.
pub fn change_config(
    control: &dyn DatabaseControl,
    database: &str,
    changes: &[ConfigChange],
) -> Result<Vec<ChangeOutcome>> {
    if changes.is_empty() {
        return Err(AdminError::MissingParameter("config"));
    }
    let path = parameter_file(control, database)?;
    fs::metadata(&path).map_err(|e| AdminError::io_at(&path, e))?;

    Ok(changes
        .iter()
        .map(|change| {
            let result = if change.config_name.trim().is_empty() {
                Err(AdminError::MissingParameter("config_name"))
            } else {
                control.set_config_value(&path, &change.config_name, &change.value_text())
            };
            match result {
                Ok(()) => {
                    info!(database = %database, parameter = %change.config_name, "Parameter changed");
                    ChangeOutcome {
                        config_name: change.config_name.clone(),
                        status: ChangeStatus::Success,
                        error_code: None,
                        error_message: None,
                    }
                }
                Err(e) => {
                    warn!(database = %database, parameter = %change.config_name, "Parameter not changed: {}", e);
                    ChangeOutcome {
                        config_name: change.config_name.clone(),
                        status: ChangeStatus::Failure,
                        error_code: Some(e.error_code()),
                        error_message: Some(e.to_string()),
                    }
                }
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ServerState;
    use crate::testing::FakeControl;
    use serde_json::json;
    use tempfile::TempDir;

    const MULTIDEFS: &str = "\
-- Parameters for database shop
# generated
Pages4K        1000    Number of 4K pages
Pages32K       200     Number of 32K pages
Users          50      Max users

TcpPort        1360
";

    fn fixture() -> (TempDir, FakeControl) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PARAMETER_FILE), MULTIDEFS).unwrap();
        let control = FakeControl::new(ServerState::Running, dir.path());
        (dir, control)
    }

    #[test]
    fn test_parse_parameters() {
        let params = parse_parameters(MULTIDEFS);
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].config_name, "Pages4K");
        assert_eq!(params[0].config_value.as_deref(), Some("1000"));
        assert_eq!(params[0].config_comment, "Number of 4K pages");
        assert_eq!(params[3].config_comment, "");
    }

    #[test]
    fn test_get_all_and_selected() {
        let (_dir, control) = fixture();
        assert_eq!(get_config(&control, "shop", &[]).unwrap().len(), 4);

        let selected = get_config(&control, "shop", &["users".into(), "Bogus".into()]).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].config_name, "Users");
        assert_eq!(selected[0].config_value.as_deref(), Some("50"));
        assert_eq!(selected[1].config_name, "Bogus");
        assert!(selected[1].config_value.is_none());
        assert_eq!(selected[1].config_comment, NOT_FOUND_COMMENT);
    }

    #[test]
    fn test_get_without_parameter_file() {
        let dir = TempDir::new().unwrap();
        let control = FakeControl::new(ServerState::Running, dir.path());
        let err = get_config(&control, "shop", &[]).unwrap_err();
        assert_eq!(err.error_code(), 2);

        control.forget_data_dir();
        assert!(matches!(
            get_config(&control, "shop", &[]).unwrap_err(),
            AdminError::Control { .. }
        ));
    }

    #[test]
    fn test_change_reports_each_parameter() {
        let (dir, control) = fixture();
        control.reject_parameter("Pages32K");
        let changes: Vec<ConfigChange> = serde_json::from_value(json!([
            {"config_name": "Users", "config_value": 80},
            {"config_name": "Pages32K", "config_value": "400"},
            {"config_name": "TcpPort", "config_value": "1361"}
        ]))
        .unwrap();

        let outcomes = change_config(&control, "shop", &changes).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, ChangeStatus::Success);
        assert_eq!(outcomes[1].status, ChangeStatus::Failure);
        assert_eq!(outcomes[1].error_code, Some(6));
        assert_eq!(outcomes[2].status, ChangeStatus::Success);

        let file = dir.path().join(PARAMETER_FILE);
        assert_eq!(
            control.changed_parameters(),
            vec![
                (file.clone(), "Users".to_string(), "80".to_string()),
                (file, "TcpPort".to_string(), "1361".to_string()),
            ]
        );
        assert_eq!(
            serde_json::to_value(&outcomes[0]).unwrap(),
            json!({"config_name": "Users", "status": "success"})
        );
    }

    #[test]
    fn test_change_needs_parameters_and_file() {
        let (_dir, control) = fixture();
        assert!(matches!(
            change_config(&control, "shop", &[]).unwrap_err(),
            AdminError::MissingParameter("config")
        ));

        let empty = TempDir::new().unwrap();
        let control = FakeControl::new(ServerState::Running, empty.path());
        let changes = vec![ConfigChange {
            config_name: "Users".into(),
            config_value: json!(10),
        }];
        assert_eq!(change_config(&control, "shop", &changes).unwrap_err().error_code(), 2);
        assert!(control.changed_parameters().is_empty());
    }
}
