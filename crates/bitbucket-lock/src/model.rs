// Wire model for the maintenance and backup endpoints

use std::fmt;

use serde::Deserialize;

/// Body returned when the maintenance lock is granted
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LockResponse {
    pub unlock_token: String,
}

/// Body returned when an external backup is started
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BackupResponse {
    pub cancel_token: String,
}

/// State of a server subsystem while the maintenance lock is held
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubsystemState {
    Available,
    Draining,
    Drained,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubsystemState::Available => "AVAILABLE",
            SubsystemState::Draining => "DRAINING",
            SubsystemState::Drained => crate::constants::DRAINED,
            SubsystemState::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Maintenance status as reported by the status endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MaintenanceStatus {
    pub db_state: SubsystemState,
    pub scm_state: SubsystemState,
}

impl MaintenanceStatus {
    /// Both the database and SCM subsystems have drained
    pub fn is_drained(&self) -> bool {
        self.db_state == SubsystemState::Drained && self.scm_state == SubsystemState::Drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_response_deserialization() {
        let json = r#"{"unlockToken":"T1","owner":{"name":"admin"}}"#;
        let resp: LockResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.unlock_token, "T1");
    }

    #[test]
    fn test_backup_response_deserialization() {
        let json = r#"{"cancelToken":"C1"}"#;
        let resp: BackupResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.cancel_token, "C1");

        assert!(serde_json::from_str::<BackupResponse>(r#"{"token":"C1"}"#).is_err());
    }

    #[test]
    fn test_maintenance_status() {
        let json = r#"{"db-state":"DRAINING","scm-state":"DRAINED"}"#;
        let status: MaintenanceStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.db_state, SubsystemState::Draining);
        assert_eq!(status.scm_state, SubsystemState::Drained);
        assert!(!status.is_drained());

        let json = r#"{"db-state":"DRAINED","scm-state":"DRAINED","task":{}}"#;
        let status: MaintenanceStatus = serde_json::from_str(json).unwrap();
        assert!(status.is_drained());
    }

    #[test]
    fn test_unknown_subsystem_state() {
        let json = r#"{"db-state":"CLOSED","scm-state":"DRAINED"}"#;
        let status: MaintenanceStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.db_state, SubsystemState::Unknown);
        assert!(!status.is_drained());
        assert_eq!(status.scm_state.to_string(), "DRAINED");
    }
}
