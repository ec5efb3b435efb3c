// Bitbucket Server maintenance API constants

pub mod maintenance_api_path {
    // Maintenance lock
    pub const LOCK: &str = "/mvc/maintenance/lock";
    pub const STATUS: &str = "/mvc/maintenance";

    // Backups
    pub const BACKUP: &str = "/mvc/admin/backups";
    pub const BACKUP_PROGRESS: &str = "/mvc/admin/backups/progress/client";
}

/// Header carrying the unlock token once the maintenance lock is held
pub const MAINTENANCE_TOKEN_HEADER: &str = "X-Atlassian-Maintenance-Token";

/// Subsystem state reported once in-flight operations have completed
pub const DRAINED: &str = "DRAINED";

/// Progress value that tells the server the backup has finished
pub const PROGRESS_COMPLETE: u8 = 100;

/// Lowest and highest progress a client may report while locked
pub const PROGRESS_MIN: i32 = 1;
pub const PROGRESS_MAX: i32 = 99;

// Expected response codes
pub const STATUS_ACCEPTED: u16 = 202;
pub const STATUS_OK: u16 = 200;
