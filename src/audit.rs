use chrono::NaiveDate;

use crate::{
    error::{AppError, AppResult},
    models::LogResponse,
    repository::{RepositoryState, UnitOfWork},
};

/// AuditRecorder
///
/// Appends activity-log rows. Each record runs in its own unit of work, after the triggering
/// operation has committed, and never fails: a write error is logged and dropped so it cannot
/// turn a completed operation into an error response.
#[derive(Clone)]
pub struct AuditRecorder {
    repo: RepositoryState,
}

impl AuditRecorder {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// record
    ///
    /// `actor` is `None` when the operation has no resolvable caller (e.g. a password reset
    /// performed with a token).
    pub async fn record(&self, actor: Option<i64>, action: &str, details: impl Into<String>) {
        let details = details.into();
        let result = async {
            let mut tx = self.repo.begin().await?;
            tx.insert_log(actor, action, Some(&details)).await?;
            tx.commit().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(action, error = %e, "failed to write activity log entry");
        }
    }
}

/// list_logs
///
/// Activity log for the admin panel, newest first. `day` must be `YYYY-MM-DD`; entries
/// without a resolvable actor are shown as "System".
pub async fn list_logs(tx: &mut dyn UnitOfWork, day: Option<&str>, action: Option<&str>) -> AppResult<Vec<LogResponse>> {
    let day = match day.filter(|d| !d.is_empty()) {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| AppError::Validation("Invalid date format. Use YYYY-MM-DD.".to_string()))?,
        ),
        None => None,
    };
    let action = action.filter(|a| !a.is_empty());

    let mut entries = Vec::new();
    for log in tx.query_logs(day, action).await? {
        let username = match log.user_id {
            Some(id) => tx.user_by_id(id).await?.map(|u| u.username),
            None => None,
        };
        entries.push(LogResponse {
            id: log.id,
            timestamp: log.timestamp,
            username: username.unwrap_or_else(|| "System".to_string()),
            action: log.action,
            details: log.details,
        });
    }
    Ok(entries)
}
