//! Read-side queries over the request store.
//!
//! These bypass the unit of work on purpose: they mutate nothing and mark
//! nothing seen.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NotificationResult;
use crate::model::{NotificationRequest, TemplateVars, UserID};
use crate::store::RequestStore;

/// Wire-friendly view of one notification request.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationHistoryItem {
    pub notification_id: String,
    pub notification_type: String,
    pub recipient_email: String,
    pub subject: String,
    pub content: String,
    pub template_vars: TemplateVars,
    pub status: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRequest> for NotificationHistoryItem {
    fn from(request: NotificationRequest) -> Self {
        Self {
            notification_id: request.notification_id().to_string(),
            notification_type: request.notification_type().to_string(),
            recipient_email: request.recipient_email().to_string(),
            subject: request.subject().to_string(),
            content: request.content().to_string(),
            template_vars: request.template_vars().clone(),
            status: request.status().to_string(),
            retry_count: request.retry_count(),
            created_at: request.created_at(),
        }
    }
}

/// A user's notification history, newest first.
pub async fn notification_history(
    store: &dyn RequestStore,
    userid: &UserID,
    limit: usize,
) -> NotificationResult<Vec<NotificationHistoryItem>> {
    let history = store.history(userid, limit).await?;
    Ok(history.into_iter().map(NotificationHistoryItem::from).collect())
}

/// Failed notifications still eligible for retry.
pub async fn failed_notifications(
    store: &dyn RequestStore,
    max_retry_count: u32,
) -> NotificationResult<Vec<NotificationHistoryItem>> {
    let failed = store.failed_requests(max_retry_count).await?;
    Ok(failed.into_iter().map(NotificationHistoryItem::from).collect())
}
