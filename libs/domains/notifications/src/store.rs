//! Persistence seam for the notification aggregates.
//!
//! The core never talks to a database directly; it goes through these store
//! traits, scoped per aggregate type. The in-memory implementations back
//! tests and the default worker wiring.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::NotificationResult;
use crate::model::{
    NotificationID, NotificationPreferences, NotificationRequest, NotificationStatus, UserID,
};

/// Storage for `NotificationPreferences`, keyed by user.
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    async fn get(&self, userid: &UserID) -> NotificationResult<Option<NotificationPreferences>>;
    async fn save(&self, preferences: &NotificationPreferences) -> NotificationResult<()>;
}

/// Storage for `NotificationRequest`, keyed by notification id, with the
/// read-side queries the service exposes.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get(
        &self,
        notification_id: &NotificationID,
    ) -> NotificationResult<Option<NotificationRequest>>;
    async fn save(&self, request: &NotificationRequest) -> NotificationResult<()>;

    /// Failed requests still below the retry cap.
    async fn failed_requests(
        &self,
        max_retry_count: u32,
    ) -> NotificationResult<Vec<NotificationRequest>>;

    /// A user's requests, newest first.
    async fn history(
        &self,
        userid: &UserID,
        limit: usize,
    ) -> NotificationResult<Vec<NotificationRequest>>;
}

/// In-memory preferences store.
#[derive(Default)]
pub struct InMemoryPreferencesStore {
    inner: RwLock<HashMap<UserID, NotificationPreferences>>,
}

#[async_trait]
impl PreferencesStore for InMemoryPreferencesStore {
    async fn get(&self, userid: &UserID) -> NotificationResult<Option<NotificationPreferences>> {
        Ok(self.inner.read().await.get(userid).cloned())
    }

    async fn save(&self, preferences: &NotificationPreferences) -> NotificationResult<()> {
        self.inner
            .write()
            .await
            .insert(preferences.userid().clone(), preferences.clone());
        Ok(())
    }
}

/// In-memory request store.
#[derive(Default)]
pub struct InMemoryRequestStore {
    inner: RwLock<HashMap<NotificationID, NotificationRequest>>,
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn get(
        &self,
        notification_id: &NotificationID,
    ) -> NotificationResult<Option<NotificationRequest>> {
        Ok(self.inner.read().await.get(notification_id).cloned())
    }

    async fn save(&self, request: &NotificationRequest) -> NotificationResult<()> {
        self.inner
            .write()
            .await
            .insert(request.notification_id().clone(), request.clone());
        Ok(())
    }

    async fn failed_requests(
        &self,
        max_retry_count: u32,
    ) -> NotificationResult<Vec<NotificationRequest>> {
        let mut failed: Vec<NotificationRequest> = self
            .inner
            .read()
            .await
            .values()
            .filter(|r| r.status() == NotificationStatus::Failed && r.retry_count() < max_retry_count)
            .cloned()
            .collect();
        failed.sort_by_key(|r| r.created_at());
        Ok(failed)
    }

    async fn history(
        &self,
        userid: &UserID,
        limit: usize,
    ) -> NotificationResult<Vec<NotificationRequest>> {
        let mut history: Vec<NotificationRequest> = self
            .inner
            .read()
            .await
            .values()
            .filter(|r| r.userid() == userid)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        history.truncate(limit);
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationType, TemplateVars};

    const USER: &str = "a1b2c3d4e5f6789012345678901234ab";

    fn request(notification_type: NotificationType) -> NotificationRequest {
        NotificationRequest::create(
            NotificationID::generate().as_str(),
            USER,
            notification_type,
            "user@example.com",
            "subject",
            "body",
            TemplateVars::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_preferences_save_and_get() {
        let store = InMemoryPreferencesStore::default();
        let preferences =
            NotificationPreferences::create(USER, "user@example.com", &HashMap::new()).unwrap();

        store.save(&preferences).await.unwrap();
        let loaded = store.get(preferences.userid()).await.unwrap().unwrap();
        assert_eq!(loaded.userid(), preferences.userid());
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let store = InMemoryRequestStore::default();
        for _ in 0..3 {
            store.save(&request(NotificationType::Welcome)).await.unwrap();
            // Distinct timestamps so the ordering is observable.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let userid = UserID::new(USER).unwrap();
        let history = store.history(&userid, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at() >= history[1].created_at());
    }

    #[tokio::test]
    async fn test_failed_requests_filters_status_and_retry_count() {
        let store = InMemoryRequestStore::default();

        let mut retryable = request(NotificationType::Welcome);
        retryable.mark_as_failed("boom");

        let mut exhausted = request(NotificationType::Welcome);
        for _ in 0..3 {
            exhausted.increment_retry();
        }
        exhausted.mark_as_failed("boom");

        let sent = {
            let mut r = request(NotificationType::Welcome);
            r.mark_as_sent();
            r
        };

        store.save(&retryable).await.unwrap();
        store.save(&exhausted).await.unwrap();
        store.save(&sent).await.unwrap();

        let failed = store.failed_requests(3).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].notification_id(), retryable.notification_id());
    }
}
