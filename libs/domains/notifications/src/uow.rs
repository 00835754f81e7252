//! Unit of work: one transactional scope over the aggregate repositories,
//! plus collection of the domain events raised inside it.
//!
//! Repositories track every aggregate touched during the scope (added or
//! fetched) in an identity map owned by this unit-of-work instance. That
//! map is both the staging area for `commit` and the "seen" set the event
//! drain walks, so callers never have to list event sources manually.
//! Dropping an uncommitted unit of work discards all staged changes.

use std::sync::Arc;

use tracing::debug;

use crate::error::NotificationResult;
use crate::events::Event;
use crate::model::{NotificationID, NotificationPreferences, NotificationRequest, UserID};
use crate::store::{PreferencesStore, RequestStore};

/// Scope-local repository for `NotificationPreferences`.
pub struct PreferencesRepository {
    store: Arc<dyn PreferencesStore>,
    tracked: Vec<NotificationPreferences>,
}

impl PreferencesRepository {
    fn new(store: Arc<dyn PreferencesStore>) -> Self {
        Self {
            store,
            tracked: Vec::new(),
        }
    }

    /// Stage a new aggregate and mark it seen.
    pub fn add(&mut self, preferences: NotificationPreferences) -> &mut NotificationPreferences {
        let index = self.tracked.len();
        self.tracked.push(preferences);
        &mut self.tracked[index]
    }

    /// Fetch by user id, marking the aggregate seen. Within one scope the
    /// same instance is returned on every call. Aggregates come out of
    /// storage with an empty event queue.
    pub async fn get(
        &mut self,
        userid: &UserID,
    ) -> NotificationResult<Option<&mut NotificationPreferences>> {
        if let Some(index) = self.tracked.iter().position(|p| p.userid() == userid) {
            return Ok(Some(&mut self.tracked[index]));
        }

        let Some(mut preferences) = self.store.get(userid).await? else {
            return Ok(None);
        };
        preferences.clear_events();
        self.tracked.push(preferences);
        Ok(self.tracked.last_mut())
    }

    async fn flush(&self) -> NotificationResult<()> {
        for preferences in &self.tracked {
            self.store.save(preferences).await?;
        }
        Ok(())
    }
}

/// Scope-local repository for `NotificationRequest`.
pub struct RequestRepository {
    store: Arc<dyn RequestStore>,
    tracked: Vec<NotificationRequest>,
}

impl RequestRepository {
    fn new(store: Arc<dyn RequestStore>) -> Self {
        Self {
            store,
            tracked: Vec::new(),
        }
    }

    /// Stage a new request and mark it seen.
    pub fn add(&mut self, request: NotificationRequest) -> &mut NotificationRequest {
        let index = self.tracked.len();
        self.tracked.push(request);
        &mut self.tracked[index]
    }

    /// Fetch by notification id, marking the request seen. Aggregates come
    /// out of storage with an empty event queue.
    pub async fn get(
        &mut self,
        notification_id: &NotificationID,
    ) -> NotificationResult<Option<&mut NotificationRequest>> {
        if let Some(index) = self
            .tracked
            .iter()
            .position(|r| r.notification_id() == notification_id)
        {
            return Ok(Some(&mut self.tracked[index]));
        }

        let Some(mut request) = self.store.get(notification_id).await? else {
            return Ok(None);
        };
        request.clear_events();
        self.tracked.push(request);
        Ok(self.tracked.last_mut())
    }

    /// Failed requests still below the retry cap. Read-side; does not mark
    /// anything seen.
    pub async fn get_failed_notifications(
        &self,
        max_retry_count: u32,
    ) -> NotificationResult<Vec<NotificationRequest>> {
        self.store.failed_requests(max_retry_count).await
    }

    /// A user's requests, newest first. Read-side; does not mark anything
    /// seen.
    pub async fn get_notification_history(
        &self,
        userid: &UserID,
        limit: usize,
    ) -> NotificationResult<Vec<NotificationRequest>> {
        self.store.history(userid, limit).await
    }

    async fn flush(&self) -> NotificationResult<()> {
        for request in &self.tracked {
            self.store.save(request).await?;
        }
        Ok(())
    }
}

/// One transactional scope. Create per message dispatch, commit explicitly;
/// anything uncommitted is discarded when the scope ends.
pub struct UnitOfWork {
    pub preferences: PreferencesRepository,
    pub requests: RequestRepository,
    committed: bool,
}

impl UnitOfWork {
    pub fn new(
        preferences_store: Arc<dyn PreferencesStore>,
        request_store: Arc<dyn RequestStore>,
    ) -> Self {
        Self {
            preferences: PreferencesRepository::new(preferences_store),
            requests: RequestRepository::new(request_store),
            committed: false,
        }
    }

    /// Persist every aggregate touched during this scope.
    pub async fn commit(&mut self) -> NotificationResult<()> {
        self.preferences.flush().await?;
        self.requests.flush().await?;
        self.committed = true;
        Ok(())
    }

    /// Discard all staged changes explicitly.
    pub fn rollback(&mut self) {
        self.preferences.tracked.clear();
        self.requests.tracked.clear();
    }

    /// Drain the events raised by every tracked aggregate, oldest first.
    /// Each aggregate's queue is fully drained before moving on; a yielded
    /// event is never yielded again.
    pub fn collect_new_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for preferences in &mut self.preferences.tracked {
            while let Some(event) = preferences.pop_event() {
                events.push(event);
            }
        }
        for request in &mut self.requests.tracked {
            while let Some(event) = request.pop_event() {
                events.push(event);
            }
        }
        events
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.committed
            && (!self.preferences.tracked.is_empty() || !self.requests.tracked.is_empty())
        {
            debug!("Unit of work dropped without commit; staged changes discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationType, TemplateVars};
    use crate::store::{InMemoryPreferencesStore, InMemoryRequestStore};
    use std::collections::HashMap;

    const USER: &str = "a1b2c3d4e5f6789012345678901234ab";

    fn uow() -> (UnitOfWork, Arc<InMemoryPreferencesStore>, Arc<InMemoryRequestStore>) {
        let preferences_store = Arc::new(InMemoryPreferencesStore::default());
        let request_store = Arc::new(InMemoryRequestStore::default());
        (
            UnitOfWork::new(preferences_store.clone(), request_store.clone()),
            preferences_store,
            request_store,
        )
    }

    #[tokio::test]
    async fn test_commit_persists_staged_aggregates() {
        let (mut uow, preferences_store, _) = uow();
        let preferences =
            NotificationPreferences::create(USER, "user@example.com", &HashMap::new()).unwrap();
        let userid = preferences.userid().clone();

        uow.preferences.add(preferences);
        uow.commit().await.unwrap();

        assert!(preferences_store.get(&userid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropping_without_commit_rolls_back() {
        let preferences_store = Arc::new(InMemoryPreferencesStore::default());
        let request_store = Arc::new(InMemoryRequestStore::default());
        let userid = UserID::new(USER).unwrap();

        {
            let mut uow = UnitOfWork::new(preferences_store.clone(), request_store.clone());
            let preferences =
                NotificationPreferences::create(USER, "user@example.com", &HashMap::new()).unwrap();
            uow.preferences.add(preferences);
            // No commit.
        }

        assert!(preferences_store.get(&userid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_returns_aggregate_with_cleared_events() {
        let (mut uow, preferences_store, _) = uow();
        let preferences =
            NotificationPreferences::create(USER, "user@example.com", &HashMap::new()).unwrap();
        let userid = preferences.userid().clone();
        // Saved with its creation event still queued, as commit would.
        preferences_store.save(&preferences).await.unwrap();

        let loaded = uow.preferences.get(&userid).await.unwrap().unwrap();
        assert!(loaded.pop_event().is_none());
    }

    #[tokio::test]
    async fn test_collect_new_events_drains_fifo_and_only_once() {
        let (mut uow, _, _) = uow();
        let preferences =
            NotificationPreferences::create(USER, "user@example.com", &HashMap::new()).unwrap();
        let staged = uow.preferences.add(preferences);
        staged.update_preferences(&HashMap::from([("welcome".to_string(), false)]));

        let events = uow.collect_new_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::PreferencesCreated(_)));
        assert!(matches!(events[1], Event::PreferencesUpdated(_)));

        assert!(uow.collect_new_events().is_empty());
    }

    #[tokio::test]
    async fn test_get_is_identity_mapped_within_scope() {
        let (mut uow, preferences_store, _) = uow();
        let preferences =
            NotificationPreferences::create(USER, "user@example.com", &HashMap::new()).unwrap();
        let userid = preferences.userid().clone();
        preferences_store.save(&preferences).await.unwrap();

        {
            let first = uow.preferences.get(&userid).await.unwrap().unwrap();
            first.update_preferences(&HashMap::from([("welcome".to_string(), false)]));
        }
        let second = uow.preferences.get(&userid).await.unwrap().unwrap();
        assert!(!second.is_notification_enabled(NotificationType::Welcome));
    }

    #[tokio::test]
    async fn test_rollback_clears_tracked_state() {
        let (mut uow, _, _) = uow();
        let request = NotificationRequest::create(
            NotificationID::generate().as_str(),
            USER,
            NotificationType::Welcome,
            "user@example.com",
            "subject",
            "body",
            TemplateVars::new(),
        )
        .unwrap();

        uow.requests.add(request);
        uow.rollback();
        assert!(uow.collect_new_events().is_empty());
        uow.commit().await.unwrap();
    }
}
