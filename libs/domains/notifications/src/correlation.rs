//! Correlation-id propagation across message handling.
//!
//! The bus enters a scope per dispatched message; any event metadata
//! created inside that scope (aggregate behavior, nested handlers) inherits
//! the correlation id of the message that caused it.

use std::future::Future;

use uuid::Uuid;

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Mint a fresh correlation id.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The correlation id of the message currently being handled, or a fresh
/// one when called outside a dispatch scope.
pub fn current_or_new() -> String {
    CORRELATION_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| new_correlation_id())
}

/// Run `fut` with `correlation_id` as the ambient correlation id.
pub async fn scope<F: Future>(correlation_id: String, fut: F) -> F::Output {
    CORRELATION_ID.scope(correlation_id, fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_sets_ambient_id() {
        let inherited = scope("abc123".to_string(), async { current_or_new() }).await;
        assert_eq!(inherited, "abc123");
    }

    #[test]
    fn test_outside_scope_mints_fresh_ids() {
        let a = current_or_new();
        let b = current_or_new();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_nested_scopes_shadow() {
        let observed = scope("outer0000outer0000outer0000outer".to_string(), async {
            let inner = scope("inner1111inner1111inner1111inner".to_string(), async {
                current_or_new()
            })
            .await;
            (inner, current_or_new())
        })
        .await;

        assert_eq!(observed.0, "inner1111inner1111inner1111inner");
        assert_eq!(observed.1, "outer0000outer0000outer0000outer");
    }
}
