//! Notification Worker - Entry Point
//!
//! Consumes user events from the incoming Redis stream, dispatches them
//! through the message bus, and periodically retries failed notifications.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    notification_worker::run().await
}
