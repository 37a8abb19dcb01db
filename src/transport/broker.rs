//! Pub/sub broker abstraction.

use async_trait::async_trait;

use crate::error::Result;

/// Channel name for an agent's inbox: `{prefix}:{agent}`.
pub fn channel_name(prefix: &str, agent: &str) -> String {
    format!("{}:{}", prefix, agent)
}

/// Fire-and-forget publish/subscribe backend.
///
/// Delivery is at-most-once: a message published to a channel with no
/// subscriber is dropped, and nothing is acknowledged or redelivered.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Publish a raw message. Returns how many subscribers received it.
    async fn publish(&self, channel: &str, message: String) -> Result<usize>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>>;
}

/// A live subscription to one channel.
#[async_trait]
pub trait Subscription: Send {
    fn channel(&self) -> &str;

    /// Next raw message in arrival order.
    ///
    /// `Ok(None)` once unsubscribed; `Err` when the connection is lost.
    async fn next_message(&mut self) -> Result<Option<String>>;

    /// Stop receiving. Safe to call more than once.
    async fn unsubscribe(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name("agent", "vision"), "agent:vision");
        assert_eq!(channel_name("a2a", "form"), "a2a:form");
    }
}
