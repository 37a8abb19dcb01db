//! Agent runtime: connect, register handlers, listen, send.
//!
//! Every agent owns one inbox channel. Messages are handled strictly one at a
//! time in arrival order; a failing or panicking handler is logged and the
//! loop moves on to the next message.

use std::sync::Arc;

use tokio::sync::watch;

use super::broker::{channel_name, Broker, Subscription};
use super::dispatch::{Action, Handler, HandlerTable};
use crate::config::TransportSettings;
use crate::error::{Error, Result};
use crate::protocol::{Envelope, EnvelopeBuilder, MessageType, Payload, Priority};

/// Optional envelope fields for [`Publisher::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub message_type: Option<MessageType>,
    pub priority: Priority,
    pub callback_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl SendOptions {
    pub fn event() -> Self {
        Self {
            message_type: Some(MessageType::Event),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_callback_id(mut self, id: impl Into<String>) -> Self {
        self.callback_id = Some(id.into());
        self
    }
}

/// Outbound half of an agent: publishes envelopes on behalf of `agent`.
///
/// Sends are at-most-once. Nothing is acknowledged; if the target agent is
/// not listening at publish time the envelope is lost.
#[derive(Clone)]
pub struct Publisher {
    agent: String,
    prefix: String,
    broker: Arc<dyn Broker>,
}

impl Publisher {
    pub fn new(agent: impl Into<String>, prefix: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        Self {
            agent: agent.into(),
            prefix: prefix.into(),
            broker,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Build an envelope to `to_agent` and publish it to that agent's inbox.
    pub async fn send(&self, to_agent: &str, payload: Payload, options: SendOptions) -> Result<Envelope> {
        let mut builder = EnvelopeBuilder::from(self.agent.clone())
            .to(to_agent)
            .message_type(options.message_type.unwrap_or(MessageType::Request))
            .priority(options.priority)
            .payload(payload);
        if let Some(id) = options.callback_id {
            builder = builder.callback_id(id);
        }
        if let Some(id) = options.correlation_id {
            builder = builder.correlation_id(id);
        }

        let envelope = builder.build();
        self.publish(&envelope).await?;
        Ok(envelope)
    }

    /// Answer `request` with a RESPONSE envelope.
    pub async fn reply(&self, request: &Envelope, payload: Payload) -> Result<Envelope> {
        let response = request.reply(payload);
        self.publish(&response).await?;
        Ok(response)
    }

    /// Publish an already-built envelope. Returns the number of receivers.
    pub async fn publish(&self, envelope: &Envelope) -> Result<usize> {
        let channel = channel_name(&self.prefix, envelope.to_agent());
        let delivered = self.broker.publish(&channel, envelope.to_json()?).await?;

        tracing::info!(
            "Sent {} to {}: {}",
            envelope.message_type(),
            envelope.to_agent(),
            envelope.message_id()
        );
        if delivered == 0 {
            tracing::debug!("No listener on {}, {} dropped", channel, envelope.message_id());
        }
        Ok(delivered)
    }
}

/// Counters returned when a listen loop stops cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenStats {
    pub handled: u64,
    pub failed: u64,
    pub missed: u64,
    pub malformed: u64,
}

/// Stops a running [`AgentRuntime::listen`] loop from another task.
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

enum Outcome {
    Handled,
    Failed,
    Missed,
    Malformed,
}

/// Connect/register/listen/send wrapper used by every agent process.
pub struct AgentRuntime<A: Action> {
    name: String,
    prefix: String,
    broker: Arc<dyn Broker>,
    handlers: HandlerTable<A>,
    subscription: Option<Box<dyn Subscription>>,
    stop: Arc<watch::Sender<bool>>,
}

impl<A: Action> AgentRuntime<A> {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            name: name.into(),
            prefix: prefix.into(),
            broker,
            handlers: HandlerTable::new(),
            subscription: None,
            stop: Arc::new(stop),
        }
    }

    /// Runtime whose inbox lives under `transport.channel_prefix`.
    pub fn from_settings(name: impl Into<String>, settings: &TransportSettings, broker: Arc<dyn Broker>) -> Self {
        Self::new(name, settings.channel_prefix.clone(), broker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// This agent's inbox channel.
    pub fn channel(&self) -> String {
        channel_name(&self.prefix, &self.name)
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.name.clone(), self.prefix.clone(), Arc::clone(&self.broker))
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Reach the broker and subscribe to the inbox.
    ///
    /// Failures here are fatal for the agent and are not retried.
    pub async fn connect(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }

        self.broker.ping().await.map_err(|e| {
            tracing::error!("Failed to connect to {} broker: {}", self.broker.name(), e);
            e
        })?;
        tracing::info!("Connected to {} broker", self.broker.name());

        let channel = self.channel();
        let subscription = self.broker.subscribe(&channel).await?;
        tracing::info!("Subscribed to channel: {}", channel);

        self.stop.send_replace(false);
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Register the handler for `action`, replacing any previous one.
    pub fn register_handler(&mut self, action: A, handler: Arc<dyn Handler>) {
        if self.handlers.insert(action, handler).is_some() {
            tracing::debug!("Replaced handler for {}", action.key());
        }
        tracing::info!("Registered handler for message type: {}", action.key());
    }

    /// Send an envelope from this agent.
    pub async fn send(&self, to_agent: &str, payload: Payload, options: SendOptions) -> Result<Envelope> {
        self.publisher().send(to_agent, payload, options).await
    }

    /// Answer `request` from this agent.
    pub async fn reply(&self, request: &Envelope, payload: Payload) -> Result<Envelope> {
        self.publisher().reply(request, payload).await
    }

    /// Process inbox messages one at a time until stopped or unsubscribed.
    ///
    /// Returns `Err` only for transport failures, which the caller should
    /// treat as fatal.
    pub async fn listen(&mut self) -> Result<ListenStats> {
        let missing = self.handlers.missing();
        if !missing.is_empty() {
            let keys: Vec<&str> = missing.iter().map(|a| a.key()).collect();
            tracing::warn!("{} has no handler for: {}", self.name, keys.join(", "));
        }

        let mut stop = self.stop.subscribe();
        let channel = self.channel();
        let publisher = self.publisher();
        let mut stats = ListenStats::default();

        let subscription = self
            .subscription
            .as_mut()
            .ok_or_else(|| Error::transport("not connected, call connect() first"))?;

        tracing::info!("Listening for messages on {}...", channel);

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            let raw = tokio::select! {
                _ = stop.changed() => continue,
                message = subscription.next_message() => message,
            };

            let raw = match raw {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Error in listen loop on {}: {}", channel, e);
                    return Err(e);
                }
            };

            match dispatch(&self.handlers, publisher.clone(), &raw).await {
                Outcome::Handled => stats.handled += 1,
                Outcome::Failed => stats.failed += 1,
                Outcome::Missed => stats.missed += 1,
                Outcome::Malformed => stats.malformed += 1,
            }
        }

        tracing::info!(
            "Stopped listening on {} ({} handled, {} failed, {} missed)",
            channel,
            stats.handled,
            stats.failed,
            stats.missed
        );
        Ok(stats)
    }

    /// Stop the loop and unsubscribe. Idempotent, also before `connect()`.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.stop.send_replace(true);
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe().await?;
            tracing::info!("Disconnected {} from {}", self.name, subscription.channel());
        }
        Ok(())
    }
}

/// Decode one raw message and run its handler to completion.
async fn dispatch<A: Action>(handlers: &HandlerTable<A>, publisher: Publisher, raw: &str) -> Outcome {
    let envelope = match Envelope::from_json(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!("Dropping malformed message: {}", e);
            return Outcome::Malformed;
        }
    };

    tracing::info!(
        "Received {} from {}: {}",
        envelope.message_type(),
        envelope.from_agent(),
        envelope.message_id()
    );

    let key = envelope.dispatch_key().unwrap_or("unknown").to_string();
    let Some((action, handler)) = handlers.resolve(&key) else {
        tracing::warn!("{}", Error::DispatchMiss(key));
        return Outcome::Missed;
    };

    let message_id = envelope.message_id().to_string();
    // Run on its own task so a panic is contained, but await it so the next
    // message never starts early.
    let joined = tokio::spawn(async move { handler.handle(envelope, publisher).await }).await;

    match joined {
        Ok(Ok(())) => {
            tracing::debug!("Handled {} ({})", message_id, action.key());
            Outcome::Handled
        }
        Ok(Err(e)) => {
            tracing::error!("Handler {} failed on {}: {}", action.key(), message_id, e);
            Outcome::Failed
        }
        Err(e) => {
            tracing::error!("Handler {} aborted on {}: {}", action.key(), message_id, e);
            Outcome::Failed
        }
    }
}
