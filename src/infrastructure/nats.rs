//! Domain events over NATS

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::application::ports::EventPublisher;
use crate::domain::events::DomainEvent;

pub struct NatsEventPublisher {
    client: async_nats::Client,
}

impl NatsEventPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(async_nats::connect(url).await?))
    }
}

/// JSON body published for an event.
pub fn payload(event: &DomainEvent) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&json!({
        "subject": event.subject(),
        "occurred_at": Utc::now(),
        "event": event,
    }))
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.client.publish(event.subject().to_string(), payload(event)?.into()).await?;
        Ok(())
    }
}
