use anyhow::Result;
use flume::{bounded, Receiver, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{EventSinkKind, EventsConfig, KafkaConfig};
use crate::database::models::{ChatRecord, DiagnosisRecord};
use crate::models::assistant::TentativeDiagnosis;
use crate::services::event_bus::{EventBus, PublishedEvent};

/// Outcome records published after a request is handled
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum OutcomeEvent {
    LowConfidence {
        session_id: Uuid,
        user_id: Option<i64>,
        diagnosis: TentativeDiagnosis,
    },
    DiagnosisCreated(DiagnosisRecord),
    ChatCreated(ChatRecord),
}

impl OutcomeEvent {
    /// Partition key: events of one session stay ordered on the broker
    pub fn key(&self) -> String {
        match self {
            OutcomeEvent::LowConfidence { session_id, .. } => session_id.to_string(),
            OutcomeEvent::DiagnosisCreated(record) => record.session_id.to_string(),
            OutcomeEvent::ChatCreated(record) => record.session_id.to_string(),
        }
    }
}

/// Transport for serialized outcome events
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &serde_json::Value) -> Result<()>;
}

/// Publishes onto the in-process event bus
pub struct BroadcastSink {
    bus: Arc<EventBus>,
}

impl BroadcastSink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait::async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, topic: &str, _key: &str, payload: &serde_json::Value) -> Result<()> {
        self.bus.publish(PublishedEvent {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// librdkafka producer properties for the configured cluster
pub fn kafka_client_settings(config: &KafkaConfig) -> Vec<(String, String)> {
    let mut settings = vec![
        (
            "bootstrap.servers".to_string(),
            config.bootstrap_servers.clone(),
        ),
        (
            "security.protocol".to_string(),
            config.security_protocol.clone(),
        ),
        (
            "message.timeout.ms".to_string(),
            config.delivery_timeout_ms.to_string(),
        ),
    ];

    if let (Some(username), Some(password)) = (&config.sasl_username, &config.sasl_password) {
        settings.push(("sasl.mechanisms".to_string(), config.sasl_mechanism.clone()));
        settings.push(("sasl.username".to_string(), username.clone()));
        settings.push(("sasl.password".to_string(), password.clone()));
    }

    settings
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaSink;

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;

    pub struct KafkaSink {
        producer: FutureProducer,
        timeout: Duration,
    }

    impl KafkaSink {
        pub fn new(config: &KafkaConfig) -> Result<Self> {
            let mut client = ClientConfig::new();
            for (key, value) in kafka_client_settings(config) {
                client.set(key, value);
            }

            let producer: FutureProducer = client.create()?;
            info!("Kafka producer created for {}", config.bootstrap_servers);

            Ok(Self {
                producer,
                timeout: Duration::from_millis(config.delivery_timeout_ms),
            })
        }
    }

    #[async_trait::async_trait]
    impl EventSink for KafkaSink {
        async fn publish(
            &self,
            topic: &str,
            key: &str,
            payload: &serde_json::Value,
        ) -> Result<()> {
            let body = serde_json::to_string(payload)?;
            let record = FutureRecord::to(topic).key(key).payload(&body);

            self.producer
                .send(record, Timeout::After(self.timeout))
                .await
                .map_err(|(e, _)| anyhow::anyhow!("Kafka delivery failed: {}", e))?;
            Ok(())
        }
    }
}

/// Pick the sink named in config; anything unavailable falls back to the event bus
pub fn build_sink(config: &EventsConfig, bus: Arc<EventBus>) -> Arc<dyn EventSink> {
    match config.sink {
        EventSinkKind::Broadcast => Arc::new(BroadcastSink::new(bus)),
        EventSinkKind::Kafka => kafka_sink_or_fallback(config, bus),
    }
}

#[cfg(feature = "kafka")]
fn kafka_sink_or_fallback(config: &EventsConfig, bus: Arc<EventBus>) -> Arc<dyn EventSink> {
    let Some(kafka) = config.kafka.as_ref() else {
        warn!("events.sink = kafka but [events.kafka] is missing, using broadcast");
        return Arc::new(BroadcastSink::new(bus));
    };

    match KafkaSink::new(kafka) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Failed to initialize Kafka producer: {}, using broadcast", e);
            Arc::new(BroadcastSink::new(bus))
        }
    }
}

#[cfg(not(feature = "kafka"))]
fn kafka_sink_or_fallback(_config: &EventsConfig, bus: Arc<EventBus>) -> Arc<dyn EventSink> {
    warn!("events.sink = kafka but the binary was built without the `kafka` feature, using broadcast");
    Arc::new(BroadcastSink::new(bus))
}

#[derive(Debug, Clone)]
pub struct EmitterConfig {
    pub topic: String,
    /// Max events waiting for the worker; further events are dropped
    pub queue_capacity: usize,
    /// Delivery attempts per event (at least one)
    pub max_retries: u32,
    /// Multiplied by the attempt number between attempts
    pub retry_backoff: Duration,
}

impl From<&EventsConfig> for EmitterConfig {
    fn from(config: &EventsConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            queue_capacity: config.queue_capacity,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Fire-and-forget outcome publisher backed by one worker task
#[derive(Clone)]
pub struct EventEmitter {
    sender: Sender<OutcomeEvent>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>, config: EmitterConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity.max(1));

        info!(
            "Initializing EventEmitter: topic={}, queue={}, retries={}",
            config.topic, config.queue_capacity, config.max_retries
        );

        tokio::spawn(async move {
            Self::worker_loop(sink, receiver, config).await;
        });

        Self { sender }
    }

    /// Enqueue without waiting. Returns false when the event was dropped.
    pub fn emit(&self, event: OutcomeEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to enqueue outcome event (queue full?): {}", e);
                false
            }
        }
    }

    async fn worker_loop(
        sink: Arc<dyn EventSink>,
        receiver: Receiver<OutcomeEvent>,
        config: EmitterConfig,
    ) {
        info!("Event emitter worker started");

        while let Ok(event) = receiver.recv_async().await {
            Self::deliver(sink.as_ref(), &config, &event).await;
        }

        info!("Event emitter worker shutting down (channel closed)");
    }

    /// Publish one event with bounded retries. Returns whether it was delivered.
    pub(crate) async fn deliver(
        sink: &dyn EventSink,
        config: &EmitterConfig,
        event: &OutcomeEvent,
    ) -> bool {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize outcome event: {}", e);
                return false;
            }
        };
        let key = event.key();
        let attempts = config.max_retries.max(1);

        for attempt in 1..=attempts {
            match sink.publish(&config.topic, &key, &payload).await {
                Ok(()) => {
                    debug!("Published outcome event for {} (attempt {})", key, attempt);
                    return true;
                }
                Err(e) => {
                    warn!(
                        "Publish attempt {}/{} failed for {}: {}",
                        attempt, attempts, key, e
                    );
                    if attempt < attempts {
                        sleep(config.retry_backoff * attempt).await;
                    }
                }
            }
        }

        error!("Dropping outcome event for {} after {} attempts", key, attempts);
        false
    }
}
