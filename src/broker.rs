//! RPC to the tester worker pool over AMQP.
//!
//! Each dispatch publishes one task onto the shared work queue and returns a
//! finite stream of reply events read from a private auto-delete queue. The
//! stream closes after the terminal `result`/`error` event, or early if the
//! transport drops; consumers must treat an early close as a failed job.

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::types::Lang;

/// Well-known work queue the tester pool consumes from.
pub const TESTER_QUEUE: &str = "tester_rpc_queue";

/// Buffered events per in-flight job before the reader back-pressures.
const EVENT_BUFFER: usize = 16;

/// One unit of work for the tester: two sources and the game to run.
/// For verify jobs `code2` is the game's built-in opponent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestTask {
    pub code1: String,
    pub code2: String,
    pub game_slug: String,
    pub lang: Lang,
}

/// Reply envelope from the tester, decoded in a single pass.
///
/// Unknown `type` values fail the decode; the reader logs and skips them,
/// which is also how state machines "ignore" unexpected kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum TesterEvent {
    Status(StatusBody),
    Result(ResultBody),
    Error(ErrorBody),
}

impl TesterEvent {
    /// Terminal events end the job's reply stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TesterEvent::Result(_) | TesterEvent::Error(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    pub new_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBody {
    pub result: i32,
    #[serde(default)]
    pub info: serde_json::Value,
    #[serde(default)]
    pub states: serde_json::Value,
    #[serde(default)]
    pub error_1: Option<String>,
    #[serde(default)]
    pub error_2: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Dispatch interface used by the submission handler and the scheduler.
#[async_trait]
pub trait TesterRpc: Send + Sync {
    /// Send a task to the tester pool and return its reply stream.
    async fn dispatch(&self, task: &TestTask) -> Result<mpsc::Receiver<TesterEvent>, ApiError>;
}

/// `TesterRpc` over a shared lapin channel.
pub struct AmqpTester {
    channel: Channel,
}

impl AmqpTester {
    pub async fn connect(amqp_url: &str) -> anyhow::Result<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .context("connecting to broker")?;
        let channel = connection
            .create_channel()
            .await
            .context("opening broker channel")?;
        Ok(AmqpTester { channel })
    }
}

#[async_trait]
impl TesterRpc for AmqpTester {
    async fn dispatch(&self, task: &TestTask) -> Result<mpsc::Receiver<TesterEvent>, ApiError> {
        // private reply queue, deleted once its consumer is cancelled
        let reply_queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ApiError::internal(e, "declaring reply queue"))?;

        // one uuid serves as both consumer tag and correlation id
        let correlation_id = Uuid::new_v4().to_string();
        let mut consumer = self
            .channel
            .basic_consume(
                reply_queue.name().as_str(),
                &correlation_id,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ApiError::internal(e, "registering reply consumer"))?;

        let body = serde_json::to_vec(task)
            .map_err(|e| ApiError::internal(e, "encoding test task"))?;

        self.channel
            .basic_publish(
                "",
                TESTER_QUEUE,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_correlation_id(correlation_id.as_str().into())
                    .with_reply_to(reply_queue.name().clone()),
            )
            .await
            .map_err(|e| ApiError::internal(e, "publishing test task"))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let channel = self.channel.clone();
        tokio::spawn(async move {
            read_replies(channel, &mut consumer, correlation_id, tx).await;
        });
        Ok(rx)
    }
}

/// Forward correlated deliveries until a terminal event or transport loss.
async fn read_replies(
    channel: Channel,
    consumer: &mut lapin::Consumer,
    correlation_id: String,
    tx: mpsc::Sender<TesterEvent>,
) {
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(error) => {
                tracing::warn!(%correlation_id, %error, "reply consumer lost");
                break;
            }
        };

        let matches_call = delivery
            .properties
            .correlation_id()
            .as_ref()
            .map(|id| id.as_str() == correlation_id)
            .unwrap_or(false);
        if !matches_call {
            continue;
        }

        let event: TesterEvent = match serde_json::from_slice(&delivery.data) {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(%correlation_id, %error, "undecodable tester event, skipping");
                continue;
            }
        };

        let terminal = event.is_terminal();
        if tx.send(event).await.is_err() {
            // consumer side gave up on the job
            break;
        }
        if terminal {
            if let Err(error) = channel
                .basic_cancel(&correlation_id, BasicCancelOptions::default())
                .await
            {
                tracing::error!(%correlation_id, %error, "cancelling reply consumer");
            }
            break;
        }
    }
    // dropping tx closes the stream
}
