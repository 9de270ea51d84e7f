//! NATS request/reply front end for the scoring service

use crate::config::NatsConfig;
use crate::error::PipelineStage;
use crate::service::{ScoreOutcome, ScoringService};
use crate::types::score::ScoreResponse;
use crate::types::Transaction;
use anyhow::Result;
use async_nats::{Client, Message, Subscriber};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Reply to a scoring request, tagged by `status`.
///
/// Tags match [`ScoreOutcome::status`] for every outcome variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreReply {
    Ok(ScoreResponse),
    Unavailable {
        transaction_id: String,
        message: String,
    },
    InternalError {
        transaction_id: String,
    },
    InvalidRequest {
        #[serde(default)]
        field: Option<String>,
        message: String,
    },
}

impl From<ScoreOutcome> for ScoreReply {
    fn from(outcome: ScoreOutcome) -> Self {
        match outcome {
            ScoreOutcome::Scored(response) => ScoreReply::Ok(response),
            ScoreOutcome::Unavailable {
                transaction_id,
                message,
            } => ScoreReply::Unavailable {
                transaction_id,
                message,
            },
            ScoreOutcome::InternalFailure { transaction_id } => {
                ScoreReply::InternalError { transaction_id }
            }
        }
    }
}

/// Reply to a model reload request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReloadReply {
    Ok { model: crate::models::ModelStatus },
    Unavailable { message: String },
    InternalError { message: String },
}

/// Parse and validate a scoring request payload
pub fn decode_transaction(payload: &[u8]) -> Result<Transaction, ScoreReply> {
    let tx: Transaction =
        serde_json::from_slice(payload).map_err(|e| ScoreReply::InvalidRequest {
            field: None,
            message: e.to_string(),
        })?;

    tx.validate().map_err(|e| ScoreReply::InvalidRequest {
        field: Some(e.field.to_string()),
        message: e.to_string(),
    })?;

    Ok(tx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Score,
    Health,
    Metrics,
    ModelInfo,
    Reload,
}

/// Serves every request subject with a bounded worker pool
pub struct RequestServer {
    client: Client,
    subjects: NatsConfig,
    service: Arc<ScoringService>,
    workers: Arc<Semaphore>,
}

impl RequestServer {
    /// Server answering every subject in `subjects`, `workers` requests at a time
    pub fn new(client: Client, subjects: NatsConfig, service: Arc<ScoringService>, workers: usize) -> Self {
        Self {
            client,
            subjects,
            service,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    async fn subscribe(&self, subject: &str, endpoint: Endpoint) -> Result<BoxStream<'static, (Endpoint, Message)>> {
        let subscriber: Subscriber = self.client.subscribe(subject.to_string()).await?;
        info!(subject = %subject, "Subscribed to request subject");
        Ok(subscriber.map(move |message| (endpoint, message)).boxed())
    }

    /// Process requests until every subscription closes
    pub async fn run(self) -> Result<()> {
        let streams = vec![
            self.subscribe(&self.subjects.score_subject, Endpoint::Score).await?,
            self.subscribe(&self.subjects.health_subject, Endpoint::Health).await?,
            self.subscribe(&self.subjects.metrics_subject, Endpoint::Metrics).await?,
            self.subscribe(&self.subjects.model_info_subject, Endpoint::ModelInfo).await?,
            self.subscribe(&self.subjects.reload_subject, Endpoint::Reload).await?,
        ];
        let mut requests = stream::select_all(streams);

        while let Some((endpoint, message)) = requests.next().await {
            // Acquire permit (limits concurrent requests)
            let permit = self.workers.clone().acquire_owned().await?;

            let client = self.client.clone();
            let service = self.service.clone();

            tokio::spawn(async move {
                let Some(reply_to) = message.reply.clone() else {
                    debug!(subject = %message.subject, "Request without reply subject, dropping");
                    return;
                };

                match handle(&service, endpoint, &message.payload).await {
                    Ok(payload) => {
                        if let Err(e) = client.publish(reply_to, payload.into()).await {
                            error!(subject = %message.subject, error = %e, "Failed to publish reply");
                        }
                    }
                    Err(e) => {
                        error!(subject = %message.subject, error = %e, "Failed to handle request");
                    }
                }

                drop(permit);
            });
        }

        info!("Request subscriptions closed");
        Ok(())
    }
}

async fn handle(service: &Arc<ScoringService>, endpoint: Endpoint, payload: &[u8]) -> Result<Vec<u8>> {
    let body = match endpoint {
        Endpoint::Score => {
            let reply = match decode_transaction(payload) {
                Ok(tx) => {
                    let transaction_id = tx.transaction_id.clone();
                    let outcome = service.score(tx).await;
                    debug!(
                        transaction_id = %transaction_id,
                        stage = %PipelineStage::Responded,
                        status = outcome.status(),
                        "Replying to scoring request"
                    );
                    ScoreReply::from(outcome)
                }
                Err(reply) => {
                    warn!(reply = ?reply, "Rejected scoring request");
                    reply
                }
            };
            serde_json::to_vec(&reply)?
        }
        Endpoint::Health => serde_json::to_vec(&service.health().await)?,
        Endpoint::Metrics => serde_json::to_vec(&service.metrics())?,
        Endpoint::ModelInfo => serde_json::to_vec(&service.model_info())?,
        Endpoint::Reload => {
            let reply = match service.reload_model().await {
                Ok(model) => ReloadReply::Ok { model },
                Err(e) if e.is_model_unavailable() => ReloadReply::Unavailable {
                    message: e.to_string(),
                },
                Err(e) => ReloadReply::InternalError {
                    message: e.to_string(),
                },
            };
            serde_json::to_vec(&reply)?
        }
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::models::{ModelGateway, ScoreFuser};
    use crate::types::score::{Decision, RuleFinding, ScoreResult};
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn test_decode_valid_transaction() {
        let payload = br#"{"transaction_id":"tx-1","user_id":"u-1","amount":42.5,"hour":3,"velocity":2}"#;
        let tx = decode_transaction(payload).unwrap();

        assert_eq!(tx.transaction_id, "tx-1");
        assert_eq!(tx.hour, 3);
        assert_eq!(tx.velocity_1h, 2);
        assert!(!tx.is_new_device);
    }

    #[test]
    fn test_decode_malformed_json() {
        let reply = decode_transaction(b"not json").unwrap_err();
        let json = serde_json::to_value(&reply).unwrap();

        assert_eq!(json["status"], "invalid_request");
        assert_eq!(json["field"], Value::Null);
    }

    #[test]
    fn test_decode_out_of_range_field() {
        let payload = br#"{"transaction_id":"tx-2","user_id":"u-2","amount":10.0,"hour":24}"#;
        let reply = decode_transaction(payload).unwrap_err();

        match reply {
            ScoreReply::InvalidRequest { field, .. } => assert_eq!(field.as_deref(), Some("hour")),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_reply_tag_matches_outcome_status() {
        let scored = ScoreResult {
            transaction_id: "tx-2".into(),
            model_score: 0.1,
            rule_score: 0.4,
            fused_score: 0.19,
            decision: Decision::Approve,
            findings: vec![RuleFinding::new("odd_hours_activity", 0.4)],
            rules_evaluated: 4,
            latency: Duration::from_millis(3),
        }
        .to_response();

        let outcomes = vec![
            ScoreOutcome::Scored(scored),
            ScoreOutcome::Unavailable {
                transaction_id: "tx-3".into(),
                message: "Model not found".into(),
            },
            ScoreOutcome::InternalFailure {
                transaction_id: "tx-4".into(),
            },
        ];

        for outcome in outcomes {
            let status = outcome.status();
            let json = serde_json::to_value(ScoreReply::from(outcome)).unwrap();
            assert_eq!(json["status"], status);
        }
    }

    #[tokio::test]
    async fn test_handle_score_without_model() {
        let gateway = Arc::new(ModelGateway::new("/nonexistent/model.json", 1));
        let service = Arc::new(ScoringService::new(
            gateway,
            ScoreFuser::default(),
            Arc::new(MetricsCollector::new()),
        ));

        let payload = br#"{"transaction_id":"tx-5","user_id":"u-5","amount":10.0}"#;
        let body = handle(&service, Endpoint::Score, payload).await.unwrap();
        let reply: ScoreReply = serde_json::from_slice(&body).unwrap();
        assert!(matches!(reply, ScoreReply::Unavailable { .. }));

        // rejected requests never reach the pipeline
        handle(&service, Endpoint::Score, b"{}").await.unwrap();
        assert_eq!(service.metrics().error_count, 1);

        let body = handle(&service, Endpoint::Reload, b"").await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "unavailable");
    }
}
