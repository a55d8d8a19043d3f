// crates/core/src/classifier/http.rs
//! Classifier backed by a TensorFlow Serving style REST model server.
//!
//! - `GET  {model_url}`          model status, used as the health check
//! - `POST {model_url}:predict`  `{"instances":[{"b64": ...}]}` -> `{"predictions":[[p0, p1, ...]]}`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use super::provider::Classifier;
use crate::error::ClassifyError;
use crate::item::PreparedItem;
use crate::taxonomy::{argmax, ClassLabel, Taxonomy};

pub struct HttpModelClassifier {
    client: reqwest::Client,
    model_url: String,
    taxonomy: Arc<Taxonomy>,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<EncodedInstance>,
}

#[derive(Serialize)]
struct EncodedInstance {
    b64: String,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ModelStatusResponse {
    #[serde(default)]
    model_version_status: Vec<ModelVersionStatus>,
}

#[derive(Deserialize)]
struct ModelVersionStatus {
    state: String,
}

impl HttpModelClassifier {
    pub fn new(
        model_url: impl Into<String>,
        taxonomy: Arc<Taxonomy>,
        timeout: Duration,
    ) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            model_url: model_url.into().trim_end_matches('/').to_string(),
            taxonomy,
        })
    }

    fn predict_url(&self) -> String {
        format!("{}:predict", self.model_url)
    }
}

#[async_trait]
impl Classifier for HttpModelClassifier {
    async fn classify(&self, item: &PreparedItem) -> Result<ClassLabel, ClassifyError> {
        let bytes = item.read_bytes().await?;
        let body = PredictRequest {
            instances: vec![EncodedInstance {
                b64: STANDARD.encode(&bytes),
            }],
        };

        let response = self.client.post(self.predict_url()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;
        let probabilities = parsed
            .predictions
            .first()
            .ok_or_else(|| ClassifyError::MalformedResponse("empty predictions".into()))?;
        let index = argmax(probabilities)
            .ok_or_else(|| ClassifyError::MalformedResponse("empty probability vector".into()))?;

        self.taxonomy
            .class_by_index(index)
            .cloned()
            .ok_or(ClassifyError::UnknownClass(index))
    }

    async fn health_check(&self) -> Result<(), ClassifyError> {
        let response = self
            .client
            .get(&self.model_url)
            .send()
            .await
            .map_err(|e| ClassifyError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClassifyError::Unavailable(format!(
                "model server returned {}",
                response.status()
            )));
        }

        let status: ModelStatusResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Unavailable(format!("unreadable model status: {e}")))?;
        let available = status.model_version_status.is_empty()
            || status
                .model_version_status
                .iter()
                .any(|v| v.state.eq_ignore_ascii_case("AVAILABLE"));
        if !available {
            return Err(ClassifyError::Unavailable(
                "no model version is AVAILABLE".into(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tf-serving"
    }
}
