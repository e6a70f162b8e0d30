use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Asks the UI side to focus the calibration control and confirm it holds
/// exactly `expected_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusRequest {
    pub request_id: String,
    pub expected_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusResponse {
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FocusResponse {
    pub fn confirmed(request: &FocusRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            ok: true,
            reason: None,
        }
    }

    pub fn rejected(request: &FocusRequest, reason: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Calibration's end of the focus-verification exchange.
pub struct FocusChannel {
    requests: mpsc::Sender<FocusRequest>,
    responses: mpsc::Receiver<FocusResponse>,
}

/// The UI's end: receives requests and answers them by id.
pub struct FocusResponder {
    pub requests: mpsc::Receiver<FocusRequest>,
    pub responses: mpsc::Sender<FocusResponse>,
}

impl FocusResponder {
    pub async fn next_request(&mut self) -> Option<FocusRequest> {
        self.requests.recv().await
    }

    pub async fn respond(&self, response: FocusResponse) -> Result<()> {
        self.responses
            .send(response)
            .await
            .map_err(|_| anyhow!("Calibration is no longer waiting for focus responses"))
    }
}

pub fn focus_channel(buffer: usize) -> (FocusChannel, FocusResponder) {
    let (request_tx, request_rx) = mpsc::channel(buffer);
    let (response_tx, response_rx) = mpsc::channel(buffer);
    (
        FocusChannel {
            requests: request_tx,
            responses: response_rx,
        },
        FocusResponder {
            requests: request_rx,
            responses: response_tx,
        },
    )
}

impl FocusChannel {
    /// Sends a request under a fresh id and waits for the answer carrying the
    /// same id. Stale answers to earlier requests are skipped. There is no
    /// timeout here; the responder decides how long a check may take.
    pub async fn verify(&mut self, expected_text: &str) -> Result<FocusResponse> {
        let request = FocusRequest {
            request_id: Uuid::new_v4().to_string(),
            expected_text: expected_text.to_string(),
        };
        let request_id = request.request_id.clone();

        self.requests
            .send(request)
            .await
            .map_err(|_| anyhow!("Focus verification channel closed"))?;

        loop {
            let response = self
                .responses
                .recv()
                .await
                .ok_or_else(|| anyhow!("Focus verification channel closed"))?;
            if response.request_id == request_id {
                return Ok(response);
            }
            debug!(
                request_id = response.request_id.as_str(),
                "Ignoring focus response for a different request"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_matches_response_by_request_id() {
        let (mut channel, mut responder) = focus_channel(4);

        let ui = tokio::spawn(async move {
            let request = responder.next_request().await.unwrap();
            responder
                .respond(FocusResponse {
                    request_id: "stale".into(),
                    ok: false,
                    reason: Some("old".into()),
                })
                .await
                .unwrap();
            responder
                .respond(FocusResponse::confirmed(&request))
                .await
                .unwrap();
            request
        });

        let response = channel.verify("Hello world").await.unwrap();
        let request = ui.await.unwrap();

        assert!(response.ok);
        assert_eq!(response.request_id, request.request_id);
        assert_eq!(request.expected_text, "Hello world");
    }

    #[tokio::test]
    async fn verify_fails_when_responder_is_gone() {
        let (mut channel, responder) = focus_channel(1);
        drop(responder);
        assert!(channel.verify("text").await.is_err());
    }

    #[test]
    fn responses_serialize_with_camel_case_keys() {
        let request = FocusRequest {
            request_id: "abc".into(),
            expected_text: "Hello".into(),
        };
        let json = serde_json::to_value(FocusResponse::rejected(
            &request,
            "Calibration text mismatch.",
        ))
        .unwrap();
        assert_eq!(json["requestId"], "abc");
        assert_eq!(json["ok"], false);
        assert_eq!(json["reason"], "Calibration text mismatch.");
    }
}
