//! Call endpoints.
//!
//! A caller's audio bridge connects one websocket per call to
//! `GET /calls/{call_id}?caller=...`. Transcripts flow in as JSON frames and
//! speech requests flow back out; the bridge confirms playback with
//! `speech_finished` so barge-in can cut a reply short.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use mailvoice_agent::{CallCompletion, Orchestrator, OrchestratorError};
use mailvoice_core::conversation::{CallId, CallerId};
use mailvoice_core::errors::InterfaceError;
use mailvoice_voice::{
    CallerHandle, LocalVoiceChannel, PlaybackAck, SpeechPriority, VoiceCommand, VoiceEvent,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct CallsState {
    orchestrator: Arc<Orchestrator>,
}

impl CallsState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub caller: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct ActiveCallView {
    pub call_id: String,
    pub caller: String,
    pub started_at: String,
}

#[derive(Debug, Serialize)]
pub struct EndCallResponse {
    pub call_id: String,
    pub status: &'static str,
}

/// Frames sent by the caller's audio bridge.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    UtteranceStarted,
    UtterancePartial { text: String },
    UtteranceFinal { text: String },
    CallEnded,
    SpeechFinished { id: u64 },
}

impl ClientFrame {
    fn into_event(self) -> Option<VoiceEvent> {
        match self {
            Self::UtteranceStarted => Some(VoiceEvent::UtteranceStarted),
            Self::UtterancePartial { text } => Some(VoiceEvent::UtterancePartial { text }),
            Self::UtteranceFinal { text } => Some(VoiceEvent::UtteranceFinal { text }),
            Self::CallEnded => Some(VoiceEvent::CallEnded),
            Self::SpeechFinished { .. } => None,
        }
    }
}

/// Frames sent to the caller's audio bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Speak { id: u64, text: String, priority: SpeechPriority },
    CancelSpeech,
    Error { message: String },
}

pub fn router(state: CallsState) -> Router {
    Router::new()
        .route("/calls", get(list_calls))
        .route("/calls/{call_id}", get(connect_call))
        .route("/calls/{call_id}/end", post(end_call))
        .with_state(state)
}

async fn list_calls(State(state): State<CallsState>) -> Json<Vec<ActiveCallView>> {
    let calls = state
        .orchestrator
        .active_calls()
        .into_iter()
        .map(|call| ActiveCallView {
            call_id: call.call_id.0,
            caller: call.caller.0,
            started_at: call.started_at.to_rfc3339(),
        })
        .collect();
    Json(calls)
}

async fn end_call(
    Path(call_id): Path<String>,
    State(state): State<CallsState>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let call_id = CallId(call_id);
    state.orchestrator.end_call(&call_id).map_err(orchestrator_error)?;

    info!(event_name = "api.call.end_requested", call_id = %call_id, "call end requested");
    Ok((StatusCode::ACCEPTED, Json(EndCallResponse { call_id: call_id.0, status: "ending" })))
}

async fn connect_call(
    ws: WebSocketUpgrade,
    Path(call_id): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<CallsState>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let caller = match params.caller.as_deref().map(str::trim) {
        Some(caller) if !caller.is_empty() => CallerId(caller.to_owned()),
        _ => {
            return Err(api_error(InterfaceError::BadRequest {
                message: "missing `caller` query parameter".to_owned(),
                correlation_id: correlation_id(),
            }))
        }
    };

    let (channel, handle) = LocalVoiceChannel::pair();
    let completion = state
        .orchestrator
        .start_call(CallId(call_id), caller, Arc::new(channel))
        .map_err(orchestrator_error)?;

    Ok(ws.on_upgrade(move |socket| bridge_call(socket, handle, completion)))
}

/// Pumps frames between the websocket and the call's voice channel until
/// either side goes away, then waits for the call to wind down.
async fn bridge_call(socket: WebSocket, mut caller: CallerHandle, completion: CallCompletion) {
    let call_id = completion.call_id().clone();
    let (mut sender, mut receiver) = socket.split();
    let mut pending: HashMap<u64, PlaybackAck> = HashMap::new();

    info!(event_name = "api.call.connected", call_id = %call_id, "websocket bridge connected");

    loop {
        tokio::select! {
            command = caller.next_command() => {
                let Some(command) = command else { break };
                let frame = match command {
                    VoiceCommand::Speak { request, ack } => {
                        pending.insert(request.id.0, ack);
                        ServerFrame::Speak {
                            id: request.id.0,
                            text: request.text,
                            priority: request.priority,
                        }
                    }
                    VoiceCommand::CancelSpeech => {
                        for (_, ack) in pending.drain() {
                            ack.cancelled();
                        }
                        ServerFrame::CancelSpeech
                    }
                };
                if let Err(error) = send_frame(&mut sender, &frame).await {
                    let _ = caller.fail(&format!("websocket send failed: {error}"));
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(text.as_str()) {
                            Ok(ClientFrame::SpeechFinished { id }) => {
                                if let Some(ack) = pending.remove(&id) {
                                    ack.played();
                                }
                            }
                            Ok(frame) => {
                                if let Some(event) = frame.into_event() {
                                    if caller.send(event).is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(error) => {
                                warn!(
                                    event_name = "api.call.bad_frame",
                                    call_id = %call_id,
                                    error = %error,
                                    "ignoring malformed client frame"
                                );
                                let reply = ServerFrame::Error { message: format!("malformed frame: {error}") };
                                if send_frame(&mut sender, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        let _ = caller.fail(&format!("websocket receive failed: {error}"));
                        break;
                    }
                }
            }
        }
    }

    // Unacknowledged speech counts as cancelled once the bridge is gone.
    drop(pending);
    drop(caller);

    match completion.wait().await {
        Some(report) => info!(
            event_name = "api.call.disconnected",
            call_id = %call_id,
            end = report.end.as_str(),
            final_state = %report.final_state,
            "websocket bridge closed"
        ),
        None => warn!(
            event_name = "api.call.disconnected",
            call_id = %call_id,
            "websocket bridge closed without a call report"
        ),
    }
    let _ = sender.close().await;
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

fn orchestrator_error(error: OrchestratorError) -> (StatusCode, Json<ApiError>) {
    let correlation_id = correlation_id();
    let interface = match error {
        OrchestratorError::DuplicateCall(call_id) => InterfaceError::Conflict {
            message: format!("call `{call_id}` is already active"),
            correlation_id,
        },
        OrchestratorError::UnknownCall(call_id) => {
            InterfaceError::NotFound { message: format!("call `{call_id}`"), correlation_id }
        }
    };
    api_error(interface)
}

fn api_error(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "api.request.rejected",
        correlation_id = error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "request rejected"
    );
    (
        status,
        Json(ApiError {
            error: error.user_message().to_owned(),
            detail: error.to_string(),
            correlation_id: error.correlation_id().to_owned(),
        }),
    )
}

fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use futures_util::{SinkExt, StreamExt};
    use mailvoice_agent::{
        AccountCredentials, Collaborators, CredentialVault, InMemoryMailbox, MailboxExecutor,
        ManagerSettings, Orchestrator, RuleBasedRecognizer, TracingAuditSink,
    };
    use mailvoice_core::conversation::{CallId, CallerId};
    use mailvoice_core::replies::KeywordReplyClassifier;
    use mailvoice_voice::LocalVoiceChannel;
    use serde_json::{json, Value};
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
    use tower::ServiceExt;

    use super::{router, CallsState, ClientFrame};

    const WAIT: Duration = Duration::from_secs(5);

    fn orchestrator() -> Arc<Orchestrator> {
        let vault = CredentialVault::new()
            .with_fallback(AccountCredentials::new("assistant@localhost", "token"));
        let collaborators = Collaborators {
            recognizer: Arc::new(RuleBasedRecognizer::new()),
            executor: Arc::new(MailboxExecutor::new(
                Arc::new(InMemoryMailbox::with_sample_inbox()),
                Arc::new(vault),
                "assistant@localhost",
            )),
            replies: Arc::new(KeywordReplyClassifier::default()),
            audit: Arc::new(TracingAuditSink),
        };
        Arc::new(Orchestrator::new(collaborators, ManagerSettings::default()))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    async fn serve(orchestrator: Arc<Orchestrator>) -> std::net::SocketAddr {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("listener should bind");
        let address = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(CallsState::new(orchestrator))).await;
        });
        address
    }

    #[test]
    fn client_frames_decode_from_tagged_json() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"utterance_final","text":"read my emails"}"#)
                .expect("final utterance frame");
        assert_eq!(frame, ClientFrame::UtteranceFinal { text: "read my emails".to_owned() });

        let ack: ClientFrame =
            serde_json::from_str(r#"{"type":"speech_finished","id":3}"#).expect("ack frame");
        assert_eq!(ack, ClientFrame::SpeechFinished { id: 3 });

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"dance"}"#).is_err());
    }

    #[tokio::test]
    async fn ending_an_unknown_call_is_not_found() {
        let app = router(CallsState::new(orchestrator()));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/calls/missing/end")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let payload = body_json(response).await;
        assert_eq!(payload["error"], "No active call matches that id.");
        assert!(payload["correlation_id"].as_str().is_some_and(|id| id.starts_with("req-")));
    }

    #[tokio::test]
    async fn active_calls_are_listed_and_can_be_ended() {
        let orchestrator = orchestrator();
        let (channel, _caller) = LocalVoiceChannel::pair();
        let completion = orchestrator
            .start_call(CallId("call-7".to_owned()), CallerId("alice".to_owned()), Arc::new(channel))
            .expect("call should start");
        let app = router(CallsState::new(orchestrator.clone()));

        let listed = app
            .clone()
            .oneshot(Request::builder().uri("/calls").body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");
        assert_eq!(listed.status(), StatusCode::OK);
        let payload = body_json(listed).await;
        assert_eq!(payload[0]["call_id"], "call-7");
        assert_eq!(payload[0]["caller"], "alice");

        let ended = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/calls/call-7/end")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router should respond");
        assert_eq!(ended.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(ended).await, json!({ "call_id": "call-7", "status": "ending" }));

        timeout(WAIT, completion.wait()).await.expect("call should end").expect("report");
        assert_eq!(orchestrator.active_call_count(), 0);
    }

    #[tokio::test]
    async fn websocket_call_reads_the_inbox_and_hangs_up() {
        let orchestrator = orchestrator();
        let address = serve(orchestrator.clone()).await;

        let (mut socket, _) =
            tokio_tungstenite::connect_async(format!("ws://{address}/calls/call-ws?caller=alice"))
                .await
                .expect("websocket should connect");

        let mut spoken = Vec::new();
        let mut asked = false;
        while !spoken.iter().any(|text: &String| text.starts_with("You have")) {
            let message = timeout(WAIT, socket.next())
                .await
                .expect("server should speak in time")
                .expect("socket should stay open")
                .expect("frame should arrive");
            let frame: Value =
                serde_json::from_str(message.to_text().expect("text frame")).expect("json frame");
            if frame["type"] != "speak" {
                continue;
            }
            spoken.push(frame["text"].as_str().unwrap_or_default().to_owned());
            socket
                .send(WsMessage::text(json!({ "type": "speech_finished", "id": frame["id"] }).to_string()))
                .await
                .expect("ack should send");

            if !asked {
                asked = true;
                for frame in [
                    json!({ "type": "utterance_started" }),
                    json!({ "type": "utterance_final", "text": "read my emails" }),
                ] {
                    socket.send(WsMessage::text(frame.to_string())).await.expect("frame should send");
                }
            }
        }
        assert!(spoken[0].starts_with("Hello! I'm your email assistant."));
        assert!(spoken.last().is_some_and(|text| text.starts_with("You have 3 recent emails")));

        socket
            .send(WsMessage::text(json!({ "type": "call_ended" }).to_string()))
            .await
            .expect("hangup should send");

        timeout(WAIT, async {
            while orchestrator.active_call_count() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("call should be released");
    }

    #[tokio::test]
    async fn second_connection_for_an_active_call_is_rejected() {
        let orchestrator = orchestrator();
        let (channel, _caller) = LocalVoiceChannel::pair();
        let _completion = orchestrator
            .start_call(CallId("call-dup".to_owned()), CallerId("alice".to_owned()), Arc::new(channel))
            .expect("call should start");
        let address = serve(orchestrator).await;

        let error =
            tokio_tungstenite::connect_async(format!("ws://{address}/calls/call-dup?caller=bob"))
                .await
                .err()
                .expect("duplicate call should be refused");

        match error {
            tungstenite::Error::Http(response) => {
                assert_eq!(response.status().as_u16(), StatusCode::CONFLICT.as_u16())
            }
            other => panic!("expected an http rejection, got {other:?}"),
        }
    }
}
