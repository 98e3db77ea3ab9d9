//! WebSocket Handler - 多图流式处理
//!
//! 每个连接一个 ConnectionSession；单个任务循环同时等待
//! 客户端帧、Worker 结果和会话定时点（宽限期、二进制帧超时）

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::application::{ConnectionSession, OutboundMessage, TaskOutcome};
use crate::infrastructure::http::state::AppState;

/// 流式处理 WebSocket 连接
pub async fn process_images_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(state.max_frame_size)
        .max_frame_size(state.max_frame_size)
        .on_upgrade(move |socket| handle_stream_socket(socket, state))
}

async fn handle_stream_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, receiver) = socket.split();

    let (session, outcomes) = match ConnectionSession::open(
        state.session_manager.clone(),
        state.task_queue.clone(),
        state.limits,
    ) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open streaming session");
            let _ = sender.close().await;
            return;
        }
    };

    drive_session(session, outcomes, sender, receiver).await;
}

/// 连接主循环，返回时会话已关闭
async fn drive_session<S, R>(
    mut session: ConnectionSession,
    mut outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
    mut sender: S,
    mut receiver: R,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let session_id = session.session_id().to_string();
    tracing::info!(session_id = %session_id, "WebSocket connected");

    loop {
        let deadline = session.next_deadline();

        let replies = tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => session.handle_text(&text),
                Some(Ok(Message::Binary(data))) => session.handle_binary(data),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(session_id = %session_id, "WebSocket closed by client");
                    break;
                }
                // Ping/Pong 由 axum 处理
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                    break;
                }
            },
            Some(outcome) = outcomes.recv() => session.on_outcome(outcome),
            _ = sleep_until(deadline) => session.on_timer(Instant::now()),
        };

        if let Err(e) = send_all(&mut sender, replies).await {
            tracing::debug!(session_id = %session_id, error = %e, "Failed to send WebSocket message");
            break;
        }

        if session.is_closed() {
            let _ = sender.send(Message::Close(None)).await;
            break;
        }
    }

    // 断开即取消：排队任务移除，进行中任务的结果丢弃
    session.close();
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

async fn send_all<S>(sender: &mut S, messages: Vec<OutboundMessage>) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    for message in messages {
        sender.send(Message::Text(message.to_json())).await?;
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
