/// WebSocket 연결 처리
/// 연결마다 쓰기 태스크 하나, 구독한 경매마다 전달 태스크 하나
// region:    --- Imports
use super::protocol::{ClientMessage, ServerMessage};
use crate::bidding::commands::{self, JoinAuctionCommand};
use crate::error::AppError;
use crate::live::AuctionRoom;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

const OUTBOUND_CAPACITY: usize = 64;

type Subscriptions = HashMap<i64, JoinHandle<()>>;

/// GET /ws
pub async fn handle_socket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("{:<12} --> 연결 수립", "Socket");
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = match serde_json::to_string(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("{:<12} --> 메시지 직렬화 오류: {:?}", "Socket", e);
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions = Subscriptions::new();
    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => {
                handle_frame(&state, &text, &tx, &mut subscriptions).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("{:<12} --> 수신 오류: {:?}", "Socket", e);
                break;
            }
        }
    }

    for (_, forwarder) in subscriptions.drain() {
        forwarder.abort();
    }
    writer.abort();
    info!("{:<12} --> 연결 종료", "Socket");
}

/// 클라이언트 프레임 처리, 실패는 요청자에게만 auction:error 로 응답
async fn handle_frame(
    state: &AppState,
    text: &str,
    tx: &mpsc::Sender<ServerMessage>,
    subscriptions: &mut Subscriptions,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("{:<12} --> 잘못된 메시지: {}", "Socket", e);
            let _ = tx
                .send(ServerMessage::error(
                    None,
                    "INVALID_MESSAGE",
                    format!("잘못된 메시지 형식입니다: {e}"),
                ))
                .await;
            return;
        }
    };

    let auction_id = message.auction_id();
    let result = match message {
        ClientMessage::Join(cmd) => join(state, cmd, tx, subscriptions).await,
        ClientMessage::Bid(cmd) => commands::handle_place_bid(&state.coordinator, cmd)
            .await
            .map(|_| ()),
        ClientMessage::BuyNow(cmd) => commands::handle_buy_now(&state.coordinator, cmd)
            .await
            .map(|_| ()),
        ClientMessage::Leave { auction_id } => {
            if let Some(forwarder) = subscriptions.remove(&auction_id) {
                forwarder.abort();
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        debug!("{:<12} --> 요청 거절 id: {}: {}", "Socket", auction_id, e);
        let _ = tx
            .send(ServerMessage::error(Some(auction_id), e.code(), e.to_string()))
            .await;
    }
}

/// 참가: 방 구독 -> 현재 상태 전송 -> 참가 결과 전송
async fn join(
    state: &AppState,
    cmd: JoinAuctionCommand,
    tx: &mpsc::Sender<ServerMessage>,
    subscriptions: &mut Subscriptions,
) -> Result<(), AppError> {
    let room = state.room(cmd.auction_id).await?;

    if !subscriptions.contains_key(&cmd.auction_id) {
        // 스냅샷보다 먼저 구독해야 사이의 변경을 놓치지 않는다
        let receiver = room.subscribe();
        let _ = tx.send(ServerMessage::Info(room.snapshot().await)).await;
        subscriptions.insert(
            cmd.auction_id,
            spawn_forwarder(Arc::clone(&room), receiver, tx.clone()),
        );
    }

    let outcome = commands::handle_join(&state.coordinator, cmd.clone()).await?;
    let _ = tx
        .send(outcome.to_message(cmd.auction_id, cmd.user_id))
        .await;
    Ok(())
}

/// 방송 메시지를 연결로 전달, 밀린 경우 최신 스냅샷으로 대체
fn spawn_forwarder(
    room: Arc<AuctionRoom>,
    mut receiver: broadcast::Receiver<ServerMessage>,
    tx: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = match receiver.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "{:<12} --> 구독자 지연, {}건 건너뛰고 스냅샷 전송 id: {}",
                        "Socket",
                        skipped,
                        room.auction_id()
                    );
                    ServerMessage::Info(room.snapshot().await)
                }
                Err(RecvError::Closed) => break,
            };
            if tx.send(message).await.is_err() {
                break;
            }
        }
    })
}
