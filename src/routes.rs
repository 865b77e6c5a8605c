use crate::handlers;
use crate::realtime::socket;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_http::validate_request::ValidateRequestHeaderLayer;

/// 전체 라우터 (관리자 경로는 bearer 토큰 필요)
pub fn router(state: AppState) -> Router {
    // 프론트엔드를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route(
            "/auctions",
            get(handlers::handle_get_auctions).post(handlers::handle_create_auction),
        )
        .route(
            "/auctions/:id",
            axum::routing::delete(handlers::handle_delete_auction),
        )
        .route("/auctions/:id/verify", put(handlers::handle_verify_auction))
        .route("/auctions/:id/start", post(handlers::handle_start_auction))
        .route("/auctions/:id/close", post(handlers::handle_close_auction))
        .route(
            "/auctions/:id/transactions",
            get(handlers::handle_get_transactions),
        )
        .route_layer(ValidateRequestHeaderLayer::bearer(&state.config.admin_token));

    let api = Router::new()
        .route("/auctions", get(handlers::handle_get_auctions))
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route("/auctions/:id/bids", get(handlers::handle_get_bid_history))
        .route(
            "/auctions/:id/highest-bid",
            get(handlers::handle_get_highest_bid),
        )
        .route("/auctions/:id/deposit", post(handlers::handle_deposit))
        .route("/auctions/:id/join", post(handlers::handle_join))
        .route("/auctions/:id/bid", post(handlers::handle_bid))
        .route("/auctions/:id/buy-now", post(handlers::handle_buy_now))
        .nest("/admin", admin);

    Router::new()
        .route("/ws", get(socket::handle_socket_upgrade))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
