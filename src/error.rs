use crate::auction::session::SessionError;
use crate::deposit::DepositError;
use crate::event_store::EventStoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("경매를 찾을 수 없습니다: {0}")]
    AuctionNotFound(i64),

    #[error("보증금 납부가 필요합니다.")]
    PaymentRequired { deposit: i64, checkout_url: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Deposit(#[from] DepositError),

    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// 클라이언트에 전달되는 오류 코드
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::AuctionNotFound(_) => "NOT_FOUND",
            AppError::PaymentRequired { .. } => "NEED_DEPOSIT",
            AppError::Session(e) => e.code(),
            AppError::Store(e) => e.code(),
            AppError::Deposit(DepositError::AlreadyPaid) => "ALREADY_PAID",
            AppError::Deposit(_) => "INTERNAL",
            AppError::Database(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Session(_) => StatusCode::BAD_REQUEST,
            AppError::AuctionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Store(EventStoreError::VersionConflict { .. })
            | AppError::Deposit(DepositError::AlreadyPaid) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Deposit(_) | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        match &self {
            AppError::PaymentRequired {
                deposit,
                checkout_url,
            } => {
                body["deposit"] = json!(deposit);
                body["checkout_url"] = json!(checkout_url);
            }
            AppError::Session(SessionError::LowBid { minimum }) => {
                body["minimum_bid"] = json!(minimum);
            }
            AppError::Session(SessionError::BidTooHigh { maximum }) => {
                body["maximum_bid"] = json!(maximum);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_and_code() {
        let low = AppError::from(SessionError::LowBid { minimum: 11_000 });
        assert_eq!(low.status(), StatusCode::BAD_REQUEST);
        assert_eq!(low.code(), "LOW_BID");

        let high = AppError::from(SessionError::BidTooHigh { maximum: i64::MAX - 1_000 });
        assert_eq!(high.status(), StatusCode::BAD_REQUEST);
        assert_eq!(high.code(), "BID_TOO_HIGH");

        let pay = AppError::PaymentRequired {
            deposit: 100,
            checkout_url: "http://pay".into(),
        };
        assert_eq!(pay.status(), StatusCode::PAYMENT_REQUIRED);

        let conflict = AppError::from(EventStoreError::VersionConflict {
            aggregate_id: 1,
            version: 2,
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "VERSION_CONFLICT");

        assert_eq!(AppError::AuctionNotFound(3).status(), StatusCode::NOT_FOUND);
    }
}
