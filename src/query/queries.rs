#[cfg(test)]
const AUCTION_COLUMNS: &str = "id, product_id, seller_id, winner_id, starting_price, target_price, step, deposit, duration_secs, status, winning_price, start_time, end_time, created_at";

/// 모든 경매 조회
pub const GET_ALL_AUCTIONS: &str = "SELECT id, product_id, seller_id, winner_id, starting_price, target_price, step, deposit, duration_secs, status, winning_price, start_time, end_time, created_at FROM auctions ORDER BY created_at DESC";

/// 경매 조회
pub const GET_AUCTION: &str = "SELECT id, product_id, seller_id, winner_id, starting_price, target_price, step, deposit, duration_secs, status, winning_price, start_time, end_time, created_at FROM auctions WHERE id = $1";

/// 시작 시간이 지난 검증 완료 경매 조회
pub const GET_DUE_AUCTIONS: &str = "SELECT id, product_id, seller_id, winner_id, starting_price, target_price, step, deposit, duration_secs, status, winning_price, start_time, end_time, created_at FROM auctions WHERE status = 'verified' AND start_time IS NOT NULL AND start_time <= $1";

/// 진행 중 경매 조회
pub const GET_LIVE_AUCTIONS: &str = "SELECT id, product_id, seller_id, winner_id, starting_price, target_price, step, deposit, duration_secs, status, winning_price, start_time, end_time, created_at FROM auctions WHERE status = 'live'";

/// 최고 입찰 조회
pub const GET_HIGHEST_BID: &str =
    "SELECT MAX(bid_amount) as highest_bid FROM bids WHERE auction_id = $1";

/// 입찰 이력 조회
pub const GET_BID_HISTORY: &str = r#"
    SELECT id, auction_id, bidder_id, bid_amount, bid_time
    FROM bids
    WHERE auction_id = $1
    ORDER BY bid_time DESC, id DESC
"#;

/// 경매 거래 원장 조회
pub const GET_AUCTION_TRANSACTIONS: &str = r#"
    SELECT id, auction_id, user_id, amount, kind, status, created_at
    FROM transactions
    WHERE auction_id = $1
    ORDER BY created_at, id
"#;

/// 경매 등록
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (product_id, seller_id, starting_price, target_price, step, deposit, status)
    VALUES ($1, $2, $3, $4, $5, $6, 'draft')
    RETURNING id, product_id, seller_id, winner_id, starting_price, target_price, step, deposit, duration_secs, status, winning_price, start_time, end_time, created_at
"#;

/// 경매 검증 (draft -> verified)
pub const VERIFY_AUCTION: &str = r#"
    UPDATE auctions SET status = 'verified', duration_secs = $1, start_time = $2
    WHERE id = $3 AND status = 'draft'
    RETURNING id, product_id, seller_id, winner_id, starting_price, target_price, step, deposit, duration_secs, status, winning_price, start_time, end_time, created_at
"#;

/// 경매 삭제 (진행 전이고 거래 원장 기록이 없을 때만)
pub const DELETE_AUCTION: &str = r#"
    DELETE FROM auctions
    WHERE id = $1 AND status IN ('draft', 'verified')
      AND NOT EXISTS (SELECT 1 FROM transactions WHERE auction_id = $1)
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auction_queries_select_every_model_column() {
        for query in [
            GET_ALL_AUCTIONS,
            GET_AUCTION,
            GET_DUE_AUCTIONS,
            GET_LIVE_AUCTIONS,
            INSERT_AUCTION,
            VERIFY_AUCTION,
        ] {
            assert!(query.contains(AUCTION_COLUMNS), "{query}");
        }
    }

    /// 보증금이 걸린 경매는 삭제되지 않는다
    #[test]
    fn delete_keeps_auctions_with_ledger_rows() {
        assert!(DELETE_AUCTION.contains("status IN ('draft', 'verified')"));
        assert!(DELETE_AUCTION.contains("NOT EXISTS (SELECT 1 FROM transactions WHERE auction_id = $1)"));
    }
}
