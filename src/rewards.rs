use serde::Serialize;

use crate::{appresult::ErrorCode, AppError, AppResult};

pub const POST_COST: i64 = 5;
pub const HELPFUL_REWARD: i64 = 10;
pub const UPVOTE_REWARD: i64 = 5;
pub const WELCOME_BONUS: i64 = 10;

pub const CURRENCY: &str = "INR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    pub id: &'static str,
    pub credits: i64,
    pub price: i64,
}

pub const PACKAGES: &[CreditPackage] = &[
    CreditPackage { id: "starter", credits: 50, price: 4900 },
    CreditPackage { id: "popular", credits: 120, price: 9900 },
    CreditPackage { id: "pro", credits: 300, price: 19900 },
];

pub fn package(id: &str) -> AppResult<CreditPackage> {
    PACKAGES
        .iter()
        .find(|p| p.id == id)
        .copied()
        .ok_or_else(|| AppError::invalid(ErrorCode::InvalidPackage, format!("unknown credit package {id:?}")))
}

pub fn upvote_reward(voter_id: &str, author_id: &str) -> i64 {
    if voter_id == author_id { 0 } else { UPVOTE_REWARD }
}
