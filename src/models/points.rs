//! Points ledger, append-only and authoritative for the balance
use std::time::SystemTime;

use serde_json;

use schema::points_transactions;
use types::{PointsTransactionId, PromotionId, UserId};

/// Points granted to the referrer of a newly registered user
pub const REFERRAL_REWARD: i32 = 50;

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum PointsKind {
        Spend => "spend",
        Earn => "earn",
        Adjust => "adjust",
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct PointsTransaction {
    pub id: PointsTransactionId,
    pub user_id: UserId,
    pub kind: PointsKind,
    pub delta: i32,
    pub balance_after: i32,
    pub reason: String,
    pub ref_promotion_id: Option<PromotionId>,
    pub meta: serde_json::Value,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug, PartialEq)]
#[table_name = "points_transactions"]
pub struct NewPointsTransaction {
    pub user_id: UserId,
    pub kind: PointsKind,
    pub delta: i32,
    pub balance_after: i32,
    pub reason: String,
    pub ref_promotion_id: Option<PromotionId>,
    pub meta: serde_json::Value,
}

/// Wallet mutation request
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PointsChange {
    pub user_id: UserId,
    pub delta: i32,
    pub kind: PointsKind,
    pub reason: String,
    pub meta: serde_json::Value,
    pub ref_promotion_id: Option<PromotionId>,
    pub allow_negative: bool,
}

impl PointsChange {
    pub fn earn(user_id: UserId, amount: i32, reason: &str) -> Self {
        Self {
            user_id,
            delta: amount,
            kind: PointsKind::Earn,
            reason: reason.to_string(),
            meta: json!({}),
            ref_promotion_id: None,
            allow_negative: false,
        }
    }

    pub fn spend(user_id: UserId, amount: i32, reason: &str) -> Self {
        Self {
            user_id,
            delta: -amount,
            kind: PointsKind::Spend,
            reason: reason.to_string(),
            meta: json!({}),
            ref_promotion_id: None,
            allow_negative: false,
        }
    }
}

/// Moderator balance correction
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdjustPoints {
    pub user_id: UserId,
    pub delta: i32,
    pub reason: String,
    pub allow_negative: bool,
}

/// Result of comparing the balance with the ledger
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct WalletAudit {
    pub user_id: UserId,
    pub points: i32,
    pub ledger_sum: i64,
    pub last_balance_after: Option<i32>,
    pub consistent: bool,
}

impl WalletAudit {
    pub fn new(user_id: UserId, points: i32, ledger_sum: i64, last_balance_after: Option<i32>) -> Self {
        let matches_last = last_balance_after.map(|last| last == points).unwrap_or(points == 0);
        Self {
            user_id,
            points,
            ledger_sum,
            last_balance_after,
            consistent: ledger_sum == i64::from(points) && matches_last,
        }
    }
}
