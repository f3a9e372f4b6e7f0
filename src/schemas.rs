use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{MemberState, PaymentMethod, PaymentStatus, RsvpStatus, SettlementStatus};

pub type UserId = String;

/// Free activities of a rejected member are handed over to this placeholder.
pub const REMOVED_USER: &str = "removed-user";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Trip {
    pub id: String,
    pub name: String,
    pub organizer_id: UserId,
    /// Members must pay this before they are confirmed, when set.
    pub down_payment: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub trip_id: String,
    pub user_id: UserId,
    pub display_name: String,
    pub rsvp_status: RsvpStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub is_organizer: bool,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn state(&self) -> MemberState {
        MemberState::new(self.rsvp_status, self.payment_status)
    }

    pub fn can_manage(&self) -> bool {
        self.is_organizer || self.is_admin
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Share {
    pub user_id: UserId,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpenseKind {
    Manual,
    ActivityPrepaid { activity_id: String },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: String,
    pub trip_id: String,
    pub description: String,
    pub amount: f64,
    pub payer: UserId,
    pub shares: Vec<Share>,
    pub kind: ExpenseKind,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn is_prepaid(&self) -> bool {
        matches!(self.kind, ExpenseKind::ActivityPrepaid { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Settlement {
    pub id: String,
    pub trip_id: String,
    pub payer_id: UserId,
    pub payee_id: UserId,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub status: SettlementStatus,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
}

/// Terminal outcome written onto a pending settlement.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub status: SettlementStatus,
    pub resolved_by: UserId,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Activity {
    pub id: String,
    pub trip_id: String,
    pub name: String,
    pub created_by: UserId,
    /// Charged to every participant through a linked expense, when set.
    pub cost_per_person: Option<f64>,
    pub participants: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn is_prepaid(&self) -> bool {
        self.cost_per_person.is_some()
    }
}

pub fn new_id() -> String {
    bson::oid::ObjectId::new().to_hex()
}
