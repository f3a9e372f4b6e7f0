//! Persistence port used by the ledger.
//!
//! Reads return snapshots; the only writes that race are the two
//! compare-and-set operations, which must apply atomically in the backend.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::lifecycle::{MemberState, PaymentMethod};
use crate::schemas::{Activity, Expense, Member, Resolution, Settlement, Trip};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TripStore: Send + Sync {
    async fn trip(&self, trip_id: &str) -> StoreResult<Option<Trip>>;
    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()>;

    async fn members(&self, trip_id: &str) -> StoreResult<Vec<Member>>;
    async fn member(&self, trip_id: &str, user_id: &str) -> StoreResult<Option<Member>>;
    async fn insert_member(&self, member: &Member) -> StoreResult<()>;
    /// Moves a member to `next` only while it is still in `expected`.
    async fn transition_member(
        &self,
        trip_id: &str,
        user_id: &str,
        expected: MemberState,
        next: MemberState,
        payment_method: Option<PaymentMethod>,
    ) -> StoreResult<bool>;
    async fn delete_member(&self, trip_id: &str, user_id: &str) -> StoreResult<bool>;

    async fn expenses(&self, trip_id: &str) -> StoreResult<Vec<Expense>>;
    async fn expense(&self, expense_id: &str) -> StoreResult<Option<Expense>>;
    async fn insert_expense(&self, expense: &Expense) -> StoreResult<()>;
    async fn delete_expense(&self, expense_id: &str) -> StoreResult<bool>;
    async fn delete_activity_expenses(&self, activity_id: &str) -> StoreResult<u64>;

    async fn settlements(&self, trip_id: &str) -> StoreResult<Vec<Settlement>>;
    async fn settlement(&self, settlement_id: &str) -> StoreResult<Option<Settlement>>;
    async fn insert_settlement(&self, settlement: &Settlement) -> StoreResult<()>;
    /// Writes the resolution only while the settlement is still pending.
    /// Returns the updated settlement, or `None` if it was not pending.
    async fn resolve_settlement(
        &self,
        settlement_id: &str,
        resolution: &Resolution,
    ) -> StoreResult<Option<Settlement>>;

    async fn activities(&self, trip_id: &str) -> StoreResult<Vec<Activity>>;
    async fn activity(&self, activity_id: &str) -> StoreResult<Option<Activity>>;
    async fn insert_activity(&self, activity: &Activity) -> StoreResult<()>;
    async fn delete_activity(&self, activity_id: &str) -> StoreResult<bool>;
    async fn reassign_activity(&self, activity_id: &str, created_by: &str) -> StoreResult<bool>;
}
