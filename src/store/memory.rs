use async_trait::async_trait;
use parking_lot::RwLock;

use super::{StoreResult, TripStore};
use crate::error::StoreError;
use crate::lifecycle::{MemberState, PaymentMethod, SettlementStatus};
use crate::schemas::{Activity, Expense, ExpenseKind, Member, Resolution, Settlement, Trip};

#[derive(Default)]
struct Tables {
    trips: Vec<Trip>,
    members: Vec<Member>,
    expenses: Vec<Expense>,
    settlements: Vec<Settlement>,
    activities: Vec<Activity>,
}

/// In-process store. Every compare-and-set runs under the write lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn trip(&self, trip_id: &str) -> StoreResult<Option<Trip>> {
        Ok(self
            .tables
            .read()
            .trips
            .iter()
            .find(|t| t.id == trip_id)
            .cloned())
    }

    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.trips.iter().any(|t| t.id == trip.id) {
            return Err(StoreError::Duplicate(format!("Trip {}", trip.id)));
        }
        tables.trips.push(trip.clone());
        Ok(())
    }

    async fn members(&self, trip_id: &str) -> StoreResult<Vec<Member>> {
        Ok(self
            .tables
            .read()
            .members
            .iter()
            .filter(|m| m.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn member(&self, trip_id: &str, user_id: &str) -> StoreResult<Option<Member>> {
        Ok(self
            .tables
            .read()
            .members
            .iter()
            .find(|m| m.trip_id == trip_id && m.user_id == user_id)
            .cloned())
    }

    async fn insert_member(&self, member: &Member) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables
            .members
            .iter()
            .any(|m| m.trip_id == member.trip_id && m.user_id == member.user_id)
        {
            return Err(StoreError::Duplicate(format!("Member {}", member.user_id)));
        }
        tables.members.push(member.clone());
        Ok(())
    }

    async fn transition_member(
        &self,
        trip_id: &str,
        user_id: &str,
        expected: MemberState,
        next: MemberState,
        payment_method: Option<PaymentMethod>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let Some(member) = tables
            .members
            .iter_mut()
            .find(|m| m.trip_id == trip_id && m.user_id == user_id)
        else {
            return Ok(false);
        };
        if member.state() != expected {
            return Ok(false);
        }
        member.rsvp_status = next.rsvp;
        member.payment_status = next.payment;
        if let Some(method) = payment_method {
            member.payment_method = method;
        }
        Ok(true)
    }

    async fn delete_member(&self, trip_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.members.len();
        tables
            .members
            .retain(|m| !(m.trip_id == trip_id && m.user_id == user_id));
        Ok(tables.members.len() != before)
    }

    async fn expenses(&self, trip_id: &str) -> StoreResult<Vec<Expense>> {
        Ok(self
            .tables
            .read()
            .expenses
            .iter()
            .filter(|e| e.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn expense(&self, expense_id: &str) -> StoreResult<Option<Expense>> {
        Ok(self
            .tables
            .read()
            .expenses
            .iter()
            .find(|e| e.id == expense_id)
            .cloned())
    }

    async fn insert_expense(&self, expense: &Expense) -> StoreResult<()> {
        self.tables.write().expenses.push(expense.clone());
        Ok(())
    }

    async fn delete_expense(&self, expense_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.expenses.len();
        tables.expenses.retain(|e| e.id != expense_id);
        Ok(tables.expenses.len() != before)
    }

    async fn delete_activity_expenses(&self, activity_id: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.expenses.len();
        tables.expenses.retain(|e| {
            !matches!(&e.kind, ExpenseKind::ActivityPrepaid { activity_id: linked } if linked == activity_id)
        });
        Ok((before - tables.expenses.len()) as u64)
    }

    async fn settlements(&self, trip_id: &str) -> StoreResult<Vec<Settlement>> {
        Ok(self
            .tables
            .read()
            .settlements
            .iter()
            .filter(|s| s.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn settlement(&self, settlement_id: &str) -> StoreResult<Option<Settlement>> {
        Ok(self
            .tables
            .read()
            .settlements
            .iter()
            .find(|s| s.id == settlement_id)
            .cloned())
    }

    async fn insert_settlement(&self, settlement: &Settlement) -> StoreResult<()> {
        self.tables.write().settlements.push(settlement.clone());
        Ok(())
    }

    async fn resolve_settlement(
        &self,
        settlement_id: &str,
        resolution: &Resolution,
    ) -> StoreResult<Option<Settlement>> {
        let mut tables = self.tables.write();
        let Some(settlement) = tables
            .settlements
            .iter_mut()
            .find(|s| s.id == settlement_id && s.status == SettlementStatus::Pending)
        else {
            return Ok(None);
        };
        settlement.status = resolution.status;
        settlement.resolved_at = Some(resolution.resolved_at);
        settlement.resolved_by = Some(resolution.resolved_by.clone());
        Ok(Some(settlement.clone()))
    }

    async fn activities(&self, trip_id: &str) -> StoreResult<Vec<Activity>> {
        Ok(self
            .tables
            .read()
            .activities
            .iter()
            .filter(|a| a.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn activity(&self, activity_id: &str) -> StoreResult<Option<Activity>> {
        Ok(self
            .tables
            .read()
            .activities
            .iter()
            .find(|a| a.id == activity_id)
            .cloned())
    }

    async fn insert_activity(&self, activity: &Activity) -> StoreResult<()> {
        self.tables.write().activities.push(activity.clone());
        Ok(())
    }

    async fn delete_activity(&self, activity_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.activities.len();
        tables.activities.retain(|a| a.id != activity_id);
        Ok(tables.activities.len() != before)
    }

    async fn reassign_activity(&self, activity_id: &str, created_by: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        match tables.activities.iter_mut().find(|a| a.id == activity_id) {
            Some(activity) => {
                activity.created_by = created_by.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{PaymentStatus, RsvpStatus};
    use chrono::Utc;

    fn member(user_id: &str) -> Member {
        Member {
            trip_id: "trip".to_string(),
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            rsvp_status: RsvpStatus::Pending,
            payment_status: PaymentStatus::None,
            payment_method: PaymentMethod::None,
            is_organizer: false,
            is_admin: false,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_insert_of_a_member_is_rejected() {
        let store = MemoryStore::new();
        store.insert_member(&member("bob")).await.unwrap();

        let err = store.insert_member(&member("bob")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.members("trip").await.unwrap().len(), 1);
        store.insert_member(&member("carol")).await.unwrap();
    }

    #[tokio::test]
    async fn second_insert_of_a_trip_is_rejected() {
        let store = MemoryStore::new();
        let trip = Trip {
            id: "trip".to_string(),
            name: "Trip".to_string(),
            organizer_id: "alice".to_string(),
            down_payment: None,
            created_at: Utc::now(),
        };
        store.insert_trip(&trip).await.unwrap();
        assert!(matches!(
            store.insert_trip(&trip).await,
            Err(StoreError::Duplicate(_))
        ));
    }
}
