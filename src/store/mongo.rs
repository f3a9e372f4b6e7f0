use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use serde::Serialize;

use super::{StoreResult, TripStore};
use crate::error::StoreError;
use crate::lifecycle::{MemberState, PaymentMethod, SettlementStatus};
use crate::schemas::{Activity, Expense, Member, Resolution, Settlement, Trip};

const TRIPS: &str = "Trips";
const MEMBERS: &str = "TripMembers";
const EXPENSES: &str = "Expenses";
const SETTLEMENTS: &str = "Settlements";
const ACTIVITIES: &str = "Activities";

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let store = Self {
            database: client.database(database),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.trips()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.members()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "trip_id": 1, "user_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        for name in [EXPENSES, SETTLEMENTS, ACTIVITIES] {
            let collection = self.database.collection::<Document>(name);
            collection
                .create_index(
                    IndexModel::builder()
                        .keys(doc! { "id": 1 })
                        .options(unique())
                        .build(),
                    None,
                )
                .await?;
            collection
                .create_index(IndexModel::builder().keys(doc! { "trip_id": 1 }).build(), None)
                .await?;
        }
        Ok(())
    }

    fn trips(&self) -> Collection<Trip> {
        self.database.collection(TRIPS)
    }

    fn members(&self) -> Collection<Member> {
        self.database.collection(MEMBERS)
    }

    fn expenses(&self) -> Collection<Expense> {
        self.database.collection(EXPENSES)
    }

    fn settlements(&self) -> Collection<Settlement> {
        self.database.collection(SETTLEMENTS)
    }

    fn activities(&self) -> Collection<Activity> {
        self.database.collection(ACTIVITIES)
    }
}

async fn find_all<T>(collection: Collection<T>, filter: Document) -> StoreResult<Vec<T>>
where
    T: serde::de::DeserializeOwned + Unpin + Send + Sync,
{
    Ok(collection.find(filter, None).await?.try_collect().await?)
}

/// Inserts a document, reporting a unique index violation as [`StoreError::Duplicate`].
async fn insert_unique<T>(collection: Collection<T>, document: &T, label: String) -> StoreResult<()>
where
    T: Serialize + Send + Sync,
{
    match collection.insert_one(document, None).await {
        Ok(_) => Ok(()),
        Err(err) if is_duplicate_key(&err) => Err(StoreError::Duplicate(label)),
        Err(err) => Err(err.into()),
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl TripStore for MongoStore {
    async fn trip(&self, trip_id: &str) -> StoreResult<Option<Trip>> {
        Ok(self.trips().find_one(doc! { "id": trip_id }, None).await?)
    }

    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        insert_unique(self.trips(), trip, format!("Trip {}", trip.id)).await
    }

    async fn members(&self, trip_id: &str) -> StoreResult<Vec<Member>> {
        find_all(self.members(), doc! { "trip_id": trip_id }).await
    }

    async fn member(&self, trip_id: &str, user_id: &str) -> StoreResult<Option<Member>> {
        Ok(self
            .members()
            .find_one(doc! { "trip_id": trip_id, "user_id": user_id }, None)
            .await?)
    }

    async fn insert_member(&self, member: &Member) -> StoreResult<()> {
        insert_unique(self.members(), member, format!("Member {}", member.user_id)).await
    }

    async fn transition_member(
        &self,
        trip_id: &str,
        user_id: &str,
        expected: MemberState,
        next: MemberState,
        payment_method: Option<PaymentMethod>,
    ) -> StoreResult<bool> {
        let mut set = doc! {
            "rsvp_status": next.rsvp.as_str(),
            "payment_status": next.payment.as_str(),
        };
        if let Some(method) = payment_method {
            set.insert("payment_method", method.as_str());
        }
        let result = self
            .members()
            .update_one(
                doc! {
                    "trip_id": trip_id,
                    "user_id": user_id,
                    "rsvp_status": expected.rsvp.as_str(),
                    "payment_status": expected.payment.as_str(),
                },
                doc! { "$set": set },
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn delete_member(&self, trip_id: &str, user_id: &str) -> StoreResult<bool> {
        let result = self
            .members()
            .delete_one(doc! { "trip_id": trip_id, "user_id": user_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn expenses(&self, trip_id: &str) -> StoreResult<Vec<Expense>> {
        find_all(self.expenses(), doc! { "trip_id": trip_id }).await
    }

    async fn expense(&self, expense_id: &str) -> StoreResult<Option<Expense>> {
        Ok(self.expenses().find_one(doc! { "id": expense_id }, None).await?)
    }

    async fn insert_expense(&self, expense: &Expense) -> StoreResult<()> {
        self.expenses().insert_one(expense, None).await?;
        Ok(())
    }

    async fn delete_expense(&self, expense_id: &str) -> StoreResult<bool> {
        let result = self
            .expenses()
            .delete_one(doc! { "id": expense_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn delete_activity_expenses(&self, activity_id: &str) -> StoreResult<u64> {
        let result = self
            .expenses()
            .delete_many(doc! { "kind.activity_id": activity_id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn settlements(&self, trip_id: &str) -> StoreResult<Vec<Settlement>> {
        find_all(self.settlements(), doc! { "trip_id": trip_id }).await
    }

    async fn settlement(&self, settlement_id: &str) -> StoreResult<Option<Settlement>> {
        Ok(self
            .settlements()
            .find_one(doc! { "id": settlement_id }, None)
            .await?)
    }

    async fn insert_settlement(&self, settlement: &Settlement) -> StoreResult<()> {
        self.settlements().insert_one(settlement, None).await?;
        Ok(())
    }

    async fn resolve_settlement(
        &self,
        settlement_id: &str,
        resolution: &Resolution,
    ) -> StoreResult<Option<Settlement>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .settlements()
            .find_one_and_update(
                doc! {
                    "id": settlement_id,
                    "status": SettlementStatus::Pending.as_str(),
                },
                doc! { "$set": {
                    "status": resolution.status.as_str(),
                    "resolved_at": bson::to_bson(&resolution.resolved_at)?,
                    "resolved_by": resolution.resolved_by.as_str(),
                }},
                options,
            )
            .await?)
    }

    async fn activities(&self, trip_id: &str) -> StoreResult<Vec<Activity>> {
        find_all(self.activities(), doc! { "trip_id": trip_id }).await
    }

    async fn activity(&self, activity_id: &str) -> StoreResult<Option<Activity>> {
        Ok(self
            .activities()
            .find_one(doc! { "id": activity_id }, None)
            .await?)
    }

    async fn insert_activity(&self, activity: &Activity) -> StoreResult<()> {
        self.activities().insert_one(activity, None).await?;
        Ok(())
    }

    async fn delete_activity(&self, activity_id: &str) -> StoreResult<bool> {
        let result = self
            .activities()
            .delete_one(doc! { "id": activity_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn reassign_activity(&self, activity_id: &str, created_by: &str) -> StoreResult<bool> {
        let result = self
            .activities()
            .update_one(
                doc! { "id": activity_id },
                doc! { "$set": { "created_by": created_by } },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }
}
