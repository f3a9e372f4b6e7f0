//! Trip ledger service.
//!
//! Loads a trip's records from the store, runs the pure balance and exchange
//! computations over that snapshot, and owns every write. Settlement and
//! membership transitions live in `settlement.rs` and `membership.rs`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::{compute_balances, Balance};
use crate::error::LedgerError;
use crate::exchange::{get_simplified_exchanges, recommendations_for, Exchange, SimplifiedExchanges};
use crate::lifecycle::{MemberState, PaymentMethod, RsvpStatus};
use crate::money::{is_within_epsilon, split_evenly, to_f64, validate_amount, validate_share_amount};
use crate::schemas::{new_id, Activity, Expense, ExpenseKind, Member, Settlement, Share, Trip, UserId};
use crate::store::TripStore;
use crate::validation::{validate_required_text, MAX_NAME_LEN, MAX_USER_ID_LEN};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemberBalance {
    pub user_id: UserId,
    pub name: String,
    pub net_balance: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizedSettlement {
    #[serde(flatten)]
    pub plan: SimplifiedExchanges,
    pub original_balances: Vec<MemberBalance>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewTrip {
    pub name: String,
    pub display_name: Option<String>,
    pub down_payment: Option<f64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewExpense {
    pub description: String,
    pub amount: f64,
    /// Defaults to the acting user.
    pub payer_id: Option<UserId>,
    /// Explicit shares. Takes precedence over `participants`.
    pub shares: Option<Vec<Share>>,
    /// Equal split among these users, or among every attending member when absent.
    pub participants: Option<Vec<UserId>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewActivity {
    pub name: String,
    pub cost_per_person: Option<f64>,
    #[serde(default)]
    pub participants: Vec<UserId>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ActivityReassignment {
    pub user_id: UserId,
}

pub struct TripLedger {
    pub(crate) store: Arc<dyn TripStore>,
}

impl TripLedger {
    pub fn new(store: Arc<dyn TripStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn require_trip(&self, trip_id: &str) -> LedgerResult<Trip> {
        self.store
            .trip(trip_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Couldn't find trip {trip_id}")))
    }

    pub(crate) async fn require_member(&self, trip_id: &str, user_id: &str) -> LedgerResult<Member> {
        self.store.member(trip_id, user_id).await?.ok_or_else(|| {
            LedgerError::not_found(format!("{user_id} is not a member of trip {trip_id}"))
        })
    }

    pub(crate) async fn is_manager(&self, trip_id: &str, user_id: &str) -> LedgerResult<bool> {
        Ok(self
            .store
            .member(trip_id, user_id)
            .await?
            .is_some_and(|m| m.can_manage()))
    }

    /// The acting user must be an organizer or admin of the trip.
    pub(crate) async fn require_manager(&self, trip_id: &str, actor: &str) -> LedgerResult<Member> {
        let member = self.store.member(trip_id, actor).await?;
        match member {
            Some(member) if member.can_manage() => Ok(member),
            _ => Err(LedgerError::forbidden(format!(
                "{actor} is not an organizer of trip {trip_id}"
            ))),
        }
    }

    pub async fn create_trip(&self, trip_id: &str, organizer: &str, request: NewTrip) -> LedgerResult<Trip> {
        validate_required_text(trip_id, "trip id", MAX_USER_ID_LEN)?;
        validate_required_text(&request.name, "trip name", MAX_NAME_LEN)?;
        let down_payment = request
            .down_payment
            .map(|amount| validate_amount(amount, "down payment").map(to_f64))
            .transpose()?;
        if self.store.trip(trip_id).await?.is_some() {
            return Err(LedgerError::conflict(format!("Trip {trip_id} already exists")));
        }

        let now = Utc::now();
        let trip = Trip {
            id: trip_id.to_string(),
            name: request.name,
            organizer_id: organizer.to_string(),
            down_payment,
            created_at: now,
        };
        self.store.insert_trip(&trip).await?;

        let state = MemberState::ORGANIZER;
        self.store
            .insert_member(&Member {
                trip_id: trip.id.clone(),
                user_id: organizer.to_string(),
                display_name: request.display_name.unwrap_or_else(|| organizer.to_string()),
                rsvp_status: state.rsvp,
                payment_status: state.payment,
                payment_method: PaymentMethod::None,
                is_organizer: true,
                is_admin: false,
                joined_at: now,
            })
            .await?;
        tracing::info!(trip_id, organizer, "trip created");
        Ok(trip)
    }

    /// Net balance of every user in the trip.
    pub async fn compute_balances(&self, trip_id: &str) -> LedgerResult<Balance> {
        self.require_trip(trip_id).await?;
        let members = self.store.members(trip_id).await?;
        let expenses = self.store.expenses(trip_id).await?;
        let settlements = self.store.settlements(trip_id).await?;
        compute_balances(&members, &expenses, &settlements)
    }

    pub async fn balances(&self, trip_id: &str) -> LedgerResult<Vec<MemberBalance>> {
        let balance = self.compute_balances(trip_id).await?;
        let members = self.store.members(trip_id).await?;
        Ok(named_balances(&balance, &members))
    }

    pub async fn optimized_settlement(&self, trip_id: &str) -> LedgerResult<OptimizedSettlement> {
        let balance = self.compute_balances(trip_id).await?;
        let members = self.store.members(trip_id).await?;
        let plan = get_simplified_exchanges(&balance);
        tracing::debug!(
            trip_id,
            transactions = plan.stats.total_transactions,
            is_valid = plan.is_valid,
            "computed settlement plan"
        );
        Ok(OptimizedSettlement {
            plan,
            original_balances: named_balances(&balance, &members),
        })
    }

    pub async fn user_recommendations(&self, trip_id: &str, user_id: &str) -> LedgerResult<Vec<Exchange>> {
        let balance = self.compute_balances(trip_id).await?;
        let plan = get_simplified_exchanges(&balance);
        Ok(recommendations_for(&plan.transactions, user_id).cloned().collect())
    }

    pub async fn members(&self, trip_id: &str) -> LedgerResult<Vec<Member>> {
        self.require_trip(trip_id).await?;
        let mut members = self.store.members(trip_id).await?;
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    pub async fn expenses(&self, trip_id: &str) -> LedgerResult<Vec<Expense>> {
        self.require_trip(trip_id).await?;
        let mut expenses = self.store.expenses(trip_id).await?;
        expenses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(expenses)
    }

    pub async fn activities(&self, trip_id: &str) -> LedgerResult<Vec<Activity>> {
        self.require_trip(trip_id).await?;
        Ok(self.store.activities(trip_id).await?)
    }

    pub async fn settlements(&self, trip_id: &str) -> LedgerResult<Vec<Settlement>> {
        self.require_trip(trip_id).await?;
        let mut settlements = self.store.settlements(trip_id).await?;
        settlements.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(settlements)
    }

    pub async fn add_expense(&self, trip_id: &str, actor: &str, request: NewExpense) -> LedgerResult<Expense> {
        self.require_trip(trip_id).await?;
        self.require_member(trip_id, actor).await?;
        validate_required_text(&request.description, "description", MAX_NAME_LEN)?;
        let total = validate_amount(request.amount, "amount")?;

        let members = self.store.members(trip_id).await?;
        let payer = request.payer_id.unwrap_or_else(|| actor.to_string());
        ensure_members(&members, std::iter::once(&payer))?;

        let shares = match request.shares {
            Some(shares) => validate_shares(&members, shares, total)?,
            None => {
                let participants = request
                    .participants
                    .unwrap_or_else(|| attending(&members).map(|m| m.user_id.clone()).collect());
                equal_shares(&members, participants, total)?
            }
        };

        let expense = Expense {
            id: new_id(),
            trip_id: trip_id.to_string(),
            description: request.description,
            amount: to_f64(total),
            payer,
            shares,
            kind: ExpenseKind::Manual,
            created_by: actor.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_expense(&expense).await?;
        tracing::info!(trip_id, expense_id = %expense.id, amount = expense.amount, "expense added");
        Ok(expense)
    }

    /// Manual expenses can only be deleted by their creator, prepaid ones only by an organizer.
    pub async fn delete_expense(&self, expense_id: &str, actor: &str) -> LedgerResult<()> {
        let expense = self
            .store
            .expense(expense_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Couldn't find expense {expense_id}")))?;

        if expense.is_prepaid() {
            self.require_manager(&expense.trip_id, actor).await?;
        } else if expense.created_by != actor {
            return Err(LedgerError::forbidden(
                "Only the creator can delete a manual expense",
            ));
        }

        if !self.store.delete_expense(expense_id).await? {
            return Err(LedgerError::not_found(format!("Couldn't find expense {expense_id}")));
        }
        tracing::info!(expense_id, actor, "expense deleted");
        Ok(())
    }

    pub async fn create_activity(&self, trip_id: &str, actor: &str, request: NewActivity) -> LedgerResult<Activity> {
        self.require_trip(trip_id).await?;
        let creator = self.require_member(trip_id, actor).await?;
        if creator.rsvp_status == RsvpStatus::Declined {
            return Err(LedgerError::forbidden(
                "Declined members cannot create activities",
            ));
        }
        validate_required_text(&request.name, "activity name", MAX_NAME_LEN)?;
        let cost = request
            .cost_per_person
            .map(|amount| validate_amount(amount, "cost per person"))
            .transpose()?;

        let members = self.store.members(trip_id).await?;
        let participants = if request.participants.is_empty() {
            attending(&members).map(|m| m.user_id.clone()).collect()
        } else {
            unique(request.participants)?
        };
        ensure_members(&members, participants.iter())?;

        let activity = Activity {
            id: new_id(),
            trip_id: trip_id.to_string(),
            name: request.name,
            created_by: actor.to_string(),
            cost_per_person: cost.map(to_f64),
            participants,
            created_at: Utc::now(),
        };
        self.store.insert_activity(&activity).await?;

        if let Some(cost) = cost {
            let shares: Vec<Share> = activity
                .participants
                .iter()
                .map(|user_id| Share {
                    user_id: user_id.clone(),
                    amount: to_f64(cost),
                })
                .collect();
            let expense = Expense {
                id: new_id(),
                trip_id: trip_id.to_string(),
                description: activity.name.clone(),
                amount: to_f64(cost * Decimal::from(shares.len())),
                payer: actor.to_string(),
                shares,
                kind: ExpenseKind::ActivityPrepaid {
                    activity_id: activity.id.clone(),
                },
                created_by: actor.to_string(),
                created_at: activity.created_at,
            };
            self.store.insert_expense(&expense).await?;
        }

        tracing::info!(trip_id, activity_id = %activity.id, prepaid = activity.is_prepaid(), "activity created");
        Ok(activity)
    }

    pub async fn delete_activity(&self, activity_id: &str, actor: &str) -> LedgerResult<()> {
        let activity = self
            .store
            .activity(activity_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Couldn't find activity {activity_id}")))?;
        // the linked prepaid expense falls under the organizer-only deletion rule
        if activity.is_prepaid() || activity.created_by != actor {
            self.require_manager(&activity.trip_id, actor).await?;
        }
        self.drop_activity(&activity).await
    }

    /// Hands an activity over to another attending member. Organizers only.
    pub async fn reassign_activity(
        &self,
        activity_id: &str,
        actor: &str,
        request: ActivityReassignment,
    ) -> LedgerResult<Activity> {
        let activity = self
            .store
            .activity(activity_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Couldn't find activity {activity_id}")))?;
        self.require_manager(&activity.trip_id, actor).await?;
        let owner = self.require_member(&activity.trip_id, &request.user_id).await?;
        if owner.rsvp_status == RsvpStatus::Declined {
            return Err(LedgerError::validation(format!(
                "{} declined the trip and cannot own activities",
                owner.user_id
            )));
        }

        if !self
            .store
            .reassign_activity(activity_id, &owner.user_id)
            .await?
        {
            return Err(LedgerError::not_found(format!("Couldn't find activity {activity_id}")));
        }
        tracing::info!(
            activity_id,
            from = %activity.created_by,
            to = %owner.user_id,
            reassigned_by = actor,
            "activity reassigned"
        );
        Ok(Activity {
            created_by: owner.user_id,
            ..activity
        })
    }

    /// Deletes an activity together with the expense it charges.
    pub(crate) async fn drop_activity(&self, activity: &Activity) -> LedgerResult<()> {
        let expenses = self.store.delete_activity_expenses(&activity.id).await?;
        self.store.delete_activity(&activity.id).await?;
        tracing::info!(activity_id = %activity.id, expenses, "activity deleted");
        Ok(())
    }
}

pub(crate) fn named_balances(balance: &Balance, members: &[Member]) -> Vec<MemberBalance> {
    balance
        .iter()
        .map(|(user_id, &net_balance)| MemberBalance {
            user_id: user_id.clone(),
            name: members
                .iter()
                .find(|m| &m.user_id == user_id)
                .map(|m| m.display_name.clone())
                .unwrap_or_else(|| "Former member".to_string()),
            net_balance,
        })
        .collect()
}

fn attending(members: &[Member]) -> impl Iterator<Item = &Member> {
    members.iter().filter(|m| m.rsvp_status != RsvpStatus::Declined)
}

fn ensure_members<'a>(
    members: &[Member],
    users: impl IntoIterator<Item = &'a UserId>,
) -> LedgerResult<()> {
    for user_id in users {
        if !members.iter().any(|m| &m.user_id == user_id) {
            return Err(LedgerError::validation(format!(
                "{user_id} is not a member of this trip"
            )));
        }
    }
    Ok(())
}

fn unique(users: Vec<UserId>) -> LedgerResult<Vec<UserId>> {
    let mut seen = BTreeSet::new();
    for user_id in &users {
        if !seen.insert(user_id) {
            return Err(LedgerError::validation(format!(
                "{user_id} is listed more than once"
            )));
        }
    }
    Ok(users)
}

/// Checks explicit shares and makes them add up to `total` to the cent.
///
/// A leftover of at most [`crate::money::EPSILON`] (three people at 3.33 for a 10.00 bill)
/// goes to the first share that can absorb it; anything larger is rejected.
fn validate_shares(members: &[Member], shares: Vec<Share>, total: Decimal) -> LedgerResult<Vec<Share>> {
    if shares.is_empty() {
        return Err(LedgerError::validation("An expense needs at least one share"));
    }
    let users = unique(shares.iter().map(|s| s.user_id.clone()).collect())?;
    ensure_members(members, users.iter())?;

    let mut amounts = Vec::with_capacity(shares.len());
    for share in &shares {
        amounts.push(validate_share_amount(
            share.amount,
            &format!("share of {}", share.user_id),
        )?);
    }
    let sum: Decimal = amounts.iter().copied().sum();
    let leftover = total - sum;
    if !is_within_epsilon(leftover) {
        return Err(LedgerError::validation(format!(
            "Shares add up to {sum} but the expense total is {total}"
        )));
    }
    if !leftover.is_zero() {
        let Some(absorbing) = amounts.iter_mut().find(|a| **a + leftover >= Decimal::ZERO) else {
            return Err(LedgerError::validation(format!(
                "Shares add up to {sum} but the expense total is {total}"
            )));
        };
        *absorbing += leftover;
    }

    Ok(users
        .into_iter()
        .zip(amounts)
        .map(|(user_id, amount)| Share {
            user_id,
            amount: to_f64(amount),
        })
        .collect())
}

fn equal_shares(members: &[Member], participants: Vec<UserId>, total: Decimal) -> LedgerResult<Vec<Share>> {
    if participants.is_empty() {
        return Err(LedgerError::validation("An expense needs at least one participant"));
    }
    let participants = unique(participants)?;
    ensure_members(members, participants.iter())?;
    let parts = split_evenly(total, participants.len());
    Ok(participants
        .into_iter()
        .zip(parts)
        .map(|(user_id, amount)| Share {
            user_id,
            amount: to_f64(amount),
        })
        .collect())
}
