//! Invitations, RSVP, down payments and member removal.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::exchange::{get_simplified_exchanges, recommendations_for};
use crate::ledger::{LedgerResult, TripLedger};
use crate::lifecycle::{InvalidTransition, MemberState, PaymentMethod};
use crate::money::{to_decimal, EPSILON};
use crate::schemas::{Activity, ExpenseKind, Member, UserId, REMOVED_USER};
use crate::validation::{validate_required_text, MAX_NAME_LEN, MAX_USER_ID_LEN};

#[derive(Clone, Debug, Deserialize)]
pub struct Invitation {
    pub user_id: UserId,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RsvpResponse {
    pub accept: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentSubmission {
    pub payment_method: PaymentMethod,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OwedActivity {
    pub activity_id: String,
    pub name: String,
    pub amount_owed: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RemovalEligibility {
    pub can_remove: bool,
    pub reason: Option<String>,
    pub balance: Decimal,
    pub prepaid_activities_owed: Vec<OwedActivity>,
    pub suggestions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RejectionOutcome {
    pub deleted_activities: Vec<String>,
    pub reassigned_activities: Vec<String>,
}

impl TripLedger {
    pub async fn invite_member(&self, trip_id: &str, actor: &str, invitation: Invitation) -> LedgerResult<Member> {
        validate_required_text(&invitation.user_id, "user id", MAX_USER_ID_LEN)?;
        if let Some(name) = &invitation.display_name {
            validate_required_text(name, "display name", MAX_NAME_LEN)?;
        }
        self.require_trip(trip_id).await?;
        self.require_manager(trip_id, actor).await?;
        if self.store.member(trip_id, &invitation.user_id).await?.is_some() {
            return Err(LedgerError::conflict(format!(
                "{} is already a member of this trip",
                invitation.user_id
            )));
        }

        let state = MemberState::INVITED;
        let member = Member {
            trip_id: trip_id.to_string(),
            display_name: invitation
                .display_name
                .unwrap_or_else(|| invitation.user_id.clone()),
            user_id: invitation.user_id,
            rsvp_status: state.rsvp,
            payment_status: state.payment,
            payment_method: PaymentMethod::None,
            is_organizer: false,
            is_admin: false,
            joined_at: Utc::now(),
        };
        self.store.insert_member(&member).await?;
        tracing::info!(trip_id, user_id = %member.user_id, invited_by = actor, "member invited");
        Ok(member)
    }

    pub async fn respond_rsvp(&self, trip_id: &str, user_id: &str, response: RsvpResponse) -> LedgerResult<Member> {
        let trip = self.require_trip(trip_id).await?;
        let member = self.require_member(trip_id, user_id).await?;
        let next = if response.accept {
            member.state().accept(trip.down_payment.is_some())
        } else {
            member.state().decline()
        };
        self.apply_transition(member, next, None).await
    }

    pub async fn submit_payment(
        &self,
        trip_id: &str,
        user_id: &str,
        submission: PaymentSubmission,
    ) -> LedgerResult<Member> {
        if submission.payment_method == PaymentMethod::None {
            return Err(LedgerError::validation("A payment method is required"));
        }
        self.require_trip(trip_id).await?;
        let member = self.require_member(trip_id, user_id).await?;
        let next = member.state().submit_payment();
        self.apply_transition(member, next, Some(submission.payment_method))
            .await
    }

    /// Confirms a submitted down payment, which confirms the member's RSVP.
    pub async fn confirm_member_payment(&self, trip_id: &str, actor: &str, user_id: &str) -> LedgerResult<Member> {
        self.require_trip(trip_id).await?;
        self.require_manager(trip_id, actor).await?;
        let member = self.require_member(trip_id, user_id).await?;
        let next = member.state().confirm_payment();
        self.apply_transition(member, next, None).await
    }

    /// Rejects a submitted down payment and declines the member.
    ///
    /// Prepaid activities they created are deleted with their charges; free
    /// ones are handed over to [`REMOVED_USER`].
    pub async fn reject_member_payment(
        &self,
        trip_id: &str,
        actor: &str,
        user_id: &str,
    ) -> LedgerResult<RejectionOutcome> {
        self.require_trip(trip_id).await?;
        self.require_manager(trip_id, actor).await?;
        let member = self.require_member(trip_id, user_id).await?;
        let next = member.state().reject_payment();
        self.apply_transition(member, next, None).await?;

        let mut outcome = RejectionOutcome::default();
        for activity in self.store.activities(trip_id).await? {
            if activity.created_by != user_id {
                continue;
            }
            if activity.is_prepaid() {
                self.drop_activity(&activity).await?;
                outcome.deleted_activities.push(activity.id);
            } else {
                self.store
                    .reassign_activity(&activity.id, REMOVED_USER)
                    .await?;
                outcome.reassigned_activities.push(activity.id);
            }
        }
        tracing::info!(
            trip_id,
            user_id,
            deleted = outcome.deleted_activities.len(),
            reassigned = outcome.reassigned_activities.len(),
            "cleaned up activities of rejected member"
        );
        Ok(outcome)
    }

    /// Lets a declined member go through the RSVP cycle again.
    pub async fn allow_rejoin(&self, trip_id: &str, actor: &str, user_id: &str) -> LedgerResult<Member> {
        self.require_trip(trip_id).await?;
        self.require_manager(trip_id, actor).await?;
        let member = self.require_member(trip_id, user_id).await?;
        let next = member.state().rejoin();
        self.apply_transition(member, next, None).await
    }

    pub async fn removal_eligibility(&self, trip_id: &str, user_id: &str) -> LedgerResult<RemovalEligibility> {
        let trip = self.require_trip(trip_id).await?;
        self.require_member(trip_id, user_id).await?;
        let balance = self.compute_balances(trip_id).await?;
        let own_balance = balance.get(user_id).copied().unwrap_or_default();

        let activities = self.store.activities(trip_id).await?;
        let expenses = self.store.expenses(trip_id).await?;
        // a participant only still owes for a prepaid charge while their net balance is negative
        let mut unpaid: BTreeMap<&str, Decimal> = balance
            .iter()
            .filter(|(id, amount)| id.as_str() != user_id && **amount < Decimal::ZERO)
            .map(|(id, amount)| (id.as_str(), -*amount))
            .collect();
        let mut prepaid_activities_owed = Vec::new();
        for activity in activities
            .iter()
            .filter(|a| a.created_by == user_id && a.is_prepaid())
        {
            let mut amount_owed = Decimal::ZERO;
            for expense in expenses.iter().filter(|e| is_charge_for(&e.kind, activity)) {
                for share in expense.shares.iter().filter(|s| s.user_id != user_id) {
                    let Some(debt) = unpaid.get_mut(share.user_id.as_str()) else {
                        continue;
                    };
                    let outstanding = to_decimal(share.amount, "share amount")?.min(*debt);
                    *debt -= outstanding;
                    amount_owed += outstanding;
                }
            }
            if amount_owed > EPSILON {
                prepaid_activities_owed.push(OwedActivity {
                    activity_id: activity.id.clone(),
                    name: activity.name.clone(),
                    amount_owed,
                });
            }
        }

        let mut reasons = Vec::new();
        let mut suggestions = Vec::new();

        if trip.organizer_id == user_id {
            reasons.push("The trip organizer cannot be removed".to_string());
        }
        if own_balance < -EPSILON {
            reasons.push(format!("Member still owes ${}", own_balance.abs()));
            let plan = get_simplified_exchanges(&balance);
            for exchange in recommendations_for(&plan.transactions, user_id) {
                suggestions.push(format!("Pay ${} to {}", exchange.amount, exchange.to_user_id));
            }
        } else if own_balance > EPSILON {
            // once removed they could no longer be named as a payee
            reasons.push(format!("Member is still owed ${own_balance}"));
            let plan = get_simplified_exchanges(&balance);
            for exchange in plan.transactions.iter().filter(|e| e.to_user_id == user_id) {
                suggestions.push(format!(
                    "{} should pay ${} to {}",
                    exchange.from_user_id, exchange.amount, user_id
                ));
            }
        }
        if !prepaid_activities_owed.is_empty() {
            reasons.push(format!(
                "Member organized {} prepaid activities that others still owe for",
                prepaid_activities_owed.len()
            ));
            for owed in &prepaid_activities_owed {
                suggestions.push(format!("Reassign or delete activity '{}'", owed.name));
            }
        }

        Ok(RemovalEligibility {
            can_remove: reasons.is_empty(),
            reason: (!reasons.is_empty()).then(|| reasons.join("; ")),
            balance: own_balance,
            prepaid_activities_owed,
            suggestions,
        })
    }

    /// Removes a member once their balance is settled and no prepaid activity is outstanding.
    pub async fn remove_member(&self, trip_id: &str, actor: &str, user_id: &str) -> LedgerResult<()> {
        if actor != user_id {
            self.require_manager(trip_id, actor).await?;
        }
        let eligibility = self.removal_eligibility(trip_id, user_id).await?;
        if !eligibility.can_remove {
            let reason = eligibility.reason.unwrap_or_default();
            tracing::warn!(trip_id, user_id, %reason, "member removal blocked");
            return Err(LedgerError::conflict(reason));
        }
        if !self.store.delete_member(trip_id, user_id).await? {
            return Err(LedgerError::not_found(format!(
                "{user_id} is not a member of trip {trip_id}"
            )));
        }
        tracing::info!(trip_id, user_id, removed_by = actor, "member removed");
        Ok(())
    }

    async fn apply_transition(
        &self,
        member: Member,
        next: Result<MemberState, InvalidTransition>,
        payment_method: Option<PaymentMethod>,
    ) -> LedgerResult<Member> {
        let current = member.state();
        let next = next.map_err(|err| {
            tracing::warn!(trip_id = %member.trip_id, user_id = %member.user_id, "{err}");
            LedgerError::conflict(format!("Invalid membership change: {err}"))
        })?;

        let applied = self
            .store
            .transition_member(&member.trip_id, &member.user_id, current, next, payment_method)
            .await?;
        if !applied {
            return Err(LedgerError::conflict(
                "Membership was changed by another request, reload and try again",
            ));
        }

        tracing::info!(
            trip_id = %member.trip_id,
            user_id = %member.user_id,
            rsvp = %next.rsvp,
            payment = %next.payment,
            "membership updated"
        );
        Ok(Member {
            rsvp_status: next.rsvp,
            payment_status: next.payment,
            payment_method: payment_method.unwrap_or(member.payment_method),
            ..member
        })
    }
}

fn is_charge_for(kind: &ExpenseKind, activity: &Activity) -> bool {
    matches!(kind, ExpenseKind::ActivityPrepaid { activity_id } if *activity_id == activity.id)
}
