//! Settlement lifecycle: a payer records a payment, the payee (or an
//! organizer) confirms or rejects it. Only confirmed settlements move balances.

use chrono::Utc;
use serde::Deserialize;

use crate::error::LedgerError;
use crate::ledger::{LedgerResult, TripLedger};
use crate::lifecycle::{PaymentMethod, SettlementStatus};
use crate::money::{to_f64, validate_amount};
use crate::schemas::{new_id, Resolution, Settlement, UserId};
use crate::validation::{validate_optional_text, MAX_NOTE_LEN};

#[derive(Clone, Debug, Deserialize)]
pub struct NewSettlement {
    pub payee_id: UserId,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl TripLedger {
    /// Records a pending payment from `payer` to the requested payee.
    ///
    /// Venmo and PayPal payments reach this point only once the payer has
    /// marked the external transfer as sent; cash goes straight to pending.
    pub async fn initiate_settlement(
        &self,
        trip_id: &str,
        payer: &str,
        request: NewSettlement,
    ) -> LedgerResult<Settlement> {
        let amount = validate_amount(request.amount, "amount")?;
        if request.payee_id == payer {
            return Err(LedgerError::validation("Payer and payee must be different"));
        }
        if request.payment_method == PaymentMethod::None {
            return Err(LedgerError::validation("A payment method is required"));
        }
        validate_optional_text(&request.notes, "notes", MAX_NOTE_LEN)?;

        self.require_trip(trip_id).await?;
        self.require_member(trip_id, payer).await?;
        self.require_member(trip_id, &request.payee_id).await?;

        let settlement = Settlement {
            id: new_id(),
            trip_id: trip_id.to_string(),
            payer_id: payer.to_string(),
            payee_id: request.payee_id,
            amount: to_f64(amount),
            payment_method: request.payment_method,
            status: SettlementStatus::Pending,
            notes: request.notes,
            submitted_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        };
        self.store.insert_settlement(&settlement).await?;
        tracing::info!(
            trip_id,
            settlement_id = %settlement.id,
            payer,
            payee = %settlement.payee_id,
            amount = settlement.amount,
            method = %settlement.payment_method,
            external = settlement.payment_method.is_external(),
            "settlement initiated"
        );
        Ok(settlement)
    }

    pub async fn confirm_settlement(&self, settlement_id: &str, actor: &str) -> LedgerResult<Settlement> {
        self.resolve_settlement(settlement_id, actor, SettlementStatus::Confirmed)
            .await
    }

    pub async fn reject_settlement(&self, settlement_id: &str, actor: &str) -> LedgerResult<Settlement> {
        self.resolve_settlement(settlement_id, actor, SettlementStatus::Rejected)
            .await
    }

    async fn resolve_settlement(
        &self,
        settlement_id: &str,
        actor: &str,
        status: SettlementStatus,
    ) -> LedgerResult<Settlement> {
        let settlement = self
            .store
            .settlement(settlement_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Couldn't find settlement {settlement_id}")))?;

        if settlement.payee_id != actor && !self.is_manager(&settlement.trip_id, actor).await? {
            return Err(LedgerError::forbidden(
                "Only the payee or an organizer can resolve a settlement",
            ));
        }

        if !settlement.status.can_transition_to(status) {
            tracing::warn!(settlement_id, current = %settlement.status, requested = %status, "settlement already resolved");
            return Err(already_resolved(settlement.status));
        }

        let resolution = Resolution {
            status,
            resolved_by: actor.to_string(),
            resolved_at: Utc::now(),
        };
        match self.store.resolve_settlement(settlement_id, &resolution).await? {
            Some(updated) => {
                tracing::info!(settlement_id, actor, status = %status, "settlement resolved");
                Ok(updated)
            }
            None => {
                // Lost the race against another confirm/reject
                let current = self
                    .store
                    .settlement(settlement_id)
                    .await?
                    .map(|s| s.status)
                    .unwrap_or(status);
                tracing::warn!(settlement_id, current = %current, "concurrent settlement resolution");
                Err(already_resolved(current))
            }
        }
    }
}

fn already_resolved(status: SettlementStatus) -> LedgerError {
    LedgerError::conflict(format!("This settlement was already {status}"))
}
