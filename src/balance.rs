use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::lifecycle::SettlementStatus;
use crate::money::{normalize, to_decimal};
use crate::schemas::{Expense, Member, Settlement, UserId};

/// Net position per user: positive is owed money, negative owes money.
pub type Balance = BTreeMap<UserId, Decimal>;

/// Folds a trip's expenses and confirmed settlements into one net balance per user.
///
/// Every member gets an entry, even when untouched. Users that appear in
/// records but are no longer members only show up while they still carry a
/// non-zero balance. A trip without members yields an empty map.
pub fn compute_balances(
    members: &[Member],
    expenses: &[Expense],
    settlements: &[Settlement],
) -> Result<Balance, LedgerError> {
    if members.is_empty() {
        return Ok(Balance::new());
    }

    let mut balance: Balance = members
        .iter()
        .map(|member| (member.user_id.clone(), Decimal::ZERO))
        .collect();

    for expense in expenses {
        let amount = to_decimal(expense.amount, "expense amount")?;
        *balance.entry(expense.payer.clone()).or_default() += amount;
        for share in &expense.shares {
            let owed = to_decimal(share.amount, "share amount")?;
            *balance.entry(share.user_id.clone()).or_default() -= owed;
        }
    }

    for settlement in settlements
        .iter()
        .filter(|s| s.status == SettlementStatus::Confirmed)
    {
        let amount = to_decimal(settlement.amount, "settlement amount")?;
        *balance.entry(settlement.payer_id.clone()).or_default() += amount;
        *balance.entry(settlement.payee_id.clone()).or_default() -= amount;
    }

    let is_member = |user_id: &UserId| members.iter().any(|m| &m.user_id == user_id);
    Ok(balance
        .into_iter()
        .map(|(user_id, amount)| (user_id, normalize(amount)))
        .filter(|(user_id, amount)| is_member(user_id) || !amount.is_zero())
        .collect())
}

pub fn total(balance: &Balance) -> Decimal {
    balance.values().copied().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{PaymentMethod, PaymentStatus, RsvpStatus};
    use crate::schemas::{ExpenseKind, Share};
    use chrono::Utc;

    fn member(user_id: &str) -> Member {
        Member {
            trip_id: "trip".to_string(),
            user_id: user_id.to_string(),
            display_name: user_id.to_uppercase(),
            rsvp_status: RsvpStatus::Confirmed,
            payment_status: PaymentStatus::None,
            payment_method: PaymentMethod::None,
            is_organizer: user_id == "a",
            is_admin: false,
            joined_at: Utc::now(),
        }
    }

    fn expense(payer: &str, amount: f64, shares: &[(&str, f64)]) -> Expense {
        Expense {
            id: crate::schemas::new_id(),
            trip_id: "trip".to_string(),
            description: "dinner".to_string(),
            amount,
            payer: payer.to_string(),
            shares: shares
                .iter()
                .map(|(user_id, amount)| Share {
                    user_id: user_id.to_string(),
                    amount: *amount,
                })
                .collect(),
            kind: ExpenseKind::Manual,
            created_by: payer.to_string(),
            created_at: Utc::now(),
        }
    }

    fn settlement(payer: &str, payee: &str, amount: f64, status: SettlementStatus) -> Settlement {
        Settlement {
            id: crate::schemas::new_id(),
            trip_id: "trip".to_string(),
            payer_id: payer.to_string(),
            payee_id: payee.to_string(),
            amount,
            payment_method: PaymentMethod::Cash,
            status,
            notes: None,
            submitted_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    fn dec(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[test]
    fn triangle_dinner() {
        let members = [member("a"), member("b"), member("c")];
        let expenses = [expense("a", 30.0, &[("a", 10.0), ("b", 10.0), ("c", 10.0)])];

        let balance = compute_balances(&members, &expenses, &[]).unwrap();

        assert_eq!(balance["a"], dec(2000));
        assert_eq!(balance["b"], dec(-1000));
        assert_eq!(balance["c"], dec(-1000));
        assert_eq!(total(&balance), Decimal::ZERO);
    }

    #[test]
    fn payer_outside_the_split_is_credited_in_full() {
        let members = [member("a"), member("b"), member("c")];
        let expenses = [expense("a", 20.0, &[("b", 10.0), ("c", 10.0)])];

        let balance = compute_balances(&members, &expenses, &[]).unwrap();

        assert_eq!(balance["a"], dec(2000));
        assert_eq!(balance["b"], dec(-1000));
    }

    #[test]
    fn only_confirmed_settlements_count() {
        let members = [member("a"), member("b")];
        let expenses = [expense("a", 20.0, &[("a", 10.0), ("b", 10.0)])];
        let settlements = [
            settlement("b", "a", 4.0, SettlementStatus::Confirmed),
            settlement("b", "a", 6.0, SettlementStatus::Pending),
            settlement("b", "a", 6.0, SettlementStatus::Rejected),
        ];

        let balance = compute_balances(&members, &expenses, &settlements).unwrap();

        assert_eq!(balance["a"], dec(600));
        assert_eq!(balance["b"], dec(-600));
    }

    #[test]
    fn dust_is_reported_as_settled() {
        let members = [member("a"), member("b"), member("c")];
        let expenses = [expense(
            "a",
            10.0,
            &[("a", 3.333), ("b", 3.333), ("c", 3.334)],
        )];
        let settlements = [
            settlement("b", "a", 3.33, SettlementStatus::Confirmed),
            settlement("c", "a", 3.33, SettlementStatus::Confirmed),
        ];

        let balance = compute_balances(&members, &expenses, &settlements).unwrap();

        assert_eq!(balance["b"], Decimal::ZERO);
        assert!(balance.values().all(|b| b.abs() <= dec(1)));
    }

    #[test]
    fn members_without_activity_show_zero() {
        let members = [member("a"), member("b")];
        let balance = compute_balances(&members, &[], &[]).unwrap();
        assert_eq!(balance.len(), 2);
        assert!(balance.values().all(Decimal::is_zero));
    }

    #[test]
    fn no_members_means_no_balances() {
        let expenses = [expense("a", 30.0, &[("b", 30.0)])];
        assert!(compute_balances(&[], &expenses, &[]).unwrap().is_empty());
    }

    #[test]
    fn former_members_keep_outstanding_balances() {
        let members = [member("a")];
        let expenses = [expense("a", 30.0, &[("gone", 30.0)])];

        let balance = compute_balances(&members, &expenses, &[]).unwrap();

        assert_eq!(balance["gone"], dec(-3000));
        assert_eq!(total(&balance), Decimal::ZERO);
    }

    #[test]
    fn corrupt_amounts_fail_validation() {
        let members = [member("a"), member("b")];
        let expenses = [expense("a", f64::NAN, &[("b", 1.0)])];
        assert!(matches!(
            compute_balances(&members, &expenses, &[]),
            Err(LedgerError::Validation(_))
        ));
    }
}
