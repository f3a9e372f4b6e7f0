use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tripsplit::balance::{compute_balances, total, Balance};
use tripsplit::exchange::get_simplified_exchanges;
use tripsplit::lifecycle::{PaymentMethod, PaymentStatus, RsvpStatus, SettlementStatus};
use tripsplit::money::{is_within_epsilon, split_evenly, to_f64};
use tripsplit::schemas::{Expense, ExpenseKind, Member, Settlement, Share};

fn user(idx: usize) -> String {
    format!("user-{idx}")
}

fn member(idx: usize) -> Member {
    Member {
        trip_id: "trip".to_string(),
        user_id: user(idx),
        display_name: user(idx),
        rsvp_status: RsvpStatus::Confirmed,
        payment_status: PaymentStatus::None,
        payment_method: PaymentMethod::None,
        is_organizer: idx == 0,
        is_admin: false,
        joined_at: Utc::now(),
    }
}

fn expense(idx: usize, cents: i64, payer: usize, participants: &[usize]) -> Expense {
    let amount = Decimal::new(cents, 2);
    let shares = participants
        .iter()
        .zip(split_evenly(amount, participants.len()))
        .map(|(&p, part)| Share {
            user_id: user(p),
            amount: to_f64(part),
        })
        .collect();
    Expense {
        id: format!("expense-{idx}"),
        trip_id: "trip".to_string(),
        description: "generated".to_string(),
        amount: to_f64(amount),
        payer: user(payer),
        shares,
        kind: ExpenseKind::Manual,
        created_by: user(payer),
        created_at: Utc::now(),
    }
}

fn settlement(idx: usize, cents: i64, payer: usize, payee: usize, status: SettlementStatus) -> Settlement {
    Settlement {
        id: format!("settlement-{idx}"),
        trip_id: "trip".to_string(),
        payer_id: user(payer),
        payee_id: user(payee),
        amount: to_f64(Decimal::new(cents, 2)),
        payment_method: PaymentMethod::Cash,
        status,
        notes: None,
        submitted_at: Utc::now(),
        resolved_at: (status != SettlementStatus::Pending).then(Utc::now),
        resolved_by: (status != SettlementStatus::Pending).then(|| user(payee)),
    }
}

fn status(pick: u8) -> SettlementStatus {
    match pick % 3 {
        0 => SettlementStatus::Pending,
        1 => SettlementStatus::Confirmed,
        _ => SettlementStatus::Rejected,
    }
}

/// Balances that sum to exactly zero. Single cents are dropped from the
/// generated part so that at most one user sits on the tolerance boundary.
fn zero_sum_balance(cents: &[i64]) -> Balance {
    let cents: Vec<i64> = cents
        .iter()
        .map(|c| if c.abs() == 1 { 0 } else { *c })
        .collect();
    let mut balance: Balance = cents
        .iter()
        .enumerate()
        .map(|(idx, c)| (user(idx), Decimal::new(*c, 2)))
        .collect();
    let rest: i64 = cents.iter().sum();
    balance.insert(user(cents.len()), Decimal::new(-rest, 2));
    balance
}

proptest! {
    #[test]
    fn expense_balances_sum_to_zero(
        member_count in 1usize..=8,
        amounts in prop::collection::vec(1i64..=100_000, 0..=25),
        payers in prop::collection::vec(0usize..8, 25),
        masks in prop::collection::vec(1u32..=255, 25),
        transfers in prop::collection::vec((1i64..=50_000, 0usize..8, 1usize..8, any::<u8>()), 0..=10),
    ) {
        let members: Vec<Member> = (0..member_count).map(member).collect();
        let expenses: Vec<Expense> = amounts
            .iter()
            .enumerate()
            .map(|(idx, &cents)| {
                let mut participants: Vec<usize> = (0..member_count)
                    .filter(|p| masks[idx] & (1 << p) != 0)
                    .collect();
                if participants.is_empty() {
                    participants.push(0);
                }
                expense(idx, cents, payers[idx] % member_count, &participants)
            })
            .collect();

        let settlements: Vec<Settlement> = transfers
            .iter()
            .enumerate()
            .filter(|_| member_count > 1)
            .map(|(idx, &(cents, payer, offset, pick))| {
                let payer = payer % member_count;
                let payee = (payer + 1 + offset % (member_count - 1)) % member_count;
                settlement(idx, cents, payer, payee, status(pick))
            })
            .collect();

        let without = compute_balances(&members, &expenses, &[]).unwrap();
        let balance = compute_balances(&members, &expenses, &settlements).unwrap();
        prop_assert_eq!(balance.len(), member_count);
        prop_assert!(is_within_epsilon(total(&balance)));
        prop_assert_eq!(total(&balance), total(&without));
    }

    #[test]
    fn plan_settles_every_balance(cents in prop::collection::vec(-50_000i64..=50_000, 0..=10)) {
        let balance = zero_sum_balance(&cents);
        let plan = get_simplified_exchanges(&balance);
        prop_assert!(plan.is_valid);
        prop_assert!(plan.warning.is_none());

        let mut remaining = balance.clone();
        for exchange in &plan.transactions {
            prop_assert!(exchange.amount > Decimal::ZERO);
            prop_assert_ne!(&exchange.from_user_id, &exchange.to_user_id);
            *remaining.get_mut(&exchange.from_user_id).unwrap() += exchange.amount;
            *remaining.get_mut(&exchange.to_user_id).unwrap() -= exchange.amount;
        }
        prop_assert!(remaining.values().all(|b| is_within_epsilon(*b)));
    }

    #[test]
    fn plan_needs_fewer_transfers_than_unsettled_users(
        cents in prop::collection::vec(-50_000i64..=50_000, 0..=10),
    ) {
        let balance = zero_sum_balance(&cents);
        let unsettled = balance.values().filter(|b| !is_within_epsilon(**b)).count();
        let plan = get_simplified_exchanges(&balance);
        prop_assert!(plan.transactions.len() <= unsettled.saturating_sub(1));
        prop_assert_eq!(plan.stats.total_transactions, plan.transactions.len());
    }
}
