use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::balance::Balance;
use crate::money::{is_within_epsilon, round_to_2_decimals, EPSILON};
use crate::schemas::UserId;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exchange {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExchangeStats {
    pub total_transactions: usize,
    pub total_amount: Decimal,
    pub users_involved: usize,
    pub average_transaction_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimplifiedExchanges {
    pub transactions: Vec<Exchange>,
    pub stats: ExchangeStats,
    pub is_valid: bool,
    /// Set when the transactions leave some balance outside the tolerance.
    pub warning: Option<String>,
}

#[derive(Clone, Debug)]
struct PersonalBalance {
    id: UserId,
    balance: Decimal,
}

/// Greedy largest-first matching of debtors against creditors.
///
/// Each round pays the biggest debt towards the biggest credit, ties going to
/// the lexicographically lower user id. A round always retires at least one
/// side, so a group of `n` unsettled people needs at most `n - 1` transfers.
pub fn get_simplified_exchanges(balance: &Balance) -> SimplifiedExchanges {
    let mut payers = Vec::new();
    let mut receivers = Vec::new();

    for (id, &amount) in balance {
        if amount < -EPSILON {
            payers.push(PersonalBalance {
                id: id.clone(),
                balance: -amount,
            });
        } else if amount > EPSILON {
            receivers.push(PersonalBalance {
                id: id.clone(),
                balance: amount,
            });
        }
    }

    let mut exchanges = Vec::new();

    while let (Some(payer_idx), Some(receiver_idx)) = (largest(&payers), largest(&receivers)) {
        let amount = payers[payer_idx].balance.min(receivers[receiver_idx].balance);
        exchanges.push(Exchange {
            from_user_id: payers[payer_idx].id.clone(),
            to_user_id: receivers[receiver_idx].id.clone(),
            amount: round_to_2_decimals(amount),
        });

        payers[payer_idx].balance -= amount;
        receivers[receiver_idx].balance -= amount;
        // a leftover cent is still owed, only sub-cent dust retires a party
        if payers[payer_idx].balance < EPSILON {
            payers.swap_remove(payer_idx);
        }
        if receivers[receiver_idx].balance < EPSILON {
            receivers.swap_remove(receiver_idx);
        }
    }

    let stats = compute_stats(&exchanges);
    let warning = validate_exchanges(balance, &exchanges);
    if let Some(message) = &warning {
        tracing::warn!("settlement plan outside tolerance: {message}");
    }

    SimplifiedExchanges {
        transactions: exchanges,
        stats,
        is_valid: warning.is_none(),
        warning,
    }
}

fn largest(people: &[PersonalBalance]) -> Option<usize> {
    people
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.balance.cmp(&b.balance).then_with(|| b.id.cmp(&a.id)))
        .map(|(idx, _)| idx)
}

fn compute_stats(exchanges: &[Exchange]) -> ExchangeStats {
    if exchanges.is_empty() {
        return ExchangeStats::default();
    }
    let total_amount: Decimal = exchanges.iter().map(|e| e.amount).sum();
    let users: BTreeSet<&UserId> = exchanges
        .iter()
        .flat_map(|e| [&e.from_user_id, &e.to_user_id])
        .collect();
    ExchangeStats {
        total_transactions: exchanges.len(),
        total_amount,
        users_involved: users.len(),
        average_transaction_amount: round_to_2_decimals(
            total_amount / Decimal::from(exchanges.len()),
        ),
    }
}

/// Replays the exchanges on a copy of the balances and describes any leftover.
pub fn validate_exchanges(balance: &Balance, exchanges: &[Exchange]) -> Option<String> {
    let mut remaining = balance.clone();
    for exchange in exchanges {
        *remaining.entry(exchange.from_user_id.clone()).or_default() += exchange.amount;
        *remaining.entry(exchange.to_user_id.clone()).or_default() -= exchange.amount;
    }

    let leftovers: Vec<String> = remaining
        .iter()
        .filter(|(_, amount)| !is_within_epsilon(**amount))
        .map(|(id, amount)| format!("{id} ({amount})"))
        .collect();

    if leftovers.is_empty() {
        None
    } else {
        Some(format!(
            "balances not settled within {EPSILON}: {}",
            leftovers.join(", ")
        ))
    }
}

/// Transactions the given user has to send.
pub fn recommendations_for<'a>(
    exchanges: &'a [Exchange],
    user_id: &'a str,
) -> impl Iterator<Item = &'a Exchange> + 'a {
    exchanges.iter().filter(move |e| e.from_user_id == user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn balance_of(entries: &[(&str, i64)]) -> Balance {
        entries
            .iter()
            .map(|(id, cents)| (id.to_string(), Decimal::new(*cents, 2)))
            .collect()
    }

    fn as_tuples(exchanges: &[Exchange]) -> Vec<(&str, &str, Decimal)> {
        exchanges
            .iter()
            .map(|e| (e.from_user_id.as_str(), e.to_user_id.as_str(), e.amount))
            .collect()
    }

    #[test]
    fn triangle_pays_the_creditor_twice() {
        let result = get_simplified_exchanges(&balance_of(&[("a", 2000), ("b", -1000), ("c", -1000)]));

        assert_eq!(
            as_tuples(&result.transactions),
            vec![
                ("b", "a", Decimal::new(1000, 2)),
                ("c", "a", Decimal::new(1000, 2)),
            ]
        );
        assert!(result.is_valid);
        assert_eq!(result.stats.total_transactions, 2);
        assert_eq!(result.stats.total_amount, Decimal::new(2000, 2));
        assert_eq!(result.stats.users_involved, 3);
        assert_eq!(result.stats.average_transaction_amount, Decimal::new(1000, 2));
    }

    #[test]
    fn all_settled_returns_nothing() {
        let result = get_simplified_exchanges(&balance_of(&[("a", 1), ("b", -1), ("c", 0)]));
        assert!(result.transactions.is_empty());
        assert_eq!(result.stats.total_transactions, 0);
        assert!(result.is_valid);
    }

    #[rstest]
    #[case::largest_first(
        &[("a", -5000), ("b", -1000), ("c", 4000), ("d", 2000)],
        vec![("a", "c", 4000), ("a", "d", 1000), ("b", "d", 1000)]
    )]
    #[case::ties_prefer_lower_ids(
        &[("d", -1000), ("c", -1000), ("b", 1000), ("a", 1000)],
        vec![("c", "a", 1000), ("d", "b", 1000)]
    )]
    #[case::single_debtor_many_creditors(
        &[("a", -6000), ("b", 1000), ("c", 2000), ("d", 3000)],
        vec![("a", "d", 3000), ("a", "c", 2000), ("a", "b", 1000)]
    )]
    fn greedy_matching(#[case] entries: &[(&str, i64)], #[case] expected: Vec<(&str, &str, i64)>) {
        let result = get_simplified_exchanges(&balance_of(entries));
        let expected: Vec<(&str, &str, Decimal)> = expected
            .into_iter()
            .map(|(from, to, cents)| (from, to, Decimal::new(cents, 2)))
            .collect();
        assert_eq!(as_tuples(&result.transactions), expected);
        assert!(result.is_valid);
        assert!(result.transactions.len() < entries.len());
    }

    #[test]
    fn rounding_drift_is_reported_not_thrown() {
        let result = get_simplified_exchanges(&balance_of(&[("a", 1000), ("b", -950)]));
        assert_eq!(as_tuples(&result.transactions), vec![("b", "a", Decimal::new(950, 2))]);
        assert!(!result.is_valid);
        assert!(result.warning.unwrap().contains("a (0.50)"));
    }

    #[test]
    fn drift_within_epsilon_is_still_valid() {
        let result = get_simplified_exchanges(&balance_of(&[("a", 1001), ("b", -1000)]));
        assert_eq!(result.transactions.len(), 1);
        assert!(result.is_valid);
    }

    #[test]
    fn leftover_cents_keep_their_party_in_play() {
        let result = get_simplified_exchanges(&balance_of(&[
            ("a", -5),
            ("b", -5),
            ("c", 4),
            ("d", 4),
            ("e", 2),
        ]));
        assert!(result.is_valid, "{:?}", result.warning);
        assert_eq!(result.stats.total_amount, Decimal::new(10, 2));
    }

    #[test]
    fn recommendations_only_list_outgoing_payments() {
        let result = get_simplified_exchanges(&balance_of(&[("a", 2000), ("b", -1000), ("c", -1000)]));
        let for_b: Vec<_> = recommendations_for(&result.transactions, "b").collect();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].to_user_id, "a");
        assert_eq!(recommendations_for(&result.transactions, "a").count(), 0);
    }
}
