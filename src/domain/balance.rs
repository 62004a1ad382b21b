use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::models::expense::LedgerEntry;

/// Balances after each entry, in ledger order:
/// `balance[i] = balance[i-1] + income[i] - expense[i]`
pub fn running_balances(opening: Decimal, entries: &[LedgerEntry]) -> Vec<(Uuid, Decimal)> {
    entries
        .iter()
        .scan(opening, |balance, entry| {
            *balance += entry.income_amount - entry.expense_amount;
            Some((entry.id, *balance))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn entry(income: &str, expense: &str) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            income_amount: dec(income),
            expense_amount: dec(expense),
        }
    }

    #[test]
    fn prefix_sum_from_opening() {
        let entries = vec![entry("1000.00", "0"), entry("0", "250.50"), entry("0", "49.50"), entry("10.00", "0")];
        let balances: Vec<Decimal> = running_balances(dec("100.00"), &entries).into_iter().map(|(_, b)| b).collect();
        assert_eq!(balances, vec![dec("1100.00"), dec("849.50"), dec("800.00"), dec("810.00")]);
    }

    #[test]
    fn may_go_negative() {
        let entries = vec![entry("0", "30.00")];
        let out = running_balances(Decimal::ZERO, &entries);
        assert_eq!(out[0].0, entries[0].id);
        assert_eq!(out[0].1, dec("-30.00"));
    }

    #[test]
    fn empty_ledger() {
        assert!(running_balances(dec("5"), &[]).is_empty());
    }
}
