// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Property-based tests for the ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! requests, decisions and adjustments.

use custodial_ledger::{
    AccountId, AccountStore, AdjustmentKind, BankError, Decision, Engine, ManualAdjustment, Money,
    NewAccount, SubAccount, TransactionStatus, TransferRequest,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// A positive amount between 0.01 and 10,000.00.
fn arb_amount() -> impl Strategy<Value = Money> {
    (1i64..=1_000_000i64).prop_map(Money::from_cents)
}

fn arb_sub_account() -> impl Strategy<Value = SubAccount> {
    prop_oneof![Just(SubAccount::Checking), Just(SubAccount::Savings)]
}

#[derive(Debug, Clone)]
enum Op {
    Credit(usize, SubAccount, Money),
    Debit(usize, SubAccount, Money),
    Internal(usize, usize, SubAccount, Money),
    SelfTransfer(usize, SubAccount, Money),
    External(usize, SubAccount, Money),
}

fn arb_op(accounts: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..accounts, arb_sub_account(), arb_amount()).prop_map(|(a, s, m)| Op::Credit(a, s, m)),
        (0..accounts, arb_sub_account(), arb_amount()).prop_map(|(a, s, m)| Op::Debit(a, s, m)),
        (0..accounts, 0..accounts, arb_sub_account(), arb_amount())
            .prop_map(|(a, b, s, m)| Op::Internal(a, b, s, m)),
        (0..accounts, arb_sub_account(), arb_amount())
            .prop_map(|(a, s, m)| Op::SelfTransfer(a, s, m)),
        (0..accounts, arb_sub_account(), arb_amount()).prop_map(|(a, s, m)| Op::External(a, s, m)),
    ]
}

fn open_accounts(engine: &Engine, count: usize) -> Vec<AccountId> {
    (0..count)
        .map(|i| {
            engine
                .accounts()
                .create(NewAccount {
                    approved: true,
                    ..NewAccount::customer(format!("user{i}@x.io"), "User", "hash")
                })
                .unwrap()
                .id()
        })
        .collect()
}

fn adjust(engine: &Engine, account: AccountId, action: AdjustmentKind, sub: SubAccount, amount: Money)
    -> Result<(), BankError>
{
    engine
        .manual_adjust(ManualAdjustment {
            user_id: account,
            action,
            amount,
            account_type: sub.to_string(),
            description: None,
            custom_date: None,
        })
        .map(|_| ())
}

fn request(kind: &str, from: SubAccount, to_user: Option<AccountId>, info: Option<&str>, amount: Money)
    -> TransferRequest
{
    TransferRequest {
        from_account_type: from.to_string(),
        to_user_id: to_user,
        to_account_info: info.map(str::to_string),
        amount,
        transaction_type: kind.to_string(),
        description: String::new(),
    }
}

fn other(sub: SubAccount) -> SubAccount {
    match sub {
        SubAccount::Checking => SubAccount::Savings,
        SubAccount::Savings => SubAccount::Checking,
    }
}

fn total_cents(engine: &Engine, accounts: &[AccountId]) -> i64 {
    accounts
        .iter()
        .map(|id| {
            let account = engine.accounts().get(id).unwrap();
            account.balance(SubAccount::Checking).cents() + account.balance(SubAccount::Savings).cents()
        })
        .sum()
}

// =============================================================================
// Balance Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// No sequence of operations drives a balance negative, and money only
    /// enters or leaves through adjustments and external transfers.
    #[test]
    fn balances_never_negative_and_money_is_conserved(
        ops in prop::collection::vec(arb_op(3), 1..40),
    ) {
        let engine = Engine::new(Arc::new(AccountStore::new()));
        let accounts = open_accounts(&engine, 3);
        let mut expected: i64 = 0;

        for op in ops {
            match op {
                Op::Credit(a, sub, amount) => {
                    adjust(&engine, accounts[a], AdjustmentKind::Credit, sub, amount).unwrap();
                    expected += amount.cents();
                }
                Op::Debit(a, sub, amount) => {
                    if adjust(&engine, accounts[a], AdjustmentKind::Debit, sub, amount).is_ok() {
                        expected -= amount.cents();
                    }
                }
                Op::Internal(a, b, sub, amount) => {
                    let req = request("internal", sub, Some(accounts[b]), None, amount);
                    if let Ok(tx) = engine.create_transaction(&accounts[a], req) {
                        let _ = engine.decide(&tx.id, Decision::Approve, None);
                    }
                }
                Op::SelfTransfer(a, sub, amount) => {
                    let req = request("self", sub, None, Some(other(sub).as_str()), amount);
                    if let Ok(tx) = engine.create_transaction(&accounts[a], req) {
                        let _ = engine.decide(&tx.id, Decision::Approve, None);
                    }
                }
                Op::External(a, sub, amount) => {
                    let req = request("domestic", sub, None, Some("ext"), amount);
                    if let Ok(tx) = engine.create_transaction(&accounts[a], req) {
                        if engine.decide(&tx.id, Decision::Approve, None).is_ok() {
                            expected -= amount.cents();
                        }
                    }
                }
            }

            for id in &accounts {
                let account = engine.accounts().get(id).unwrap();
                prop_assert!(!account.balance(SubAccount::Checking).is_negative());
                prop_assert!(!account.balance(SubAccount::Savings).is_negative());
            }
        }

        prop_assert_eq!(total_cents(&engine, &accounts), expected);
    }

    /// A credit followed by a debit of the same amount restores the balance.
    #[test]
    fn credit_then_debit_round_trips(
        initial in arb_amount(),
        amount in arb_amount(),
        sub in arb_sub_account(),
    ) {
        let engine = Engine::new(Arc::new(AccountStore::new()));
        let account = open_accounts(&engine, 1)[0];
        adjust(&engine, account, AdjustmentKind::Credit, sub, initial).unwrap();

        adjust(&engine, account, AdjustmentKind::Credit, sub, amount).unwrap();
        adjust(&engine, account, AdjustmentKind::Debit, sub, amount).unwrap();

        let balance = engine.accounts().get(&account).unwrap().balance(sub);
        prop_assert_eq!(balance, initial);
    }

    /// Approving an unfunded transfer fails without side effects.
    #[test]
    fn failed_approval_has_no_side_effects(
        funded in arb_amount(),
        shortfall in arb_amount(),
    ) {
        let engine = Engine::new(Arc::new(AccountStore::new()));
        let ids = open_accounts(&engine, 2);
        let amount = funded.checked_add(shortfall).unwrap();
        adjust(&engine, ids[0], AdjustmentKind::Credit, SubAccount::Checking, amount).unwrap();
        let tx = engine
            .create_transaction(&ids[0], request("internal", SubAccount::Checking, Some(ids[1]), None, amount))
            .unwrap();
        adjust(&engine, ids[0], AdjustmentKind::Debit, SubAccount::Checking, shortfall).unwrap();

        prop_assert_eq!(
            engine.decide(&tx.id, Decision::Approve, None),
            Err(BankError::InsufficientFunds)
        );
        prop_assert_eq!(engine.transaction(&tx.id).unwrap().status, TransactionStatus::Pending);
        prop_assert_eq!(
            engine.accounts().get(&ids[0]).unwrap().balance(SubAccount::Checking),
            funded
        );
        prop_assert_eq!(
            engine.accounts().get(&ids[1]).unwrap().balance(SubAccount::Checking),
            Money::ZERO
        );
    }
}

// =============================================================================
// Money Boundary
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Two-decimal amounts survive parsing and formatting unchanged.
    #[test]
    fn two_decimal_amounts_format_exactly(cents in 0i64..=1_000_000_000i64) {
        let money = Money::from_cents(cents);
        let text = money.to_string();
        prop_assert_eq!(text.split('.').nth(1).map(str::len), Some(2));
        prop_assert_eq!(text.parse::<Money>().unwrap(), money);
        prop_assert_eq!(Money::from_decimal(Decimal::new(cents, 2)).unwrap(), money);
    }

    /// Amounts with a third significant fraction digit are rejected.
    #[test]
    fn sub_cent_amounts_are_rejected(mills in 1i64..=1_000_000i64) {
        prop_assume!(mills % 10 != 0);
        prop_assert_eq!(
            Money::from_decimal(Decimal::new(mills, 3)),
            Err(BankError::InvalidAmount)
        );
    }
}
