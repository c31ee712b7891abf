use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crate::repos::common::*;

#[test]
#[ignore = "requires DATABASE_URL"]
fn create_account_links_owner() {
	let suite = Suite::setup();
	let vince = suite.create_user("vince", Role::Customer);

	let want = suite.create_account(&vince, AccountType::Checking, AccountStatus::Open, 100);

	let got = suite.account_repo.find_account(want.id).unwrap();
	assert_eq!(got, Some(want.clone()));
	assert_eq!(suite.account_repo.list_owners(want.id).unwrap(), [vince.id].iter().cloned().collect::<HashSet<Id>>());
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn find_accounts_for_user() {
	let suite = Suite::setup();
	let vince = suite.create_user("vince", Role::Customer);
	let jack = suite.create_user("jack", Role::Customer);

	let checking = suite.create_account(&vince, AccountType::Checking, AccountStatus::Open, 0);
	let savings = suite.create_account(&vince, AccountType::Savings, AccountStatus::Pending, 0);
	let joint = suite.create_account(&jack, AccountType::Savings, AccountStatus::Open, 0);
	assert!(suite.account_repo.add_owner(joint.id, vince.id).unwrap());
	assert!(suite.account_repo.add_owner(joint.id, vince.id).unwrap());

	let got = suite.account_repo.find_accounts_by_owner(vince.id).unwrap();
	assert_eq!(got, vec![checking, savings.clone(), joint.clone()]);

	let got = suite.account_repo.find_accounts_by_status(AccountStatus::Pending).unwrap();
	assert_eq!(got, vec![savings.clone()]);

	let got = suite.account_repo.find_accounts_by_type(AccountType::Savings).unwrap();
	assert_eq!(got, vec![savings, joint]);
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn set_status_and_delete() {
	let suite = Suite::setup();
	let vince = suite.create_user("vince", Role::Customer);
	let account = suite.create_account(&vince, AccountType::Checking, AccountStatus::Pending, 0);

	let got = suite.account_repo.set_status(account.id, AccountStatus::Open).unwrap().unwrap();
	assert_eq!(got.status, AccountStatus::Open);
	assert_eq!(suite.account_repo.set_status(-1, AccountStatus::Open).unwrap(), None);

	assert!(suite.account_repo.delete_account(account.id).unwrap());
	assert!(!suite.account_repo.delete_account(account.id).unwrap());
	assert!(suite.account_repo.list_owners(account.id).unwrap().is_empty());
	assert!(!suite.account_repo.add_owner(account.id, vince.id).unwrap());
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn update_balances_rolls_back_on_failure() {
	let suite = Suite::setup();
	let vince = suite.create_user("vince", Role::Customer);
	let x = suite.create_account(&vince, AccountType::Checking, AccountStatus::Open, 80);
	let y = suite.create_account(&vince, AccountType::Checking, AccountStatus::Open, 20);

	let err = suite.account_repo.update_balances(&[x.id, y.id], &mut |accounts| {
		accounts[0].balance = BigDecimal::from(0);
		Err(Error::new(ErrorKind::NotAuthorized))
	}).unwrap_err();
	assert_eq!(err.kind(), &ErrorKind::NotAuthorized);

	let err = suite.account_repo.update_balances(&[x.id, -1], &mut |_| Ok(())).unwrap_err();
	assert_eq!(err.kind(), &ErrorKind::AccountNotFound(-1));

	assert_eq!(suite.account_repo.find_account(x.id).unwrap().unwrap().balance, BigDecimal::from(80));
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn engine_over_row_locks() {
	let suite = Suite::setup();
	let admin = suite.create_user("admin", Role::Admin);
	let x = suite.create_account(&admin, AccountType::Checking, AccountStatus::Open, 100);
	let y = suite.create_account(&admin, AccountType::Savings, AccountStatus::Open, 100);

	let store: Arc<dyn AccountStore> = Arc::new(account::Repo::new(suite.pool.clone()));
	let engine = Engine::new(store, 3);
	let actor = Principal::new(admin.id, admin.role);
	let amount = BigDecimal::from(1);

	thread::scope(|s| {
		for i in 0..4 {
			let (from, to) = if i % 2 == 0 { (x.id, y.id) } else { (y.id, x.id) };
			let engine = &engine;
			let actor = &actor;
			let amount = &amount;
			s.spawn(move || {
				for _ in 0..10 {
					engine.transfer(actor, from, to, amount).unwrap();
				}
			});
		}
	});

	let x = suite.account_repo.find_account(x.id).unwrap().unwrap();
	let y = suite.account_repo.find_account(y.id).unwrap().unwrap();
	assert_eq!(x.balance + y.balance, BigDecimal::from(200));
}
