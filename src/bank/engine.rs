use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use log::*;
use serde::Serialize;

use crate::account::{Account, AccountType};
use crate::auth::Principal;
use crate::store::AccountStore;
use crate::types::Id;

use super::error::{Error, ErrorKind};
use super::Result;

/// Longest span a single accrual may cover (100 years)
pub const MAX_ACCRUAL_MONTHS: i32 = 1200;

/// Most fractional digits a stored balance may carry; PostgreSQL `NUMERIC` allows no more
pub const MAX_BALANCE_SCALE: i64 = 16383;

/// Balance movements over the account store
///
/// Every movement is a single read-modify-write through
/// [`AccountStore::update_balances`], so the balance is re-read under the account's
/// lock immediately before it is changed and nothing is cached between calls.
pub struct Engine {
	accounts: Arc<dyn AccountStore>,
	retries: u32,
}

/// Both sides of a completed transfer
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Transfer {
	pub source: Account,
	pub target: Account,
}

/// Outcome of passing time over the savings accounts
#[derive(Debug, Default)]
pub struct AccrualReport {
	pub months: u32,
	pub succeeded: usize,
	pub failed: Vec<AccrualFailure>,
}

#[derive(Debug)]
pub struct AccrualFailure {
	pub account_id: Id,
	pub error: Error,
}

impl AccrualReport {
	pub fn failed_ids(&self) -> Vec<Id> {
		self.failed.iter().map(|failure| failure.account_id).collect()
	}
}

impl Engine {
	/// # Arguments
	/// * `accounts` - store holding the balances
	/// * `retries` - extra attempts for a single-account movement that hit a transient store failure
	pub fn new(accounts: Arc<dyn AccountStore>, retries: u32) -> Self {
		Engine { accounts, retries }
	}

	/// Deposit funds into an open account
	///
	/// # Arguments
	/// * `actor` - principal the deposit is attributed to
	/// * `account_id` - account receiving the funds
	/// * `amount` - amount deposited, must be positive
	pub fn deposit(&self, actor: &Principal, account_id: Id, amount: &BigDecimal) -> Result<Account> {
		require_positive(amount)?;

		let updated = self.with_retry("deposit", account_id, || {
			self.accounts.update_balances(&[account_id], &mut |accounts: &mut [Account]| {
				for account in accounts.iter_mut() {
					require_open(account)?;
					account.balance = &account.balance + amount;
				}
				Ok(())
			})
		})?;

		let account = single(updated, account_id)?;
		info!(target: "bank::engine", "user {} deposited {} into account {}", actor.user_id, amount, account_id);
		Ok(account)
	}

	/// Withdraw funds from an open account
	///
	/// Fails with `IllegalAmount` unless `0 < amount <= balance`; the balance is then
	/// left untouched.
	pub fn withdraw(&self, actor: &Principal, account_id: Id, amount: &BigDecimal) -> Result<Account> {
		require_positive(amount)?;

		let updated = self.with_retry("withdraw", account_id, || {
			self.accounts.update_balances(&[account_id], &mut |accounts: &mut [Account]| {
				for account in accounts.iter_mut() {
					require_open(account)?;
					require_covered(account, amount)?;
					account.balance = &account.balance - amount;
				}
				Ok(())
			})
		})?;

		let account = single(updated, account_id)?;
		info!(target: "bank::engine", "user {} withdrew {} from account {}", actor.user_id, amount, account_id);
		Ok(account)
	}

	/// Move funds between two distinct open accounts as one unit
	///
	/// Not retried: a transient failure leaves both balances as they were and is
	/// reported to the caller.
	pub fn transfer(&self, actor: &Principal, source_id: Id, target_id: Id, amount: &BigDecimal) -> Result<Transfer> {
		require_positive(amount)?;
		if source_id == target_id {
			return Err(Error::illegal_amount("source and target accounts must differ"));
		}

		let mut updated = self.accounts.update_balances(&[source_id, target_id], &mut |accounts: &mut [Account]| {
			if let [source, target] = accounts {
				require_open(source)?;
				require_open(target)?;
				require_covered(source, amount)?;
				source.balance = &source.balance - amount;
				target.balance = &target.balance + amount;
			}
			Ok(())
		}).map_err(|e| {
			warn!(target: "bank::engine", "transfer {} -> {} failed: {}", source_id, target_id, e);
			e
		})?;

		let target = updated.pop().ok_or_else(|| Error::new(ErrorKind::AccountNotFound(target_id)))?;
		let source = updated.pop().ok_or_else(|| Error::new(ErrorKind::AccountNotFound(source_id)))?;
		info!(target: "bank::engine", "user {} transferred {} from account {} to account {}",
			  actor.user_id, amount, source_id, target_id);
		Ok(Transfer { source, target })
	}

	/// Compound `rate` onto every savings account once per month for `months` months
	///
	/// Each account is updated on its own: a failure on one account is recorded in
	/// the report and the remaining accounts are still processed.
	///
	/// Compounding is exact, so every month adds the rate's scale to the balance's. An
	/// account whose result would exceed [`MAX_BALANCE_SCALE`] fails with
	/// `IllegalAmount` and is left untouched.
	pub fn accrue_interest(&self, actor: &Principal, months: i32, rate: &BigDecimal) -> Result<AccrualReport> {
		if months < 0 {
			return Err(Error::illegal_amount("months must not be negative"));
		}
		if months > MAX_ACCRUAL_MONTHS {
			return Err(Error::illegal_amount(format!("cannot pass more than {} months at once", MAX_ACCRUAL_MONTHS)));
		}
		if rate < &BigDecimal::zero() {
			return Err(Error::illegal_amount("interest rate must not be negative"));
		}
		let months = months as u32;
		let mut report = AccrualReport { months, ..AccrualReport::default() };
		if months == 0 {
			return Ok(report);
		}

		let factor = BigDecimal::from(1) + rate;
		let factor_scale = scale(&factor);
		let savings = self.accounts.find_accounts_by_type(AccountType::Savings)?;
		for account in savings {
			let result = self.with_retry("accrue", account.id, || {
				self.accounts.update_balances(&[account.id], &mut |accounts: &mut [Account]| {
					for savings in accounts.iter_mut() {
						require_open(savings)?;
						let compounded_scale = scale(&savings.balance) + i64::from(months) * factor_scale;
						if compounded_scale > MAX_BALANCE_SCALE {
							return Err(Error::illegal_amount(format!(
								"{} months at {} would give account {} a balance with {} decimal places",
								months, rate, savings.id, compounded_scale,
							)));
						}
						for _ in 0..months {
							savings.balance = &savings.balance * &factor;
						}
					}
					Ok(())
				})
			});

			match result {
				Ok(_) => report.succeeded += 1,
				Err(error) => {
					warn!(target: "bank::engine", "interest not accrued on account {}: {}", account.id, error);
					report.failed.push(AccrualFailure { account_id: account.id, error });
				}
			}
		}

		info!(target: "bank::engine", "user {} accrued {} months of interest at {} on {} savings accounts ({} failed)",
			  actor.user_id, months, rate, report.succeeded, report.failed.len());
		Ok(report)
	}

	fn with_retry<T, F>(&self, op: &str, account_id: Id, mut attempt: F) -> Result<T>
		where F: FnMut() -> Result<T>
	{
		let mut retries_left = self.retries;
		loop {
			match attempt() {
				Err(e) if e.is_transient() && retries_left > 0 => {
					retries_left -= 1;
					warn!(target: "bank::engine", "{} on account {} failed ({}), {} retries left", op, account_id, e, retries_left);
				}
				result => return result,
			}
		}
	}
}

fn require_positive(amount: &BigDecimal) -> Result<()> {
	if amount <= &BigDecimal::zero() {
		return Err(Error::illegal_amount(format!("{} is not a positive amount", amount)));
	}
	Ok(())
}

fn require_open(account: &Account) -> Result<()> {
	if !account.is_open() {
		return Err(Error::new(ErrorKind::AccountNotEligible(account.id, account.status)));
	}
	Ok(())
}

fn require_covered(account: &Account, amount: &BigDecimal) -> Result<()> {
	if amount > &account.balance {
		return Err(Error::illegal_amount(format!("account {} cannot cover {}", account.id, amount)));
	}
	Ok(())
}

/// Fractional digits of `value`, zero for whole numbers
fn scale(value: &BigDecimal) -> i64 {
	value.as_bigint_and_exponent().1.max(0)
}

fn single(mut accounts: Vec<Account>, account_id: Id) -> Result<Account> {
	accounts.pop().ok_or_else(|| Error::new(ErrorKind::AccountNotFound(account_id)))
}
