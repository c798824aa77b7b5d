//! Sliding-window call log for a single rate scope.

// std
use std::collections::VecDeque;
// self
use crate::{
	_prelude::*,
	rate_limit::{Admission, RatePolicy},
};

/// Timestamps of admitted calls plus any remote-imposed cooldown for one scope.
///
/// The window is half-open: a call recorded at `t` stops counting at `t + window`, so the
/// `retry_after` of a denial is exactly the instant the oldest call leaves the window.
#[derive(Clone, Debug)]
pub struct RateBudget {
	policy: Option<RatePolicy>,
	calls: VecDeque<OffsetDateTime>,
	cooldown_until: Option<OffsetDateTime>,
	last_seen: Option<OffsetDateTime>,
}
impl RateBudget {
	/// Creates an empty budget; `None` means calls are only gated by cooldowns.
	pub fn new(policy: Option<RatePolicy>) -> Self {
		Self { policy, calls: VecDeque::new(), cooldown_until: None, last_seen: None }
	}

	/// Policy this budget enforces.
	pub fn policy(&self) -> Option<RatePolicy> {
		self.policy
	}

	/// Admits and records the call if the window has room, otherwise reports when it will.
	pub fn try_acquire_at(&mut self, now: OffsetDateTime) -> Admission {
		let now = self.monotonic(now);

		if let Some(until) = self.cooldown_until {
			if now < until {
				return Admission::Denied { retry_after: until - now };
			}

			self.cooldown_until = None;
		}

		let Some(policy) = self.policy else {
			return Admission::Admitted;
		};

		self.purge(policy, now);

		if self.calls.len() < policy.max_calls() as usize {
			self.calls.push_back(now);

			return Admission::Admitted;
		}

		match self.calls.front() {
			Some(oldest) => Admission::Denied {
				retry_after: oldest.checked_add(policy.window()).map_or(Duration::MAX, |free| free - now),
			},
			None => Admission::Admitted,
		}
	}

	/// Blocks admission until `until`; an earlier cooldown never shortens a later one.
	pub fn penalize(&mut self, until: OffsetDateTime) {
		self.cooldown_until = Some(self.cooldown_until.map_or(until, |current| current.max(until)));
	}

	/// Calls that still count against the window at `now`.
	pub fn calls_in_window(&self, now: OffsetDateTime) -> usize {
		match self.policy {
			Some(policy) => match now.checked_sub(policy.window()) {
				Some(horizon) => self.calls.iter().filter(|t| **t > horizon).count(),
				None => self.calls.len(),
			},
			None => 0,
		}
	}

	/// Remaining admissions at `now`, or `None` for unlimited scopes.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Option<u32> {
		let policy = self.policy?;
		let used = u32::try_from(self.calls_in_window(now)).unwrap_or(u32::MAX);

		Some(policy.max_calls().saturating_sub(used))
	}

	/// Instant admission is blocked until, if a cooldown is active.
	pub fn cooldown_until(&self) -> Option<OffsetDateTime> {
		self.cooldown_until
	}

	// A clock that steps backwards would otherwise let calls escape the window.
	fn monotonic(&mut self, now: OffsetDateTime) -> OffsetDateTime {
		let now = self.last_seen.map_or(now, |last| last.max(now));

		self.last_seen = Some(now);

		now
	}

	fn purge(&mut self, policy: RatePolicy, now: OffsetDateTime) {
		// Near the calendar floor nothing has left the window yet.
		let Some(horizon) = now.checked_sub(policy.window()) else {
			return;
		};

		while self.calls.front().is_some_and(|t| *t <= horizon) {
			self.calls.pop_front();
		}
	}
}
