//! Consumable quota with calendar resets.
//!
//! A quota is charged in two phases. [`QuotaRestriction::reserve_quota`]
//! leases up to `max_amount` (but at least `min_amount`) from the current
//! window before the real cost is known; [`QuotaRestriction::free_unused_quota`]
//! reconciles the lease with the actual usage afterwards. Expired windows
//! are rolled over lazily on the next reservation.
//!
//! The methods mutate `counter` and `last_reset` in place and do no locking.
//! The caller must serialise them per restriction and persist the result.

use super::actor::ActorContext;
use super::target::{RestrictionTarget, RoleCheck};
use super::window::{PeriodStrategy, Window, WindowError, local_now, parse_timezone};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Smallest lease a reservation grants unless configured otherwise.
pub const DEFAULT_MINIMUM_LEASE: Decimal = Decimal::ONE;

/// Budget that resets every `reset_strategy` period.
///
/// `last_reset` and `end_time` are wall-clock times in `timezone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRestriction {
    pub id: String,
    pub restriction_set_id: String,
    /// Budget per window; zero or less disables the restriction.
    pub quota: Decimal,
    /// Consumed so far in the current window.
    pub counter: Decimal,
    pub target: RestrictionTarget,
    pub reset_strategy: String,
    pub timezone: String,
    /// Start of the current accounting window.
    pub last_reset: NaiveDateTime,
    /// The `last_reset` the window sequence was first laid out from.
    ///
    /// Set on the first rollover. Monthly and yearly windows are clamped to
    /// short months, so later windows must be resolved from this value
    /// rather than from a clamped `last_reset`.
    #[serde(default)]
    pub reset_anchor: Option<NaiveDateTime>,
    /// Hard expiry, after which the restriction never allows.
    pub end_time: Option<NaiveDateTime>,
    /// Optimistic concurrency token, bumped by the store on every write.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A tentative hold on quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaReservation {
    pub quota_restriction_id: Option<String>,
    /// `last_reset` at the time of the reservation.
    pub window_identity: Option<NaiveDateTime>,
    pub reserved: Decimal,
}

impl QuotaReservation {
    /// The reservation handed out when no quota applies.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            quota_restriction_id: None,
            window_identity: None,
            reserved: Decimal::ZERO,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.quota_restriction_id.is_none()
    }
}

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDenial {
    /// `end_time` has passed.
    Expired,
    /// `last_reset` lies in the future.
    NotStarted,
    /// The actor is not targeted by this restriction.
    TargetMismatch,
    /// Not even `min_amount` is left in this window.
    Exhausted,
    /// The lease would be smaller than the minimum lease.
    DegenerateLease,
}

/// Result of [`QuotaRestriction::reserve_quota`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved(QuotaReservation),
    /// The quota is disabled; the null reservation applies.
    Unrestricted,
    Denied(QuotaDenial),
}

impl ReserveOutcome {
    /// The reservation to hand to the caller, `None` when denied.
    #[must_use]
    pub fn reservation(&self) -> Option<QuotaReservation> {
        match self {
            Self::Reserved(reservation) => Some(reservation.clone()),
            Self::Unrestricted => Some(QuotaReservation::null()),
            Self::Denied(_) => None,
        }
    }

    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// Result of reconciling a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The counter was adjusted by the difference.
    Applied,
    /// The window rolled over since the reservation; nothing to adjust.
    Stale,
    /// The reservation belongs to another restriction.
    Mismatched,
}

impl ReleaseOutcome {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        !matches!(self, Self::Mismatched)
    }
}

/// Read-only view of a quota restriction for one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    /// Confusingly named: `true` while `end_time` has *not* passed.
    pub has_ended: bool,
    pub has_started: bool,
    pub role: RoleCheck,
    pub quota_is_null: bool,
    /// Budget left, assuming a due rollover has already happened.
    pub quota_available: Decimal,
}

impl QuotaStatus {
    #[must_use]
    pub const fn is_still_valid(&self) -> bool {
        self.has_ended
    }

    /// Whether this quota currently prevents the actor from consuming.
    #[must_use]
    pub fn blocks_access(&self) -> bool {
        self.role.allowed
            && self.has_ended
            && self.has_started
            && !self.quota_is_null
            && self.quota_available <= Decimal::ZERO
    }
}

impl QuotaRestriction {
    /// Check that the reset strategy and timezone are usable.
    pub fn validate(&self) -> Result<(), WindowError> {
        self.strategy()?;
        self.tz()?;
        Ok(())
    }

    /// The accounting window `now` falls into.
    pub fn current_window(&self, now: DateTime<Utc>) -> Result<Window, WindowError> {
        self.strategy()?
            .resolve(&[self.anchor()], self.tz()?, now)?
            .into_iter()
            .next()
            .ok_or(WindowError::OutOfRange)
    }

    /// Evaluate the restriction without changing it.
    pub fn evaluate_status(
        &self,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, WindowError> {
        let tz = self.tz()?;
        let now_local = local_now(tz, now);

        let quota_available = if self.due_rollover(tz, now)?.is_some() {
            self.quota
        } else {
            self.quota.saturating_sub(self.counter)
        };

        Ok(QuotaStatus {
            has_ended: !self.has_expired(now_local),
            has_started: self.last_reset <= now_local,
            role: RoleCheck::evaluate(self.target, actor),
            quota_is_null: self.quota <= Decimal::ZERO,
            quota_available,
        })
    }

    /// Lease between `min_amount` and `max_amount` from the current window.
    pub fn reserve_quota(
        &mut self,
        actor: &ActorContext,
        min_amount: Decimal,
        max_amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, WindowError> {
        self.reserve_quota_with_floor(actor, min_amount, max_amount, DEFAULT_MINIMUM_LEASE, now)
    }

    /// [`reserve_quota`](Self::reserve_quota) with an explicit minimum lease.
    ///
    /// A negative `min_amount` counts as zero and `max_amount` below
    /// `min_amount` leases exactly `min_amount`.
    pub fn reserve_quota_with_floor(
        &mut self,
        actor: &ActorContext,
        min_amount: Decimal,
        max_amount: Decimal,
        minimum_lease: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, WindowError> {
        let tz = self.tz()?;
        let now_local = local_now(tz, now);

        if self.has_expired(now_local) {
            return Ok(self.deny(QuotaDenial::Expired));
        }
        if self.last_reset > now_local {
            return Ok(self.deny(QuotaDenial::NotStarted));
        }
        if !self.target.matches(actor) {
            return Ok(self.deny(QuotaDenial::TargetMismatch));
        }
        if self.quota <= Decimal::ZERO {
            return Ok(ReserveOutcome::Unrestricted);
        }

        if let Some(window_start) = self.due_rollover(tz, now)? {
            info!(
                id = %self.id,
                previous = %self.last_reset,
                next = %window_start,
                "Quota window rolled over"
            );
            self.reset_anchor.get_or_insert(self.last_reset);
            self.last_reset = window_start;
            self.counter = Decimal::ZERO;
        }

        let min_amount = min_amount.max(Decimal::ZERO);
        let spread = max_amount
            .checked_sub(min_amount)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);

        // Amounts beyond the representable range can never fit the quota.
        let Some(headroom) = self
            .counter
            .checked_add(min_amount)
            .and_then(|needed| self.quota.checked_sub(needed))
            .filter(|headroom| *headroom >= Decimal::ZERO)
        else {
            return Ok(self.deny(QuotaDenial::Exhausted));
        };

        let Some(lease) = headroom.min(spread).checked_add(min_amount) else {
            return Ok(self.deny(QuotaDenial::Exhausted));
        };
        if lease < minimum_lease {
            return Ok(self.deny(QuotaDenial::DegenerateLease));
        }
        let Some(counter) = self.counter.checked_add(lease) else {
            return Ok(self.deny(QuotaDenial::Exhausted));
        };

        self.counter = counter;
        Ok(ReserveOutcome::Reserved(QuotaReservation {
            quota_restriction_id: Some(self.id.clone()),
            window_identity: Some(self.last_reset),
            reserved: lease,
        }))
    }

    /// Reconcile a reservation with what was actually used.
    ///
    /// Usage above the lease is charged in full, even past the quota. The
    /// counter saturates at the bounds of [`Decimal`].
    pub fn release(
        &mut self,
        reservation: &QuotaReservation,
        actually_used: Decimal,
    ) -> ReleaseOutcome {
        if reservation.quota_restriction_id.as_deref() != Some(self.id.as_str()) {
            return ReleaseOutcome::Mismatched;
        }
        if reservation.window_identity != Some(self.last_reset) {
            return ReleaseOutcome::Stale;
        }
        self.counter = if actually_used >= reservation.reserved {
            self.counter
                .saturating_add(actually_used.saturating_sub(reservation.reserved))
        } else {
            self.counter
                .saturating_sub(reservation.reserved.saturating_sub(actually_used))
        };
        ReleaseOutcome::Applied
    }

    /// Boolean form of [`release`](Self::release): `false` only for a foreign reservation.
    pub fn free_unused_quota(
        &mut self,
        reservation: &QuotaReservation,
        actually_used: Decimal,
    ) -> bool {
        self.release(reservation, actually_used).is_accepted()
    }

    fn deny(&self, reason: QuotaDenial) -> ReserveOutcome {
        debug!(id = %self.id, reason = ?reason, counter = %self.counter, quota = %self.quota, "Quota reservation denied");
        ReserveOutcome::Denied(reason)
    }

    fn has_expired(&self, now_local: NaiveDateTime) -> bool {
        self.end_time.is_some_and(|end| end <= now_local)
    }

    /// Start of the current window if it is later than `last_reset`.
    fn due_rollover(&self, tz: Tz, now: DateTime<Utc>) -> Result<Option<NaiveDateTime>, WindowError> {
        let start = self
            .strategy()?
            .resolve_local(&[self.anchor()], tz, now)?
            .first()
            .map(|(start, _)| *start)
            .ok_or(WindowError::OutOfRange)?;
        Ok((start > self.last_reset).then_some(start))
    }

    fn anchor(&self) -> NaiveDateTime {
        self.reset_anchor.unwrap_or(self.last_reset)
    }

    fn strategy(&self) -> Result<PeriodStrategy, WindowError> {
        self.reset_strategy.parse()
    }

    fn tz(&self) -> Result<Tz, WindowError> {
        parse_timezone(&self.timezone)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::restrictions::actor::{Registration, Role};

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn local(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        local(s).and_utc()
    }

    fn participant() -> ActorContext {
        ActorContext::new("acct", Role::Participant, Registration::Registered)
    }

    fn quota(quota: i64, counter: i64, last_reset: &str) -> QuotaRestriction {
        QuotaRestriction {
            id: "quota1".to_string(),
            restriction_set_id: "set1".to_string(),
            quota: d(quota),
            counter: d(counter),
            target: RestrictionTarget::User,
            reset_strategy: "1d".to_string(),
            timezone: "UTC".to_string(),
            last_reset: local(last_reset),
            reset_anchor: None,
            end_time: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn reserved(outcome: ReserveOutcome) -> QuotaReservation {
        match outcome {
            ReserveOutcome::Reserved(reservation) => reservation,
            other => panic!("expected a reservation, got {other:?}"),
        }
    }

    #[test]
    fn test_daily_scenario() {
        let mut q = quota(100, 95, "2024-06-01 00:00");

        let first = reserved(
            q.reserve_quota(&participant(), d(2), d(20), utc("2024-06-01 10:00"))
                .unwrap(),
        );
        assert_eq!(first.reserved, d(5));
        assert_eq!(q.counter, d(100));

        let second = q
            .reserve_quota(&participant(), d(2), d(20), utc("2024-06-01 15:00"))
            .unwrap();
        assert_eq!(second, ReserveOutcome::Denied(QuotaDenial::Exhausted));
        assert_eq!(q.counter, d(100));

        let next_day = reserved(
            q.reserve_quota(&participant(), d(2), d(20), utc("2024-06-02 10:00"))
                .unwrap(),
        );
        assert_eq!(next_day.reserved, d(20));
        assert_eq!(q.counter, d(20));
        assert_eq!(q.last_reset, local("2024-06-02 00:00"));
        assert_eq!(next_day.window_identity, Some(local("2024-06-02 00:00")));
    }

    #[test]
    fn test_null_versus_denied() {
        let mut disabled = quota(0, 0, "2024-06-01 00:00");
        let outcome = disabled
            .reserve_quota(&participant(), d(1), d(5), utc("2024-06-01 10:00"))
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::Unrestricted);
        assert!(outcome.reservation().unwrap().is_null());

        let mut spent = quota(10, 10, "2024-06-01 00:00");
        let outcome = spent
            .reserve_quota(&participant(), d(1), d(5), utc("2024-06-01 10:00"))
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::Denied(QuotaDenial::Exhausted));
        assert!(outcome.reservation().is_none());
    }

    #[test]
    fn test_denial_reasons() {
        let now = utc("2024-06-01 10:00");

        let mut expired = quota(10, 0, "2024-06-01 00:00");
        expired.end_time = Some(local("2024-06-01 10:00"));
        assert_eq!(
            expired.reserve_quota(&participant(), d(1), d(1), now).unwrap(),
            ReserveOutcome::Denied(QuotaDenial::Expired)
        );

        let mut future = quota(10, 0, "2024-06-02 00:00");
        assert_eq!(
            future.reserve_quota(&participant(), d(1), d(1), now).unwrap(),
            ReserveOutcome::Denied(QuotaDenial::NotStarted)
        );
        assert_eq!(future.last_reset, local("2024-06-02 00:00"));

        let mut for_mods = quota(10, 0, "2024-06-01 00:00");
        for_mods.target = RestrictionTarget::Mod;
        assert_eq!(
            for_mods.reserve_quota(&participant(), d(1), d(1), now).unwrap(),
            ReserveOutcome::Denied(QuotaDenial::TargetMismatch)
        );

        let mut full = quota(10, 10, "2024-06-01 00:00");
        assert_eq!(
            full.reserve_quota(&participant(), d(0), d(5), now).unwrap(),
            ReserveOutcome::Denied(QuotaDenial::DegenerateLease)
        );
        assert_eq!(full.counter, d(10));
    }

    #[test]
    fn test_denials_take_precedence_over_unrestricted() {
        let mut disabled = quota(0, 0, "2024-06-01 00:00");
        disabled.target = RestrictionTarget::Creator;
        assert_eq!(
            disabled
                .reserve_quota(&participant(), d(1), d(1), utc("2024-06-01 10:00"))
                .unwrap(),
            ReserveOutcome::Denied(QuotaDenial::TargetMismatch)
        );
    }

    #[test]
    fn test_fractional_amounts() {
        let mut q = quota(10, 0, "2024-06-01 00:00");
        let lease = reserved(
            q.reserve_quota(
                &participant(),
                Decimal::new(25, 1),
                Decimal::new(75, 1),
                utc("2024-06-01 10:00"),
            )
            .unwrap(),
        );
        assert_eq!(lease.reserved, Decimal::new(75, 1));

        assert!(q.free_unused_quota(&lease, Decimal::new(31, 1)));
        assert_eq!(q.counter, Decimal::new(31, 1));
    }

    #[test]
    fn test_custom_minimum_lease() {
        let mut q = quota(10, 7, "2024-06-01 00:00");
        let outcome = q
            .reserve_quota_with_floor(&participant(), d(0), d(10), d(5), utc("2024-06-01 10:00"))
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::Denied(QuotaDenial::DegenerateLease));
    }

    #[test]
    fn test_serialized_reservations_never_exceed_quota() {
        let mut q = quota(100, 0, "2024-06-01 00:00");
        let now = utc("2024-06-01 12:00");
        let mut held = Vec::new();

        for i in 0..300_i64 {
            let min = d(i % 7);
            let max = min + d((i * 3) % 11);
            match q.reserve_quota(&participant(), min, max, now).unwrap() {
                ReserveOutcome::Reserved(reservation) => {
                    assert!(reservation.reserved >= min);
                    assert!(reservation.reserved <= max);
                    held.push(reservation);
                }
                ReserveOutcome::Denied(_) => {}
                ReserveOutcome::Unrestricted => panic!("quota is enabled"),
            }
            assert!(q.counter <= q.quota, "counter {} after step {i}", q.counter);

            if i % 4 == 0 {
                if let Some(reservation) = held.pop() {
                    let used = (reservation.reserved / d(2)).floor();
                    assert!(q.free_unused_quota(&reservation, used));
                }
            }
        }
    }

    #[test]
    fn test_round_trip_restores_counter() {
        let mut q = quota(50, 12, "2024-06-01 00:00");
        let reservation = reserved(
            q.reserve_quota(&participant(), d(3), d(10), utc("2024-06-01 08:00"))
                .unwrap(),
        );
        assert_eq!(q.counter, d(22));

        assert_eq!(q.release(&reservation, reservation.reserved), ReleaseOutcome::Applied);
        assert_eq!(q.counter, d(22));

        assert!(q.free_unused_quota(&reservation, d(0)));
        assert_eq!(q.counter, d(12));
    }

    #[test]
    fn test_overuse_is_charged_past_quota() {
        let mut q = quota(10, 0, "2024-06-01 00:00");
        let reservation = reserved(
            q.reserve_quota(&participant(), d(1), d(4), utc("2024-06-01 08:00"))
                .unwrap(),
        );
        assert!(q.free_unused_quota(&reservation, d(15)));
        assert_eq!(q.counter, d(15));

        let outcome = q
            .reserve_quota(&participant(), d(1), d(1), utc("2024-06-01 09:00"))
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::Denied(QuotaDenial::Exhausted));
    }

    #[test]
    fn test_stale_release_is_noop() {
        let mut q = quota(100, 0, "2024-06-01 00:00");
        let old = reserved(
            q.reserve_quota(&participant(), d(10), d(10), utc("2024-06-01 23:00"))
                .unwrap(),
        );

        let fresh = reserved(
            q.reserve_quota(&participant(), d(4), d(4), utc("2024-06-02 01:00"))
                .unwrap(),
        );
        assert_eq!(q.counter, d(4));

        assert_eq!(q.release(&old, d(0)), ReleaseOutcome::Stale);
        assert!(q.free_unused_quota(&old, d(0)));
        assert_eq!(q.counter, d(4));

        assert_eq!(q.release(&fresh, d(1)), ReleaseOutcome::Applied);
        assert_eq!(q.counter, d(1));
    }

    #[test]
    fn test_foreign_reservations_are_rejected() {
        let mut q = quota(100, 30, "2024-06-01 00:00");
        let foreign = QuotaReservation {
            quota_restriction_id: Some("other".to_string()),
            window_identity: Some(q.last_reset),
            reserved: d(10),
        };
        assert!(!q.free_unused_quota(&foreign, d(0)));
        assert_eq!(q.release(&QuotaReservation::null(), d(0)), ReleaseOutcome::Mismatched);
        assert_eq!(q.counter, d(30));
    }

    #[test]
    fn test_evaluate_status() {
        let q = quota(100, 40, "2024-06-01 00:00");

        let status = q.evaluate_status(&participant(), utc("2024-06-01 10:00")).unwrap();
        assert!(status.has_ended);
        assert!(status.is_still_valid());
        assert!(status.has_started);
        assert!(status.role.allowed);
        assert!(!status.quota_is_null);
        assert_eq!(status.quota_available, d(60));
        assert!(!status.blocks_access());

        let rolled = q.evaluate_status(&participant(), utc("2024-06-03 10:00")).unwrap();
        assert_eq!(rolled.quota_available, d(100));
        // Read-only: nothing was rolled over.
        assert_eq!(q.counter, d(40));
        assert_eq!(q.last_reset, local("2024-06-01 00:00"));
    }

    #[test]
    fn test_evaluate_status_expired_and_exhausted() {
        let mut q = quota(10, 10, "2024-06-01 00:00");
        let status = q.evaluate_status(&participant(), utc("2024-06-01 10:00")).unwrap();
        assert!(status.blocks_access());

        q.end_time = Some(local("2024-06-01 09:00"));
        let status = q.evaluate_status(&participant(), utc("2024-06-01 10:00")).unwrap();
        assert!(!status.has_ended);
        assert!(!status.blocks_access());

        let future = quota(10, 0, "2024-07-01 00:00");
        let status = future.evaluate_status(&participant(), utc("2024-06-01 10:00")).unwrap();
        assert!(!status.has_started);
    }

    #[test]
    fn test_invalid_configuration_is_an_error() {
        let mut q = quota(10, 0, "2024-06-01 00:00");
        q.reset_strategy = "3h".to_string();
        assert!(q.validate().is_err());
        assert!(matches!(
            q.reserve_quota(&participant(), d(1), d(1), utc("2024-06-01 10:00")),
            Err(WindowError::UnknownUnit(_))
        ));

        let mut q = quota(10, 0, "2024-06-01 00:00");
        q.timezone = "Atlantis/Capital".to_string();
        assert_eq!(
            q.validate(),
            Err(WindowError::UnknownTimezone("Atlantis/Capital".to_string()))
        );
    }

    #[test]
    fn test_rollover_in_local_timezone() {
        let mut q = quota(10, 10, "2024-03-30 00:00");
        q.timezone = "Europe/Berlin".to_string();

        // 2024-03-31 00:30 CET is still 2024-03-30 in UTC.
        let reservation = reserved(
            q.reserve_quota(&participant(), d(1), d(3), utc("2024-03-30 23:30"))
                .unwrap(),
        );
        assert_eq!(reservation.reserved, d(3));
        assert_eq!(q.last_reset, local("2024-03-31 00:00"));
        assert_eq!(
            q.current_window(utc("2024-03-30 23:30")).unwrap().end,
            utc("2024-03-31 22:00")
        );
    }

    #[test]
    fn test_monthly_rollover_skips_idle_months() {
        let mut q = quota(10, 9, "2024-01-31 00:00");
        q.reset_strategy = "1M".to_string();

        let reservation = reserved(
            q.reserve_quota(&participant(), d(1), d(1), utc("2024-04-30 12:00"))
                .unwrap(),
        );
        assert_eq!(reservation.reserved, d(1));
        assert_eq!(q.last_reset, local("2024-04-30 00:00"));
        assert_eq!(q.counter, d(1));
    }

    #[test]
    fn test_monthly_windows_keep_the_original_day() {
        let mut q = quota(10, 10, "2024-01-31 00:00");
        q.reset_strategy = "1M".to_string();

        let march = reserved(
            q.reserve_quota(&participant(), d(10), d(10), utc("2024-03-01 12:00"))
                .unwrap(),
        );
        assert_eq!(march.window_identity, Some(local("2024-02-29 00:00")));
        assert_eq!(q.reset_anchor, Some(local("2024-01-31 00:00")));

        // The February window runs until Mar 31, not Mar 29.
        let early = q
            .reserve_quota(&participant(), d(1), d(1), utc("2024-03-30 12:00"))
            .unwrap();
        assert_eq!(early, ReserveOutcome::Denied(QuotaDenial::Exhausted));
        assert_eq!(q.last_reset, local("2024-02-29 00:00"));
        assert_eq!(
            q.current_window(utc("2024-03-30 12:00")).unwrap().end,
            utc("2024-03-31 00:00")
        );

        let status = q.evaluate_status(&participant(), utc("2024-03-30 12:00")).unwrap();
        assert_eq!(status.quota_available, d(0));

        let due = reserved(
            q.reserve_quota(&participant(), d(1), d(1), utc("2024-03-31 00:00"))
                .unwrap(),
        );
        assert_eq!(due.window_identity, Some(local("2024-03-31 00:00")));
        assert_eq!(q.reset_anchor, Some(local("2024-01-31 00:00")));
    }

    #[test]
    fn test_extreme_amounts_do_not_overflow() {
        let now = utc("2024-06-01 10:00");

        let mut nearly_full = quota(0, 1, "2024-06-01 00:00");
        nearly_full.quota = Decimal::MAX;
        assert_eq!(
            nearly_full
                .reserve_quota(&participant(), Decimal::MAX, Decimal::MAX, now)
                .unwrap(),
            ReserveOutcome::Denied(QuotaDenial::Exhausted)
        );
        assert_eq!(nearly_full.counter, d(1));

        let mut empty = quota(0, 0, "2024-06-01 00:00");
        empty.quota = Decimal::MAX;
        let lease = reserved(
            empty
                .reserve_quota(&participant(), d(1), Decimal::MAX, now)
                .unwrap(),
        );
        assert_eq!(lease.reserved, Decimal::MAX);
        assert_eq!(empty.counter, Decimal::MAX);

        let mut wide = quota(10, 0, "2024-06-01 00:00");
        let lease = reserved(
            wide.reserve_quota(&participant(), d(1), Decimal::MIN, now)
                .unwrap(),
        );
        assert_eq!(lease.reserved, d(1));

        // Overuse at the top of the range saturates instead of panicking.
        let overuse = lease_for(&empty, d(0));
        assert_eq!(empty.release(&overuse, Decimal::MAX), ReleaseOutcome::Applied);
        assert_eq!(empty.counter, Decimal::MAX);

        let refund = lease_for(&empty, Decimal::MAX);
        assert_eq!(empty.release(&refund, Decimal::MIN), ReleaseOutcome::Applied);
        assert_eq!(empty.counter, d(0));
    }

    fn lease_for(q: &QuotaRestriction, reserved: Decimal) -> QuotaReservation {
        QuotaReservation {
            quota_restriction_id: Some(q.id.clone()),
            window_identity: Some(q.last_reset),
            reserved,
        }
    }
}
