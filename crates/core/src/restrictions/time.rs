//! Recurring or one-off time windows.

use super::actor::ActorContext;
use super::target::{RestrictionTarget, RoleCheck};
use super::window::{PeriodStrategy, Window, local_now, parse_timezone};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Limits matching actors to a time window.
///
/// `start_time` and `end_time` are wall-clock times in `timezone`. Without a
/// usable `repeat_strategy` the window happens once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRestriction {
    pub id: String,
    pub restriction_set_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub target: RestrictionTarget,
    pub repeat_strategy: Option<String>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Facts about a time restriction for one actor at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRestrictionStatus {
    pub not_started: bool,
    pub role: RoleCheck,
    pub is_in_time: bool,
}

impl TimeRestrictionStatus {
    /// Whether the restriction leaves the actor's access intact.
    ///
    /// Actors outside the target are unaffected; targeted actors need the
    /// restriction to have started and `now` to be in time.
    #[must_use]
    pub const fn permits_access(&self) -> bool {
        !self.role.allowed || (!self.not_started && self.is_in_time)
    }
}

impl TimeRestriction {
    /// Evaluate the restriction for `actor` at `now`.
    ///
    /// For recurring restrictions `is_in_time` compares `now` against the
    /// resolved starts of both the start and the end anchor.
    #[must_use]
    pub fn evaluate(&self, actor: &ActorContext, now: DateTime<Utc>) -> TimeRestrictionStatus {
        let (tz, windows) = match parse_timezone(&self.timezone) {
            Ok(tz) => (tz, self.resolve(tz, now)),
            Err(err) => {
                warn!(id = %self.id, error = %err, "Evaluating time restriction as a one-off UTC window");
                (Tz::UTC, None)
            }
        };
        let now_local = local_now(tz, now);

        let is_in_time = match windows.as_deref() {
            Some([start, end, ..]) => start.start <= now && now <= end.start,
            _ => self.start_time <= now_local && now_local <= self.end_time,
        };

        TimeRestrictionStatus {
            not_started: self.start_time > now_local,
            role: RoleCheck::evaluate(self.target, actor),
            is_in_time,
        }
    }

    /// Parsed repeat strategy, `None` for one-off restrictions.
    #[must_use]
    pub fn strategy(&self) -> Option<PeriodStrategy> {
        let raw = self.repeat_strategy.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse() {
            Ok(strategy) => Some(strategy),
            Err(err) => {
                warn!(id = %self.id, strategy = raw, error = %err, "Unusable repeat strategy, treating as one-off");
                None
            }
        }
    }

    fn resolve(&self, tz: Tz, now: DateTime<Utc>) -> Option<Vec<Window>> {
        let strategy = self.strategy()?;
        match strategy.resolve(&[self.start_time, self.end_time], tz, now) {
            Ok(windows) => Some(windows),
            Err(err) => {
                warn!(id = %self.id, error = %err, "Failed to resolve time restriction windows");
                None
            }
        }
    }
}
