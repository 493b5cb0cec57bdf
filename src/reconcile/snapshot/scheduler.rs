// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! When should the next snapshot be taken?

use crate::error::ReconcileError;
use crate::store::Store;
use crate::types::v1alpha1::snapshot::ScheduledVolumeSnapshot;
use crate::types::v1alpha1::status::snapshot::Status;
use crate::types::volume_snapshot::VolumeSnapshot;
use crate::utils::time::to_datetime;
use chrono::{DateTime, Utc};
use cron::Schedule;
use snafu::Snafu;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid schedule {:?}: {}", expression, reason))]
    InvalidSchedule { expression: String, reason: String },

    #[snafu(display("schedule {:?} has no future occurrence", expression))]
    NeverFires { expression: String },
}

fn invalid(expression: &str, reason: impl ToString) -> Error {
    Error::InvalidSchedule {
        expression: expression.to_owned(),
        reason: reason.to_string(),
    }
}

/// Maps one standard day-of-week number (0-7, Sunday = 0 or 7) onto the
/// 1-7 (Sunday = 1) numbering the cron parser expects. Names pass through.
fn shift_weekday(token: &str) -> Result<String, String> {
    match token.parse::<u8>() {
        Ok(n @ 0..=6) => Ok((n + 1).to_string()),
        Ok(7) => Ok("1".to_owned()),
        Ok(n) => Err(format!("day of week {n} out of range")),
        Err(_) => Ok(token.to_owned()),
    }
}

fn shift_weekday_field(field: &str) -> Result<String, String> {
    let mut parts = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };
        let shifted = match range.split_once('-') {
            // Sunday as 7 closes the week; wrap it around to the front.
            Some((start, "7")) if step.is_none() && start != "7" => {
                let start = shift_weekday(start)?;
                if start == "1" {
                    "1-7".to_owned()
                } else {
                    format!("{start}-7,1")
                }
            }
            Some((_, "7")) => return Err("ranges ending in 7 cannot take a step".to_owned()),
            Some((start, end)) => format!("{}-{}", shift_weekday(start)?, shift_weekday(end)?),
            None if range == "*" || range == "?" => range.to_owned(),
            None => shift_weekday(range)?,
        };
        parts.push(match step {
            Some(step) => format!("{shifted}/{step}"),
            None => shifted,
        });
    }
    Ok(parts.join(","))
}

/// A parsed cron expression.
///
/// A five-field expression that restricts both day of month and day of week
/// fires on days matching either field, as cron does. The parser ANDs the two,
/// so such an expression is held as one schedule per day field and the
/// earliest occurrence wins.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedules: Vec<Schedule>,
}

impl CronSchedule {
    /// First occurrence strictly after `reference`.
    pub fn next_after(&self, reference: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(reference).next())
            .min()
    }
}

/// A day field starting with `*` does not restrict the day.
fn restricts_day(field: &str) -> bool {
    !(field.starts_with('*') || field == "?")
}

/// Parses a five-field cron expression (minute hour day-of-month month
/// day-of-week). Six and seven field expressions with a leading seconds
/// column are passed to the parser unchanged.
pub fn parse_schedule(expression: &str) -> Result<CronSchedule, Error> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => {
            let (minute, hour, day, month) = (fields[0], fields[1], fields[2], fields[3]);
            let weekday = shift_weekday_field(fields[4]).map_err(|e| invalid(expression, e))?;
            if restricts_day(day) && restricts_day(&weekday) {
                vec![
                    format!("0 {minute} {hour} {day} {month} *"),
                    format!("0 {minute} {hour} * {month} {weekday}"),
                ]
            } else {
                vec![format!("0 {minute} {hour} {day} {month} {weekday}")]
            }
        }
        6 | 7 => vec![fields.join(" ")],
        n => return Err(invalid(expression, format!("expected 5 fields, found {n}"))),
    };

    let schedules = normalized
        .iter()
        .map(|n| Schedule::from_str(n).map_err(|e| invalid(expression, e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CronSchedule { schedules })
}

/// Time left until the first occurrence strictly after `reference`, or zero
/// if that occurrence has already passed.
pub fn duration_until_next(
    schedule: &CronSchedule,
    expression: &str,
    reference: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Duration, Error> {
    let next = schedule
        .next_after(&reference)
        .ok_or_else(|| Error::NeverFires {
            expression: expression.to_owned(),
        })?;
    Ok((next - now).to_std().unwrap_or(Duration::ZERO))
}

/// Decides how long to wait before the next snapshot; zero means take it now.
///
/// While the last snapshot is not ready yet, `poll` is returned instead and
/// `status.last_snapshot` is refreshed from the cluster. A last snapshot that
/// no longer exists is treated as complete.
pub async fn calc_next<S: Store>(
    store: &S,
    svs: &ScheduledVolumeSnapshot,
    status: &mut Status,
    now: DateTime<Utc>,
    poll: Duration,
) -> Result<Duration, ReconcileError> {
    let expression = svs.spec.schedule.as_str();
    let schedule = parse_schedule(expression).map_err(ReconcileError::unrecoverable)?;

    if let Some(last) = status.last_snapshot.as_mut()
        && !last.is_ready()
    {
        let namespace = svs
            .fullnode_namespace()
            .map_err(ReconcileError::unrecoverable)?;
        match store
            .get_opt::<VolumeSnapshot>(&last.name, &namespace)
            .await
            .map_err(ReconcileError::transient)?
        {
            None => {
                // The snapshot vanished while we were polling it. Rather than
                // block the schedule forever, count it as done.
                warn!(
                    "volumesnapshot {} disappeared before becoming ready, treating it as complete",
                    last.name
                );
            }
            Some(snapshot) => {
                last.status = snapshot.status.clone();
                if !snapshot.is_ready() {
                    debug!("volumesnapshot {} is not ready yet", last.name);
                    return Ok(poll);
                }
            }
        }
    }

    let reference = match &status.last_snapshot {
        Some(last) => to_datetime(&last.started_at),
        None => svs
            .metadata
            .creation_timestamp
            .as_ref()
            .and_then(to_datetime),
    }
    .unwrap_or(now);

    duration_until_next(&schedule, expression, reference, now).map_err(ReconcileError::unrecoverable)
}
