//! Snapshot → target mutation translation.
//!
//! Rules apply in order and later rules may override the status set by
//! earlier ones:
//!
//! 1. `title`/`notes` copy `content`/`description`.
//! 2. A due date sets `due` (midnight UTC of its date component) and
//!    `status = needsAction`. Time of day is dropped.
//! 3. A checked task sets `completed` (from `completed_at`, else `now`) and
//!    `status = completed`. A blank `completed_at` counts as missing.
//! 4. A deleted task sets `deleted = true`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::model::{TargetTaskMutation, TaskSnapshot, TaskStatus};

/// Translate a source snapshot into a target mutation.
///
/// Pure: `now` is only read when the snapshot is checked and carries no
/// usable `completed_at`.
#[must_use]
pub fn translate(snapshot: &TaskSnapshot, now: DateTime<Utc>) -> TargetTaskMutation {
    let mut mutation = TargetTaskMutation {
        title: snapshot.content.clone(),
        notes: snapshot.description.clone(),
        ..TargetTaskMutation::default()
    };

    if let Some(due) = &snapshot.due {
        mutation.due = due_at_midnight(&due.date);
        mutation.status = Some(TaskStatus::NeedsAction);
    }

    if snapshot.checked {
        let completed_at = snapshot
            .completed_at
            .as_deref()
            .filter(|raw| !raw.trim().is_empty());
        mutation.completed = Some(match completed_at {
            Some(raw) => normalize_timestamp(raw),
            None => iso_millis(now),
        });
        mutation.status = Some(TaskStatus::Completed);
    }

    if snapshot.is_deleted {
        mutation.deleted = Some(true);
    }

    mutation
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Midnight UTC of the `YYYY-MM-DD` prefix, or `None` when it doesn't parse.
fn due_at_midnight(raw: &str) -> Option<String> {
    let date = raw.get(..10)?;
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let midnight = day.and_hms_opt(0, 0, 0)?.and_utc();
    Some(iso_millis(midnight))
}

/// Re-render an RFC 3339 timestamp in UTC; unparseable input passes through.
fn normalize_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map_or_else(|_| raw.to_string(), |at| iso_millis(at.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Due;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    fn snapshot() -> TaskSnapshot {
        TaskSnapshot {
            id: "src-1".to_string(),
            checked: false,
            content: "Buy milk".to_string(),
            description: "2%".to_string(),
            due: None,
            completed_at: None,
            is_deleted: false,
        }
    }

    #[test]
    fn plain_task_sets_only_title_and_notes() {
        let mutation = translate(&snapshot(), fixed_now());
        assert_eq!(
            mutation,
            TargetTaskMutation {
                title: "Buy milk".to_string(),
                notes: "2%".to_string(),
                ..TargetTaskMutation::default()
            }
        );
    }

    #[test]
    fn due_date_becomes_iso_midnight() {
        let task = TaskSnapshot {
            due: Some(Due {
                date: "2024-01-15".to_string(),
                is_recurring: false,
            }),
            ..snapshot()
        };
        let mutation = translate(&task, fixed_now());
        assert_eq!(mutation.due.as_deref(), Some("2024-01-15T00:00:00.000Z"));
        assert_eq!(mutation.status, Some(TaskStatus::NeedsAction));
        assert!(mutation.completed.is_none());
    }

    #[test]
    fn due_datetime_drops_time_of_day() {
        let task = TaskSnapshot {
            due: Some(Due {
                date: "2024-01-15T18:45:00".to_string(),
                is_recurring: true,
            }),
            ..snapshot()
        };
        let mutation = translate(&task, fixed_now());
        assert_eq!(mutation.due.as_deref(), Some("2024-01-15T00:00:00.000Z"));
    }

    #[test]
    fn unparseable_due_keeps_status_but_omits_date() {
        let task = TaskSnapshot {
            due: Some(Due {
                date: "someday".to_string(),
                is_recurring: false,
            }),
            ..snapshot()
        };
        let mutation = translate(&task, fixed_now());
        assert!(mutation.due.is_none());
        assert_eq!(mutation.status, Some(TaskStatus::NeedsAction));
    }

    #[test]
    fn completion_overrides_due_status() {
        let task = TaskSnapshot {
            checked: true,
            completed_at: Some("2024-01-16T08:15:30.123456Z".to_string()),
            due: Some(Due {
                date: "2024-01-15".to_string(),
                is_recurring: false,
            }),
            ..snapshot()
        };
        let mutation = translate(&task, fixed_now());
        assert_eq!(mutation.status, Some(TaskStatus::Completed));
        assert_eq!(mutation.completed.as_deref(), Some("2024-01-16T08:15:30.123Z"));
        assert_eq!(mutation.due.as_deref(), Some("2024-01-15T00:00:00.000Z"));
    }

    #[test]
    fn missing_completed_at_falls_back_to_now() {
        let task = TaskSnapshot {
            checked: true,
            ..snapshot()
        };
        let mutation = translate(&task, fixed_now());
        assert_eq!(mutation.completed.as_deref(), Some("2024-03-01T12:30:00.000Z"));
    }

    #[test]
    fn blank_completed_at_falls_back_to_now() {
        for raw in ["", "  "] {
            let task = TaskSnapshot {
                checked: true,
                completed_at: Some(raw.to_string()),
                ..snapshot()
            };
            let mutation = translate(&task, fixed_now());
            assert_eq!(
                mutation.completed.as_deref(),
                Some("2024-03-01T12:30:00.000Z"),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn offset_timestamps_are_rendered_in_utc() {
        let task = TaskSnapshot {
            checked: true,
            completed_at: Some("2024-01-16T10:00:00+02:00".to_string()),
            ..snapshot()
        };
        let mutation = translate(&task, fixed_now());
        assert_eq!(mutation.completed.as_deref(), Some("2024-01-16T08:00:00.000Z"));
    }

    #[test]
    fn deleted_flag_propagates() {
        let task = TaskSnapshot {
            is_deleted: true,
            checked: true,
            ..snapshot()
        };
        let mutation = translate(&task, fixed_now());
        assert_eq!(mutation.deleted, Some(true));
        assert_eq!(mutation.status, Some(TaskStatus::Completed));
    }

    fn arb_snapshot() -> impl Strategy<Value = TaskSnapshot> {
        (
            any::<bool>(),
            ".{0,24}",
            ".{0,24}",
            proptest::option::of((2000i32..2100, 1u32..=12, 1u32..=28)),
            proptest::option::of(0i64..4_000_000_000),
            any::<bool>(),
        )
            .prop_map(|(checked, content, description, due, completed, is_deleted)| {
                TaskSnapshot {
                    id: "src".to_string(),
                    checked,
                    content,
                    description,
                    due: due.map(|(y, m, d)| Due {
                        date: format!("{y:04}-{m:02}-{d:02}"),
                        is_recurring: false,
                    }),
                    completed_at: completed.and_then(|secs| {
                        DateTime::from_timestamp(secs, 0).map(|at| at.to_rfc3339())
                    }),
                    is_deleted,
                }
            })
    }

    proptest! {
        #[test]
        fn translate_is_deterministic(task in arb_snapshot()) {
            let first = translate(&task, fixed_now());
            let second = translate(&task, fixed_now());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn now_only_matters_without_completed_at(task in arb_snapshot()) {
            let later = fixed_now() + chrono::Duration::days(3);
            let a = translate(&task, fixed_now());
            let b = translate(&task, later);
            if task.checked && task.completed_at.is_none() {
                prop_assert_ne!(a.completed, b.completed);
            } else {
                prop_assert_eq!(a, b);
            }
        }
    }
}
