use crate::data::{
    attendance::{AttendanceRecord, AttendanceStatus},
    progress::ProgressRecord,
};
use jiff::{ToSpan, civil::Date};
use serde::Serialize;

pub const SHORT_WINDOW_DAYS: i64 = 30;
pub const LONG_WINDOW_DAYS: i64 = 60;
pub const PROGRESS_CHART_POINTS: usize = 10;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub present: u32,
    pub absent: u32,
}

///first day of a window ending (inclusively) on `today`
pub fn window_start(today: Date, window_days: i64) -> Date {
    today.saturating_sub(window_days.max(0).days())
}

impl AttendanceSummary {
    ///counts records dated within `[today - window_days, today]`, anything after `today` is ignored
    pub fn over_window<'a>(
        records: impl IntoIterator<Item = &'a AttendanceRecord>,
        today: Date,
        window_days: i64,
    ) -> Self {
        let start = window_start(today, window_days);

        records
            .into_iter()
            .filter(|record| record.date >= start && record.date <= today)
            .fold(Self::default(), |mut acc, record| {
                match record.status {
                    AttendanceStatus::Present => acc.present += 1,
                    AttendanceStatus::Absent => acc.absent += 1,
                }
                acc
            })
    }

    pub const fn marked(&self) -> u32 {
        self.present + self.absent
    }

    ///0 when nothing was marked
    pub fn percentage(&self) -> f64 {
        let marked = self.marked();
        if marked == 0 {
            return 0.0;
        }
        f64::from(self.present) / f64::from(marked) * 100.0
    }
}

pub fn round_2dp(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

///mean of the record percentages, 0 when there aren't any
pub fn average_mark_percentage<'a>(
    records: impl IntoIterator<Item = &'a ProgressRecord>,
    subject: Option<&str>,
) -> f64 {
    let (sum, count) = records
        .into_iter()
        .filter(|record| subject.is_none_or(|subject| record.subject == subject))
        .fold((0.0, 0_u32), |(sum, count), record| {
            (sum + record.percentage, count + 1)
        });

    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries<T> {
    pub labels: Vec<String>,
    pub data: Vec<T>,
}

///one point per marked day in the last month, oldest first. 1 is present, 0 is absent
pub fn attendance_series(records: &[AttendanceRecord], today: Date) -> ChartSeries<u8> {
    let start = window_start(today, SHORT_WINDOW_DAYS);
    let mut in_window: Vec<_> = records
        .iter()
        .filter(|record| record.date >= start && record.date <= today)
        .collect();
    in_window.sort_by_key(|record| record.date);

    ChartSeries {
        labels: in_window.iter().map(|r| r.date.to_string()).collect(),
        data: in_window
            .iter()
            .map(|r| u8::from(r.status.is_present()))
            .collect(),
    }
}

///the earliest few assignments by date
pub fn progress_series(records: &[ProgressRecord]) -> ChartSeries<f64> {
    let mut sorted: Vec<_> = records.iter().collect();
    sorted.sort_by_key(|record| (record.date, record.created_at));
    sorted.truncate(PROGRESS_CHART_POINTS);

    ChartSeries {
        labels: sorted.iter().map(|r| r.assignment_name.clone()).collect(),
        data: sorted.iter().map(|r| round_2dp(r.percentage)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::{Timestamp, civil::date};
    use rand::Rng;
    use uuid::Uuid;

    fn attendance(day: Date, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            date: day,
            status,
            remarks: None,
            marked_by: None,
            marked_at: Timestamp::UNIX_EPOCH,
        }
    }

    fn progress(day: Date, subject: &str, name: &str, percentage: f64) -> ProgressRecord {
        ProgressRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            teacher_id: None,
            subject: subject.to_string(),
            assignment_name: name.to_string(),
            marks_obtained: percentage,
            total_marks: 100.0,
            percentage,
            comments: None,
            date: day,
            created_at: Timestamp::UNIX_EPOCH,
        }
    }

    #[test]
    fn nothing_marked_is_zero_percent() {
        let summary = AttendanceSummary::over_window(&[], date(2025, 3, 31), 30);
        assert_eq!(summary.marked(), 0);
        assert!(summary.percentage().abs() < f64::EPSILON);
    }

    #[test]
    fn window_is_inclusive_at_both_ends_and_ignores_the_future() {
        let today = date(2025, 3, 31);
        let records = vec![
            attendance(date(2025, 3, 1), AttendanceStatus::Present),
            attendance(date(2025, 2, 28), AttendanceStatus::Absent),
            attendance(today, AttendanceStatus::Absent),
            attendance(date(2025, 4, 1), AttendanceStatus::Absent),
        ];

        let summary = AttendanceSummary::over_window(&records, today, 30);
        assert_eq!(
            summary,
            AttendanceSummary {
                present: 1,
                absent: 1
            }
        );
        assert!((summary.percentage() - 50.0).abs() < f64::EPSILON);

        let wider = AttendanceSummary::over_window(&records, today, 60);
        assert_eq!(wider.marked(), 3);
    }

    #[test]
    fn percentage_stays_within_bounds_for_random_registers() {
        let mut rng = rand::rng();
        let today = date(2025, 6, 30);

        for _ in 0..200 {
            let n = rng.random_range(0..120);
            let records: Vec<_> = (0..n)
                .map(|_| {
                    let offset: i64 = rng.random_range(-10..90);
                    let status = if rng.random_bool(0.5) {
                        AttendanceStatus::Present
                    } else {
                        AttendanceStatus::Absent
                    };
                    attendance(today.saturating_sub(offset.days()), status)
                })
                .collect();

            for window in [0, 1, SHORT_WINDOW_DAYS, LONG_WINDOW_DAYS] {
                let pct = AttendanceSummary::over_window(&records, today, window).percentage();
                assert!((0.0..=100.0).contains(&pct), "{pct} out of range");
            }
        }
    }

    #[test]
    fn averages_can_be_filtered_by_subject() {
        let day = date(2025, 3, 3);
        let records = vec![
            progress(day, "Maths", "a", 80.0),
            progress(day, "Maths", "b", 60.0),
            progress(day, "Art", "c", 100.0),
        ];

        assert!((average_mark_percentage(&records, None) - 80.0).abs() < 1e-9);
        assert!((average_mark_percentage(&records, Some("Maths")) - 70.0).abs() < 1e-9);
        assert!(average_mark_percentage(&records, Some("PE")).abs() < f64::EPSILON);
        assert!(average_mark_percentage(&[], None).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert!((round_2dp(66.666_666) - 66.67).abs() < 1e-9);
        assert!((round_2dp(12.344) - 12.34).abs() < 1e-9);
    }

    #[test]
    fn attendance_chart_is_chronological_and_binary() {
        let today = date(2025, 3, 31);
        let records = vec![
            attendance(date(2025, 3, 30), AttendanceStatus::Absent),
            attendance(date(2025, 3, 29), AttendanceStatus::Present),
            attendance(date(2025, 1, 1), AttendanceStatus::Present),
        ];

        let series = attendance_series(&records, today);
        assert_eq!(series.labels, vec!["2025-03-29", "2025-03-30"]);
        assert_eq!(series.data, vec![1, 0]);
    }

    #[test]
    fn progress_chart_takes_the_earliest_ten() {
        let records: Vec<_> = (1..=12)
            .rev()
            .map(|day| progress(date(2025, 3, day), "Maths", &format!("quiz {day}"), 50.0))
            .collect();

        let series = progress_series(&records);
        assert_eq!(series.labels.len(), PROGRESS_CHART_POINTS);
        assert_eq!(series.labels[0], "quiz 1");
        assert_eq!(series.labels[9], "quiz 10");
    }
}
