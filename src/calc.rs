//! Pure aggregation over rows already loaded from the store.

use serde::Serialize;
use std::cmp::Ordering;

use crate::repo::attendance::AttendanceStatus;
use crate::repo::grades::{Grade, Semester, Subject};
use crate::repo::payments::Payment;

pub const GRADE_MAX: f64 = 20.0;

/// Half-away-from-zero rounding to 2 decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn clamp_grade(x: f64) -> f64 {
    x.clamp(0.0, GRADE_MAX)
}

/// `(d1 + d2 + comp) / 3`; a missing component counts as 0.
pub fn subject_mean(devoir1: Option<f64>, devoir2: Option<f64>, composition: Option<f64>) -> f64 {
    (devoir1.unwrap_or(0.0) + devoir2.unwrap_or(0.0) + composition.unwrap_or(0.0)) / 3.0
}

/// Σ(mean × coef) / Σcoef, or `None` when the coefficients sum to 0.
pub fn weighted_average<I>(items: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut weighted = 0.0;
    let mut sum_coef = 0.0;
    for (mean, coef) in items {
        weighted += mean * coef;
        sum_coef += coef;
    }
    if sum_coef <= 0.0 {
        return None;
    }
    Some(round2(clamp_grade(weighted / sum_coef)))
}

/// Average of one student for one class/semester configuration. Only
/// subjects listing the student take part; a subject with no grade row
/// contributes a mean of 0.
pub fn student_average(
    subjects: &[Subject],
    grades: &[Grade],
    student_id: &str,
    class_id: &str,
    semester: Semester,
) -> Option<f64> {
    let items = subjects.iter().filter(|s| s.takes(student_id)).map(|s| {
        let g = grades.iter().find(|g| {
            g.student_id == student_id
                && g.subject_id == s.id
                && g.class_id == class_id
                && g.semester == semester
        });
        let mean = match g {
            Some(g) => subject_mean(g.devoir1, g.devoir2, g.composition),
            None => 0.0,
        };
        (mean, s.coefficient)
    });
    weighted_average(items)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub student_id: String,
    pub name: String,
    pub average: Option<f64>,
    pub rank: Option<usize>,
}

/// Orders by descending average, `None` last, ties by name. Equal averages
/// share a rank and the next rank skips (1, 2, 2, 4).
pub fn class_ranking(entries: Vec<(String, String, Option<f64>)>) -> Vec<RankedStudent> {
    let mut rows: Vec<RankedStudent> = entries
        .into_iter()
        .map(|(student_id, name, average)| RankedStudent {
            student_id,
            name,
            average,
            rank: None,
        })
        .collect();

    rows.sort_by(|a, b| {
        let by_avg = match (a.average, b.average) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_avg.then_with(|| a.name.cmp(&b.name))
    });

    let mut prev: Option<f64> = None;
    let mut prev_rank = 0;
    for (i, row) in rows.iter_mut().enumerate() {
        let Some(avg) = row.average else {
            continue;
        };
        let rank = if prev == Some(avg) { prev_rank } else { i + 1 };
        row.rank = Some(rank);
        prev = Some(avg);
        prev_rank = rank;
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearAverages {
    pub premier: Option<f64>,
    pub deuxieme: Option<f64>,
    pub overall: Option<f64>,
}

/// Overall is the plain mean of whichever semester averages exist.
pub fn year_averages(premier: Option<f64>, deuxieme: Option<f64>) -> YearAverages {
    let vals: Vec<f64> = [premier, deuxieme].into_iter().flatten().collect();
    let overall = if vals.is_empty() {
        None
    } else {
        Some(round2(vals.iter().sum::<f64>() / vals.len() as f64))
    };
    YearAverages {
        premier,
        deuxieme,
        overall,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentStatus {
    #[serde(rename = "Payé")]
    Paid,
    #[serde(rename = "Partiel")]
    Partial,
    #[serde(rename = "Non payé")]
    Unpaid,
}

pub fn payment_status(due: i64, paid: i64) -> PaymentStatus {
    if paid >= due {
        PaymentStatus::Paid
    } else if paid > 0 {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Unpaid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidSum {
    pub total: i64,
    pub last: Option<Payment>,
}

/// Total of the given payments and the most recent one by date.
pub fn sum_paid(payments: &[Payment]) -> PaidSum {
    let total = payments.iter().fold(0i64, |acc, p| acc.saturating_add(p.amount));
    let last = payments
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.date.cmp(&b.date).then(ia.cmp(ib)))
        .map(|(_, p)| p.clone());
    PaidSum { total, last }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStanding {
    pub due: i64,
    pub paid: i64,
    pub remaining: i64,
    pub status: PaymentStatus,
    pub last: Option<Payment>,
}

pub fn payment_standing(due: i64, payments: &[Payment]) -> PaymentStanding {
    let PaidSum { total, last } = sum_paid(payments);
    PaymentStanding {
        due,
        paid: total,
        remaining: due.saturating_sub(total).max(0),
        status: payment_status(due, total),
        last,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub present: usize,
    pub absent: usize,
    pub retard: usize,
    pub renvoi: usize,
}

impl AttendanceCounts {
    pub fn total(&self) -> usize {
        self.present + self.absent + self.retard + self.renvoi
    }

    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.retard += 1,
            AttendanceStatus::Expelled => self.renvoi += 1,
        }
    }

    /// Whole-number percentages of the total; all 0 when empty.
    pub fn percentages(&self) -> AttendancePercentages {
        let total = self.total();
        let pct = |n: usize| {
            if total == 0 {
                0
            } else {
                ((n as f64 / total as f64) * 100.0).round() as u32
            }
        };
        AttendancePercentages {
            present: pct(self.present),
            absent: pct(self.absent),
            retard: pct(self.retard),
            renvoi: pct(self.renvoi),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePercentages {
    pub present: u32,
    pub absent: u32,
    pub retard: u32,
    pub renvoi: u32,
}

pub fn count_attendance<I>(statuses: I) -> AttendanceCounts
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut counts = AttendanceCounts::default();
    for s in statuses {
        counts.add(s);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::payments::PaymentType;

    fn subject(id: &str, coef: f64, students: &[&str]) -> Subject {
        Subject {
            id: id.to_string(),
            name: id.to_uppercase(),
            coefficient: coef,
            is_optional: false,
            language_type: None,
            student_ids: students.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn grade(student: &str, subject: &str, d1: f64, d2: f64, comp: f64) -> Grade {
        Grade {
            id: format!("{}-{}", student, subject),
            student_id: student.to_string(),
            subject_id: subject.to_string(),
            class_id: "c1".to_string(),
            semester: Semester::Premier,
            devoir1: Some(d1),
            devoir2: Some(d2),
            composition: Some(comp),
            created_at: String::new(),
        }
    }

    fn payment(amount: i64, date: &str) -> Payment {
        Payment {
            id: date.to_string(),
            student_id: "s1".to_string(),
            kind: PaymentType::Mensualite,
            class_id: Some("6a".to_string()),
            month: Some("01".to_string()),
            item_id: None,
            method: Some("especes".to_string()),
            amount,
            date: date.to_string(),
        }
    }

    #[test]
    fn subject_mean_treats_missing_components_as_zero() {
        assert_eq!(subject_mean(Some(12.0), Some(15.0), Some(18.0)), 15.0);
        assert_eq!(subject_mean(Some(12.0), None, None), 4.0);
        assert_eq!(subject_mean(None, None, None), 0.0);
    }

    #[test]
    fn weighted_average_is_none_without_coefficients() {
        assert_eq!(weighted_average(Vec::<(f64, f64)>::new()), None);
        assert_eq!(weighted_average(vec![(14.0, 0.0)]), None);
        assert_eq!(weighted_average(vec![(10.0, 1.0), (16.0, 2.0)]), Some(14.0));
    }

    #[test]
    fn weighted_average_rounds_to_two_decimals() {
        // (10*1 + 11*2) / 3 = 10.666..
        assert_eq!(weighted_average(vec![(10.0, 1.0), (11.0, 2.0)]), Some(10.67));
    }

    #[test]
    fn student_average_only_counts_subjects_listing_the_student() {
        let subjects = vec![
            subject("math", 4.0, &["s1", "s2"]),
            subject("fr", 2.0, &["s1"]),
            subject("lv2", 1.0, &["s2"]),
        ];
        let grades = vec![
            grade("s1", "math", 12.0, 14.0, 16.0),
            grade("s1", "fr", 9.0, 9.0, 9.0),
            grade("s1", "lv2", 20.0, 20.0, 20.0),
        ];
        // (14*4 + 9*2) / 6
        let avg = student_average(&subjects, &grades, "s1", "c1", Semester::Premier);
        assert_eq!(avg, Some(12.33));

        // s2 has no grades: every subject mean is 0.
        let avg = student_average(&subjects, &grades, "s2", "c1", Semester::Premier);
        assert_eq!(avg, Some(0.0));

        let avg = student_average(&subjects, &grades, "s3", "c1", Semester::Premier);
        assert_eq!(avg, None);
    }

    #[test]
    fn student_average_ignores_other_semesters() {
        let subjects = vec![subject("math", 1.0, &["s1"])];
        let mut g = grade("s1", "math", 18.0, 18.0, 18.0);
        g.semester = Semester::Deuxieme;
        let avg = student_average(&subjects, &[g], "s1", "c1", Semester::Premier);
        assert_eq!(avg, Some(0.0));
    }

    #[test]
    fn ranking_sorts_descending_with_shared_ranks() {
        let rows = class_ranking(vec![
            ("a".into(), "Awa Diop".into(), Some(12.5)),
            ("b".into(), "Binta Fall".into(), None),
            ("c".into(), "Cheikh Ba".into(), Some(15.0)),
            ("d".into(), "Aminata Sy".into(), Some(12.5)),
        ]);
        let order: Vec<&str> = rows.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(order, vec!["c", "d", "a", "b"]);
        let ranks: Vec<Option<usize>> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![Some(1), Some(2), Some(2), None]);
    }

    #[test]
    fn year_averages_mean_of_present_semesters() {
        let y = year_averages(Some(12.0), None);
        assert_eq!(y.overall, Some(12.0));
        let y = year_averages(Some(12.0), Some(13.25));
        assert_eq!(y.overall, Some(12.63));
        assert_eq!(year_averages(None, None).overall, None);
    }

    #[test]
    fn mensualite_status_follows_paid_against_due() {
        let due = 15000;

        let two = vec![payment(15000, "2024-10-02"), payment(15000, "2024-10-20")];
        let s = payment_standing(due, &two);
        assert_eq!(s.status, PaymentStatus::Paid);
        assert_eq!(s.remaining, 0);
        assert_eq!(s.paid, 30000);

        let one = vec![payment(7000, "2024-10-02")];
        let s = payment_standing(due, &one);
        assert_eq!(s.status, PaymentStatus::Partial);
        assert_eq!(s.remaining, 8000);

        let s = payment_standing(due, &[]);
        assert_eq!(s.status, PaymentStatus::Unpaid);
        assert_eq!(s.remaining, 15000);
        assert!(s.last.is_none());
    }

    #[test]
    fn sum_paid_reports_latest_transaction() {
        let list = vec![
            payment(1000, "2024-11-05"),
            payment(2000, "2024-12-01"),
            payment(3000, "2024-10-01"),
        ];
        let sum = sum_paid(&list);
        assert_eq!(sum.total, 6000);
        assert_eq!(sum.last.map(|p| p.amount), Some(2000));
    }

    #[test]
    fn huge_sums_saturate_instead_of_overflowing() {
        let list = vec![payment(i64::MAX, "2024-10-01"), payment(i64::MAX, "2024-10-02")];
        assert_eq!(sum_paid(&list).total, i64::MAX);

        let s = payment_standing(i64::MIN, &list);
        assert_eq!(s.paid, i64::MAX);
        assert_eq!(s.remaining, 0);
        assert_eq!(s.status, PaymentStatus::Paid);
    }

    #[test]
    fn status_serializes_with_school_labels() {
        let v = serde_json::to_value(PaymentStatus::Unpaid).expect("serialize");
        assert_eq!(v, serde_json::json!("Non payé"));
        let v = serde_json::to_value(PaymentStatus::Paid).expect("serialize");
        assert_eq!(v, serde_json::json!("Payé"));
    }

    #[test]
    fn attendance_percentages_round_to_whole_numbers() {
        let c = count_attendance(vec![
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
        ]);
        assert_eq!(c.total(), 3);
        let p = c.percentages();
        assert_eq!(p.present, 67);
        assert_eq!(p.absent, 33);
        assert_eq!(AttendanceCounts::default().percentages().present, 0);
    }
}
