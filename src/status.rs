use serde::Serialize;
use std::collections::BTreeSet;

/// The academic calendar runs July through June. A year named "2024/2025"
/// covers (7,2024)..(12,2024),(1,2025)..(6,2025).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicMonth {
    pub month: u32,
    pub year: i32,
}

/// Optional billing-period bounds on a fee type. When all four are present
/// the month sequence walks from-bound to to-bound inclusive instead of the
/// fixed academic calendar.
#[derive(Debug, Clone, Copy)]
pub struct PeriodBounds {
    pub from_month: u32,
    pub from_year: i32,
    pub to_month: u32,
    pub to_year: i32,
}

/// The slice of a payment row the engine cares about.
#[derive(Debug, Clone, Copy)]
pub struct PaymentFact {
    pub month: Option<u32>,
    pub is_installment: bool,
    pub is_paid_off: bool,
    pub amount: i64,
}

impl PaymentFact {
    /// A row closes out its month when it is paid off or was never part of
    /// an installment plan. Open installments are partial progress only.
    pub fn is_settled(&self) -> bool {
        self.is_paid_off || !self.is_installment
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringStatus {
    pub paid_months: Vec<u32>,
    pub unpaid_months: Vec<u32>,
    pub total_paid: i64,
    pub total_due: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeStatus {
    pub is_paid: bool,
    pub total_paid: i64,
    pub amount_due: i64,
}

/// Parses "2024/2025" into (2024, 2025). A bare "2024" is treated as
/// 2024/2025.
pub fn parse_year_span(name: &str) -> Option<(i32, i32)> {
    let mut parts = name.trim().splitn(2, '/');
    let start: i32 = parts.next()?.trim().parse().ok()?;
    let end = match parts.next() {
        Some(p) => p.trim().parse().ok()?,
        None => start + 1,
    };
    Some((start, end))
}

pub fn academic_month_sequence(
    year_name: &str,
    bounds: Option<&PeriodBounds>,
) -> Vec<AcademicMonth> {
    if let Some(b) = bounds {
        let mut months = Vec::new();
        let mut month = b.from_month;
        let mut year = b.from_year;
        while year < b.to_year || (year == b.to_year && month <= b.to_month) {
            months.push(AcademicMonth { month, year });
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }
        return months;
    }

    let Some((start_year, end_year)) = parse_year_span(year_name) else {
        return Vec::new();
    };
    (7..=12)
        .map(|m| AcademicMonth {
            month: m,
            year: start_year,
        })
        .chain((1..=6).map(|m| AcademicMonth {
            month: m,
            year: end_year,
        }))
        .collect()
}

/// Months already closed out by a settled payment. Duplicate settlement rows
/// for the same month collapse naturally under set semantics.
pub fn paid_months(facts: &[PaymentFact]) -> BTreeSet<u32> {
    facts
        .iter()
        .filter(|f| f.is_settled())
        .filter_map(|f| f.month)
        .filter(|m| (1..=12).contains(m))
        .collect()
}

/// Set difference in the sequence's own order.
pub fn unpaid_months(sequence: &[AcademicMonth], paid: &BTreeSet<u32>) -> Vec<u32> {
    sequence
        .iter()
        .map(|am| am.month)
        .filter(|m| !paid.contains(m))
        .collect()
}

/// Restricts a month sequence to months that have already started: walks the
/// sequence in academic order and cuts after the current calendar month. If
/// the current month does not appear (period-bounded sequences), the whole
/// sequence is kept.
pub fn months_through_current(sequence: &[AcademicMonth], current_month: u32) -> Vec<AcademicMonth> {
    match sequence.iter().position(|am| am.month == current_month) {
        Some(idx) => sequence[..=idx].to_vec(),
        None => sequence.to_vec(),
    }
}

pub fn recurring_status(
    facts: &[PaymentFact],
    sequence: &[AcademicMonth],
    monthly_amount: i64,
) -> RecurringStatus {
    let paid = paid_months(facts);
    let unpaid = unpaid_months(sequence, &paid);
    let total_paid: i64 = facts.iter().map(|f| f.amount).sum();
    let total_due = unpaid.len() as i64 * monthly_amount;
    RecurringStatus {
        paid_months: paid.into_iter().collect(),
        unpaid_months: unpaid,
        total_paid,
        total_due,
    }
}

/// A one-time fee is paid as soon as any settled row exists; unsettled
/// installment rows never close it out.
pub fn one_time_status(facts: &[PaymentFact], amount: i64) -> OneTimeStatus {
    let is_paid = facts.iter().any(|f| f.is_settled());
    let total_paid: i64 = facts.iter().map(|f| f.amount).sum();
    OneTimeStatus {
        is_paid,
        total_paid,
        amount_due: if is_paid { 0 } else { amount },
    }
}

/// Picks the arrears-tracked "tuition" fee type: the one literally named
/// SPP (case-insensitive) when present, otherwise the first recurring type.
pub fn pick_tuition_type<T>(
    types: &[T],
    name: impl Fn(&T) -> &str,
    is_recurring: impl Fn(&T) -> bool,
) -> Option<&T> {
    types
        .iter()
        .find(|t| name(t).trim().eq_ignore_ascii_case("spp"))
        .or_else(|| types.iter().find(|t| is_recurring(t)))
}

/// Cumulative sum for the ledger view; input must already be ordered by
/// payment date ascending.
pub fn running_balance<I>(amounts: I) -> Vec<i64>
where
    I: IntoIterator<Item = i64>,
{
    let mut total = 0i64;
    amounts
        .into_iter()
        .map(|a| {
            total += a;
            total
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(month: u32) -> PaymentFact {
        PaymentFact {
            month: Some(month),
            is_installment: false,
            is_paid_off: false,
            amount: 150_000,
        }
    }

    fn open_installment(month: Option<u32>) -> PaymentFact {
        PaymentFact {
            month,
            is_installment: true,
            is_paid_off: false,
            amount: 50_000,
        }
    }

    #[test]
    fn standard_sequence_spans_july_to_june() {
        let seq = academic_month_sequence("2024/2025", None);
        assert_eq!(seq.len(), 12);
        assert_eq!(seq[0], AcademicMonth { month: 7, year: 2024 });
        assert_eq!(seq[5], AcademicMonth { month: 12, year: 2024 });
        assert_eq!(seq[6], AcademicMonth { month: 1, year: 2025 });
        assert_eq!(seq[11], AcademicMonth { month: 6, year: 2025 });
    }

    #[test]
    fn bounded_sequence_wraps_december_to_january() {
        let bounds = PeriodBounds {
            from_month: 11,
            from_year: 2024,
            to_month: 2,
            to_year: 2025,
        };
        let seq = academic_month_sequence("2024/2025", Some(&bounds));
        let months: Vec<(u32, i32)> = seq.iter().map(|am| (am.month, am.year)).collect();
        assert_eq!(months, vec![(11, 2024), (12, 2024), (1, 2025), (2, 2025)]);
    }

    #[test]
    fn malformed_year_name_yields_empty_sequence() {
        assert!(academic_month_sequence("n/a", None).is_empty());
        assert!(academic_month_sequence("", None).is_empty());
    }

    #[test]
    fn paid_and_unpaid_partition_the_sequence() {
        let seq = academic_month_sequence("2024/2025", None);
        let facts = vec![settled(7), settled(9), open_installment(Some(8))];
        let paid = paid_months(&facts);
        let unpaid = unpaid_months(&seq, &paid);

        assert_eq!(paid.iter().copied().collect::<Vec<_>>(), vec![7, 9]);
        assert!(unpaid.contains(&8));
        assert_eq!(paid.len() + unpaid.len(), seq.len());
        for m in &paid {
            assert!(!unpaid.contains(m));
        }
    }

    #[test]
    fn duplicate_settlement_rows_collapse() {
        let facts = vec![settled(7), settled(7), settled(7)];
        assert_eq!(paid_months(&facts).len(), 1);
    }

    #[test]
    fn arrears_scenario_october_cutoff() {
        // SPP 150000/month, year 2024/2025, month 7 settled, today is Oct 2024.
        let seq = academic_month_sequence("2024/2025", None);
        let checked = months_through_current(&seq, 10);
        let facts = vec![settled(7)];
        let status = recurring_status(&facts, &checked, 150_000);

        assert_eq!(status.paid_months, vec![7]);
        assert_eq!(status.unpaid_months, vec![8, 9, 10]);
        assert_eq!(status.total_due, 450_000);
    }

    #[test]
    fn cutoff_falls_back_to_full_sequence_when_month_absent() {
        let bounds = PeriodBounds {
            from_month: 1,
            from_year: 2025,
            to_month: 3,
            to_year: 2025,
        };
        let seq = academic_month_sequence("2024/2025", Some(&bounds));
        assert_eq!(months_through_current(&seq, 7).len(), seq.len());
    }

    #[test]
    fn one_time_fee_ignores_open_installments() {
        let unpaid = one_time_status(&[open_installment(None), open_installment(None)], 275_000);
        assert!(!unpaid.is_paid);
        assert_eq!(unpaid.amount_due, 275_000);

        let paid = one_time_status(
            &[
                open_installment(None),
                PaymentFact {
                    month: None,
                    is_installment: true,
                    is_paid_off: true,
                    amount: 175_000,
                },
            ],
            275_000,
        );
        assert!(paid.is_paid);
        assert_eq!(paid.amount_due, 0);
    }

    #[test]
    fn tuition_pick_prefers_spp_name_over_listing_order() {
        let types = vec![
            ("Uang Gedung".to_string(), true),
            ("SPP".to_string(), true),
            ("Seragam".to_string(), false),
        ];
        let picked = pick_tuition_type(&types, |t| t.0.as_str(), |t| t.1);
        assert_eq!(picked.map(|t| t.0.as_str()), Some("SPP"));

        let no_spp = vec![
            ("Seragam".to_string(), false),
            ("Uang Gedung".to_string(), true),
        ];
        let picked = pick_tuition_type(&no_spp, |t| t.0.as_str(), |t| t.1);
        assert_eq!(picked.map(|t| t.0.as_str()), Some("Uang Gedung"));
    }

    #[test]
    fn running_balance_is_monotone_cumulative() {
        assert_eq!(
            running_balance(vec![150_000, 50_000, 275_000]),
            vec![150_000, 200_000, 475_000]
        );
        assert!(running_balance(Vec::new()).is_empty());
    }
}
