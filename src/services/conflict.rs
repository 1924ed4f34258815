use crate::models::{Booking, PaymentStatus};

/// Instruction to cancel one competing booking, produced by the resolver and
/// applied inside the same transaction that records the winning payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationDirective {
    pub booking_id: String,
    pub reason: String,
}

/// Decides which competitors lose their slot once `winner` has collected
/// payment. Pure over its inputs: no I/O, deterministic.
///
/// A competitor qualifies iff it is still in an active lifecycle state and
/// has not itself collected money. Paid, completed and terminal bookings are
/// never touched, so a legitimately paid rival or a settled record cannot be
/// canceled by a later payment for the same slot.
pub fn resolve_conflicts(
    winner: &Booking,
    church_name: &str,
    competitors: &[Booking],
) -> Vec<CancellationDirective> {
    competitors
        .iter()
        .filter(|b| b.id != winner.id)
        .filter(|b| b.status.is_active())
        .filter(|b| b.payment_status == PaymentStatus::Pending)
        .map(|b| CancellationDirective {
            booking_id: b.id.clone(),
            reason: format!(
                "another booking was confirmed for {church_name} on {}",
                winner.scheduled_date.format("%Y-%m-%d")
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use chrono::{NaiveDate, Utc};

    fn booking(id: &str, status: BookingStatus, payment: PaymentStatus) -> Booking {
        let now = Utc::now().naive_utc();
        Booking {
            id: id.to_string(),
            code: format!("APPT-{id}"),
            church_id: "ch-1".to_string(),
            service_id: "svc-1".to_string(),
            requester_id: "user-1".to_string(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            scheduled_time: None,
            status,
            payment_status: payment,
            payment_method: None,
            payment_amount: Some(10000),
            payment_order_id: None,
            payment_transaction_id: None,
            payment_date: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_single_competitor_is_canceled() {
        let winner = booking("a", BookingStatus::Requested, PaymentStatus::Paid);
        let competitors = vec![booking("b", BookingStatus::Requested, PaymentStatus::Pending)];

        let directives = resolve_conflicts(&winner, "St. Mary", &competitors);
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].booking_id, "b");
        assert!(directives[0].reason.contains("St. Mary"));
        assert!(directives[0].reason.contains("2026-10-01"));
    }

    #[test]
    fn test_three_way_conflict() {
        let winner = booking("a", BookingStatus::Requested, PaymentStatus::Paid);
        let competitors = vec![
            booking("b", BookingStatus::Requested, PaymentStatus::Pending),
            booking("c", BookingStatus::Reviewed, PaymentStatus::Pending),
        ];

        let directives = resolve_conflicts(&winner, "St. Mary", &competitors);
        assert_eq!(directives.len(), 2);
        let ids: Vec<&str> = directives.iter().map(|d| d.booking_id.as_str()).collect();
        assert!(ids.contains(&"b"));
        assert!(ids.contains(&"c"));
    }

    #[test]
    fn test_paid_competitor_is_never_touched() {
        let winner = booking("a", BookingStatus::Requested, PaymentStatus::Paid);
        let competitors = vec![booking("b", BookingStatus::Requested, PaymentStatus::Paid)];

        assert!(resolve_conflicts(&winner, "St. Mary", &competitors).is_empty());
    }

    #[test]
    fn test_terminal_competitors_are_never_touched() {
        let winner = booking("a", BookingStatus::Requested, PaymentStatus::Paid);
        let competitors = vec![
            booking("b", BookingStatus::Completed, PaymentStatus::Pending),
            booking("c", BookingStatus::Declined, PaymentStatus::Pending),
            booking("d", BookingStatus::Canceled, PaymentStatus::Pending),
        ];

        assert!(resolve_conflicts(&winner, "St. Mary", &competitors).is_empty());
    }

    #[test]
    fn test_winner_never_cancels_itself() {
        let winner = booking("a", BookingStatus::Requested, PaymentStatus::Paid);
        // Snapshot that wrongly includes the winner itself.
        let competitors = vec![booking("a", BookingStatus::Requested, PaymentStatus::Pending)];

        assert!(resolve_conflicts(&winner, "St. Mary", &competitors).is_empty());
    }

    #[test]
    fn test_approved_pending_competitor_still_loses() {
        let winner = booking("a", BookingStatus::Requested, PaymentStatus::Paid);
        let competitors = vec![booking("b", BookingStatus::Approved, PaymentStatus::Pending)];

        let directives = resolve_conflicts(&winner, "St. Mary", &competitors);
        assert_eq!(directives.len(), 1);
    }
}
