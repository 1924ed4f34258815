use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Booking, BookingStatus, Church, PaymentStatus, ServiceOffering};

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn now_str() -> String {
    Utc::now().naive_utc().format(DATETIME_FMT).to_string()
}

// ── Bookings ──

/// Draws the next number from the booking code sequence. AUTOINCREMENT
/// guarantees a number is never handed out twice, even across deletes.
pub fn next_booking_code(conn: &Connection) -> anyhow::Result<String> {
    conn.execute("INSERT INTO booking_codes DEFAULT VALUES", [])?;
    let seq = conn.last_insert_rowid();
    Ok(format!("APPT-{seq:04}"))
}

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, code, church_id, service_id, requester_id, scheduled_date, scheduled_time,
                               status, payment_status, payment_amount, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            booking.id,
            booking.code,
            booking.church_id,
            booking.service_id,
            booking.requester_id,
            booking.scheduled_date.format(DATE_FMT).to_string(),
            booking.scheduled_time,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.payment_amount,
            booking.created_at.format(DATETIME_FMT).to_string(),
            booking.updated_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}

const BOOKING_COLUMNS: &str = "id, code, church_id, service_id, requester_id, scheduled_date, scheduled_time, \
     status, payment_status, payment_method, payment_amount, payment_order_id, \
     payment_transaction_id, payment_date, cancel_reason, created_at, updated_at";

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_order_id(
    conn: &Connection,
    order_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_order_id = ?1"),
        params![order_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_transaction_id(
    conn: &Connection,
    transaction_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_transaction_id = ?1"),
        params![transaction_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Default)]
pub struct BookingFilter {
    pub status: Option<String>,
    pub church_id: Option<String>,
    pub requester_id: Option<String>,
    pub limit: i64,
}

pub fn list_bookings(conn: &Connection, filter: &BookingFilter) -> anyhow::Result<Vec<Booking>> {
    let mut clauses: Vec<&str> = vec![];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(status) = &filter.status {
        clauses.push("status = ?");
        params_vec.push(Box::new(status.clone()));
    }
    if let Some(church_id) = &filter.church_id {
        clauses.push("church_id = ?");
        params_vec.push(Box::new(church_id.clone()));
    }
    if let Some(requester_id) = &filter.requester_id {
        clauses.push("requester_id = ?");
        params_vec.push(Box::new(requester_id.clone()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let limit = if filter.limit > 0 { filter.limit } else { 50 };
    params_vec.push(Box::new(limit));

    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings {where_sql} ORDER BY created_at DESC LIMIT ?"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Snapshot of every other booking sharing the (church, date) slot.
pub fn get_competing_bookings(
    conn: &Connection,
    church_id: &str,
    date: &NaiveDate,
    exclude_id: &str,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE church_id = ?1 AND scheduled_date = ?2 AND id != ?3
         ORDER BY created_at ASC"
    ))?;

    let rows = stmt.query_map(
        params![church_id, date.format(DATE_FMT).to_string(), exclude_id],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    cancel_reason: Option<&str>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, cancel_reason = COALESCE(?2, cancel_reason), updated_at = ?3
         WHERE id = ?4",
        params![status.as_str(), cancel_reason, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_payment_order(
    conn: &Connection,
    id: &str,
    order_id: &str,
    method: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_order_id = ?1, payment_method = ?2, payment_status = 'pending', updated_at = ?3
         WHERE id = ?4",
        params![order_id, method, now_str(), id],
    )?;
    Ok(count > 0)
}

/// Records a successful capture. Touches payment fields only; the lifecycle
/// status column is left alone.
pub fn record_payment(
    conn: &Connection,
    id: &str,
    method: &str,
    amount_minor: i64,
    transaction_id: &str,
    paid_at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = 'paid', payment_method = ?1, payment_amount = ?2,
                             payment_transaction_id = ?3, payment_date = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            method,
            amount_minor,
            transaction_id,
            paid_at.format(DATETIME_FMT).to_string(),
            now_str(),
            id
        ],
    )?;
    Ok(count > 0)
}

pub fn set_payment_status(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_str(), id],
    )?;
    Ok(count > 0)
}

/// Cancels a conflicting booking, guarded so an already-settled or paid row
/// is never touched. Returns false when the guard rejected the update.
pub fn cancel_competitor(conn: &Connection, id: &str, reason: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'canceled', cancel_reason = ?1, payment_status = 'canceled', updated_at = ?2
         WHERE id = ?3
           AND status IN ('requested', 'reviewed', 'approved')
           AND payment_status = 'pending'",
        params![reason, now_str(), id],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let id: String = row.get(0)?;
    let code: String = row.get(1)?;
    let church_id: String = row.get(2)?;
    let service_id: String = row.get(3)?;
    let requester_id: String = row.get(4)?;
    let scheduled_date_str: String = row.get(5)?;
    let scheduled_time: Option<String> = row.get(6)?;
    let status_str: String = row.get(7)?;
    let payment_status_str: String = row.get(8)?;
    let payment_method: Option<String> = row.get(9)?;
    let payment_amount: Option<i64> = row.get(10)?;
    let payment_order_id: Option<String> = row.get(11)?;
    let payment_transaction_id: Option<String> = row.get(12)?;
    let payment_date_str: Option<String> = row.get(13)?;
    let cancel_reason: Option<String> = row.get(14)?;
    let created_at_str: String = row.get(15)?;
    let updated_at_str: String = row.get(16)?;

    let scheduled_date = NaiveDate::parse_from_str(&scheduled_date_str, DATE_FMT)
        .unwrap_or_else(|_| Utc::now().date_naive());
    let payment_date = payment_date_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FMT).ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, DATETIME_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Booking {
        id,
        code,
        church_id,
        service_id,
        requester_id,
        scheduled_date,
        scheduled_time,
        status: BookingStatus::parse(&status_str),
        payment_status: PaymentStatus::parse(&payment_status_str),
        payment_method,
        payment_amount,
        payment_order_id,
        payment_transaction_id,
        payment_date,
        cancel_reason,
        created_at,
        updated_at,
    })
}

// ── Churches & services ──

pub fn save_church(conn: &Connection, church: &Church) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO churches (id, name, owner_id, payee_reference, currency, advance_days)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           owner_id = excluded.owner_id,
           payee_reference = excluded.payee_reference,
           currency = excluded.currency,
           advance_days = excluded.advance_days",
        params![
            church.id,
            church.name,
            church.owner_id,
            church.payee_reference,
            church.currency,
            church.advance_days,
        ],
    )?;
    Ok(())
}

pub fn get_church(conn: &Connection, id: &str) -> anyhow::Result<Option<Church>> {
    let result = conn.query_row(
        "SELECT id, name, owner_id, payee_reference, currency, advance_days
         FROM churches WHERE id = ?1",
        params![id],
        |row| {
            Ok(Church {
                id: row.get(0)?,
                name: row.get(1)?,
                owner_id: row.get(2)?,
                payee_reference: row.get(3)?,
                currency: row.get(4)?,
                advance_days: row.get(5)?,
            })
        },
    );

    match result {
        Ok(church) => Ok(Some(church)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_service(conn: &Connection, service: &ServiceOffering) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO church_services (id, church_id, name, price_minor, payment_required)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           church_id = excluded.church_id,
           name = excluded.name,
           price_minor = excluded.price_minor,
           payment_required = excluded.payment_required",
        params![
            service.id,
            service.church_id,
            service.name,
            service.price_minor,
            service.payment_required as i32,
        ],
    )?;
    Ok(())
}

pub fn get_service(
    conn: &Connection,
    church_id: &str,
    service_id: &str,
) -> anyhow::Result<Option<ServiceOffering>> {
    let result = conn.query_row(
        "SELECT id, church_id, name, price_minor, payment_required
         FROM church_services WHERE id = ?1 AND church_id = ?2",
        params![service_id, church_id],
        |row| {
            Ok(ServiceOffering {
                id: row.get(0)?,
                church_id: row.get(1)?,
                name: row.get(2)?,
                price_minor: row.get(3)?,
                payment_required: row.get::<_, i32>(4)? != 0,
            })
        },
    );

    match result {
        Ok(service) => Ok(Some(service)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn add_closure(conn: &Connection, church_id: &str, date: &NaiveDate) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO church_closures (church_id, closed_date) VALUES (?1, ?2)",
        params![church_id, date.format(DATE_FMT).to_string()],
    )?;
    Ok(())
}

pub fn is_date_closed(
    conn: &Connection,
    church_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM church_closures WHERE church_id = ?1 AND closed_date = ?2",
        params![church_id, date.format(DATE_FMT).to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    #[test]
    fn test_booking_codes_are_sequential_and_padded() {
        let conn = setup_db();
        assert_eq!(next_booking_code(&conn).unwrap(), "APPT-0001");
        assert_eq!(next_booking_code(&conn).unwrap(), "APPT-0002");
        assert_eq!(next_booking_code(&conn).unwrap(), "APPT-0003");
    }

    #[test]
    fn test_cancel_competitor_guard_rejects_paid_rows() {
        let conn = setup_db();
        let now = Utc::now().naive_utc();

        let church = Church {
            id: "ch-1".to_string(),
            name: "St. Mary".to_string(),
            owner_id: "owner-1".to_string(),
            payee_reference: None,
            currency: "USD".to_string(),
            advance_days: 90,
        };
        save_church(&conn, &church).unwrap();
        save_service(
            &conn,
            &ServiceOffering {
                id: "svc-1".to_string(),
                church_id: "ch-1".to_string(),
                name: "Wedding".to_string(),
                price_minor: 10000,
                payment_required: true,
            },
        )
        .unwrap();

        let booking = Booking {
            id: "b-1".to_string(),
            code: "APPT-0001".to_string(),
            church_id: "ch-1".to_string(),
            service_id: "svc-1".to_string(),
            requester_id: "user-1".to_string(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            scheduled_time: None,
            status: BookingStatus::Requested,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            payment_amount: Some(10000),
            payment_order_id: None,
            payment_transaction_id: None,
            payment_date: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };
        create_booking(&conn, &booking).unwrap();

        record_payment(&conn, "b-1", "sandbox", 10000, "txn-1", &now).unwrap();

        // A paid row never qualifies for conflict cancellation.
        assert!(!cancel_competitor(&conn, "b-1", "conflict").unwrap());
        let reloaded = get_booking_by_id(&conn, "b-1").unwrap().unwrap();
        assert_eq!(reloaded.status, BookingStatus::Requested);
        assert_eq!(reloaded.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_transaction_id_uniqueness() {
        let conn = setup_db();
        let now = Utc::now().naive_utc();

        save_church(
            &conn,
            &Church {
                id: "ch-1".to_string(),
                name: "St. Mary".to_string(),
                owner_id: "owner-1".to_string(),
                payee_reference: None,
                currency: "USD".to_string(),
                advance_days: 90,
            },
        )
        .unwrap();
        save_service(
            &conn,
            &ServiceOffering {
                id: "svc-1".to_string(),
                church_id: "ch-1".to_string(),
                name: "Baptism".to_string(),
                price_minor: 5000,
                payment_required: true,
            },
        )
        .unwrap();

        for id in ["b-1", "b-2"] {
            let booking = Booking {
                id: id.to_string(),
                code: next_booking_code(&conn).unwrap(),
                church_id: "ch-1".to_string(),
                service_id: "svc-1".to_string(),
                requester_id: "user-1".to_string(),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
                scheduled_time: None,
                status: BookingStatus::Requested,
                payment_status: PaymentStatus::Pending,
                payment_method: None,
                payment_amount: Some(5000),
                payment_order_id: None,
                payment_transaction_id: None,
                payment_date: None,
                cancel_reason: None,
                created_at: now,
                updated_at: now,
            };
            create_booking(&conn, &booking).unwrap();
        }

        record_payment(&conn, "b-1", "sandbox", 5000, "txn-dup", &now).unwrap();
        // Two bookings can never claim the same external capture.
        assert!(record_payment(&conn, "b-2", "sandbox", 5000, "txn-dup", &now).is_err());
    }
}
