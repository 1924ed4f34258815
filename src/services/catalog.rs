use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;

/// Price and destination for a (church, service) pair, as the catalog knows
/// them. Amounts are minor units.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub amount_minor: i64,
    pub currency: String,
    pub payee_reference: Option<String>,
    pub payment_required: bool,
}

pub fn is_resource_owner(conn: &Connection, actor: &str, church_id: &str) -> anyhow::Result<bool> {
    match queries::get_church(conn, church_id)? {
        Some(church) => Ok(church.owner_id == actor),
        None => Ok(false),
    }
}

/// None when the church or service does not exist; the caller decides whether
/// that is a validation failure or a not-found.
pub fn expected_price(
    conn: &Connection,
    church_id: &str,
    service_id: &str,
) -> anyhow::Result<Option<PriceQuote>> {
    let Some(church) = queries::get_church(conn, church_id)? else {
        return Ok(None);
    };
    let Some(service) = queries::get_service(conn, church_id, service_id)? else {
        return Ok(None);
    };

    Ok(Some(PriceQuote {
        amount_minor: service.price_minor,
        currency: church.currency,
        payee_reference: church.payee_reference,
        payment_required: service.payment_required,
    }))
}

pub fn is_date_open(conn: &Connection, church_id: &str, date: &NaiveDate) -> anyhow::Result<bool> {
    Ok(!queries::is_date_closed(conn, church_id, date)?)
}
