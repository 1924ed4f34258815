use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Church {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub payee_reference: Option<String>,
    pub currency: String,
    pub advance_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: String,
    pub church_id: String,
    pub name: String,
    pub price_minor: i64,
    pub payment_required: bool,
}
