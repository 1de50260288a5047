//! Domain aggregates
//!
//! What callers work with. None of these are stored directly: an [`Invoice`]
//! is rebuilt from its row plus the group, relation and purchase rows that
//! reference it.

use chrono::{Datelike, NaiveDate};

use crate::error::{LedgerError, Result};

use super::rows::{ClientRow, ItemRow};

#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    /// Assigned by the database; ignored on insert
    pub id: i64,
    pub name: String,
}

impl Client {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Assigned by the database; ignored on insert
    pub id: i64,
    pub name: String,
    pub price: f64,
    /// VAT rate as a fraction (0.21 for 21%)
    pub vat: f64,
    pub default_date_enabled: bool,
    pub active: bool,
}

impl Item {
    pub fn new(name: impl Into<String>, price: f64, vat: f64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            price,
            vat,
            default_date_enabled: false,
            active: true,
        }
    }

    pub fn with_default_date(mut self, enabled: bool) -> Self {
        self.default_date_enabled = enabled;
        self
    }

    /// Natural key: name, price and VAT
    pub fn same_article(&self, other: &Item) -> bool {
        self.name == other.name && self.price == other.price && self.vat == other.vat
    }

    pub(crate) fn to_row(&self) -> ItemRow {
        ItemRow {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            vat: self.vat,
            default_date_enabled: self.default_date_enabled,
            active: self.active,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
            vat: row.vat,
            default_date_enabled: row.default_date_enabled,
            active: row.active,
        }
    }
}

/// Which of a purchase's dates are meaningful
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DateMode {
    #[default]
    Disabled = 0,
    Single = 1,
    Range = 2,
}

impl DateMode {
    /// Number of variants, the valid range of the stored byte
    pub const VARIANTS: u8 = 3;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DateMode::Disabled),
            1 => Ok(DateMode::Single),
            2 => Ok(DateMode::Range),
            other => Err(LedgerError::corrupted(format!(
                "unknown purchase date mode {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    pub item: Item,
    pub count: i32,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub date_mode: DateMode,
}

impl Purchase {
    pub fn new(item: Item, count: i32) -> Self {
        Self {
            item,
            count,
            from: None,
            to: None,
            date_mode: DateMode::Disabled,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.from = Some(date);
        self.to = None;
        self.date_mode = DateMode::Single;
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self.date_mode = DateMode::Range;
        self
    }

    pub fn net_amount(&self) -> f64 {
        self.item.price * self.count as f64
    }

    pub fn vat_amount(&self) -> f64 {
        self.net_amount() * self.item.vat
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseGroup {
    /// Assigned by the database; ignored on insert
    pub id: i64,
    /// At least one; the first is stored inline in the group row
    pub clients: Vec<Client>,
    pub purchases: Vec<Purchase>,
    pub stop_words: String,
}

impl PurchaseGroup {
    pub fn new(clients: Vec<Client>) -> Self {
        Self {
            id: 0,
            clients,
            purchases: Vec::new(),
            stop_words: String::new(),
        }
    }

    pub fn with_purchase(mut self, purchase: Purchase) -> Self {
        self.purchases.push(purchase);
        self
    }

    pub fn net_total(&self) -> f64 {
        self.purchases.iter().map(Purchase::net_amount).sum()
    }

    pub fn vat_total(&self) -> f64 {
        self.purchases.iter().map(Purchase::vat_amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    /// Assigned by the database; ignored on insert
    pub id: i64,
    pub address: String,
    pub date: NaiveDate,
    pub pdf_filename: Option<String>,
    pub groups: Vec<PurchaseGroup>,
}

impl Invoice {
    pub fn new(address: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: 0,
            address: address.into(),
            date,
            pdf_filename: None,
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: PurchaseGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn net_total(&self) -> f64 {
        self.groups.iter().map(PurchaseGroup::net_total).sum()
    }

    pub fn gross_total(&self) -> f64 {
        self.groups
            .iter()
            .map(|g| g.net_total() + g.vat_total())
            .sum()
    }
}

// =============================================================================
// Date columns
// =============================================================================

pub(crate) fn date_to_day(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

pub(crate) fn day_to_date(day: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(day)
        .ok_or_else(|| LedgerError::corrupted(format!("stored day {} is not a valid date", day)))
}
