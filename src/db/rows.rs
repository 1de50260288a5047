//! Stored row types
//!
//! One struct per on-disk table. Field order mirrors column order; the
//! `TableSpec` constants say how each table is clustered and which column,
//! if any, is its allocated primary key.

use crate::error::Result;
use crate::index::{PrimaryKey, TableSpec};
use crate::schema::{Column, Fields, NullBitmap, Record, Schema, Value};

// =============================================================================
// Invoices: clustered by date, PK = id
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRow {
    pub id: i64,
    /// Days from the common era
    pub date: i32,
    pub address: String,
    pub pdf_filename: Option<String>,
    pub groups_count: i32,
}

const INVOICE_COLUMNS: &[Column] = &[
    Column::long("id", 0).not_null().non_negative(),
    Column::int("date", 1).not_null(),
    Column::text("address", 2).not_null(),
    Column::text("pdf_filename", 3),
    Column::int("groups_count", 4).not_null().non_negative(),
];

impl Record for InvoiceRow {
    const SCHEMA: Schema = Schema::new("invoices", INVOICE_COLUMNS).with_bitmap(NullBitmap::Narrow);

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.date.into(),
            self.address.as_str().into(),
            self.pdf_filename.clone().into(),
            self.groups_count.into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut f = Fields::new(Self::SCHEMA, values)?;
        Ok(Self {
            id: f.long()?,
            date: f.int()?,
            address: f.text()?,
            pdf_filename: f.opt_text()?,
            groups_count: f.int()?,
        })
    }
}

fn invoice_date(row: &InvoiceRow) -> i64 {
    row.date as i64
}

fn invoice_id(row: &InvoiceRow) -> i64 {
    row.id
}

fn set_invoice_id(row: &mut InvoiceRow, id: i64) {
    row.id = id;
}

pub const INVOICES: TableSpec<InvoiceRow> = TableSpec {
    prefix: "invoices",
    sort_key: invoice_date,
    primary_key: Some(PrimaryKey {
        counter_key: "invoices.max_id",
        get: invoice_id,
        set: set_invoice_id,
    }),
};

// =============================================================================
// Clients: clustered by id
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ClientRow {
    pub id: i64,
    pub name: String,
}

const CLIENT_COLUMNS: &[Column] = &[
    Column::long("id", 0).not_null().non_negative(),
    Column::text("name", 1).not_null(),
];

impl Record for ClientRow {
    const SCHEMA: Schema = Schema::new("clients", CLIENT_COLUMNS);

    fn to_values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.as_str().into()]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut f = Fields::new(Self::SCHEMA, values)?;
        Ok(Self {
            id: f.long()?,
            name: f.text()?,
        })
    }
}

fn client_id(row: &ClientRow) -> i64 {
    row.id
}

fn set_client_id(row: &mut ClientRow, id: i64) {
    row.id = id;
}

pub const CLIENTS: TableSpec<ClientRow> = TableSpec {
    prefix: "clients",
    sort_key: client_id,
    primary_key: Some(PrimaryKey {
        counter_key: "clients.max_id",
        get: client_id,
        set: set_client_id,
    }),
};

// =============================================================================
// Items: clustered by id
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub vat: f64,
    pub default_date_enabled: bool,
    pub active: bool,
}

const ITEM_COLUMNS: &[Column] = &[
    Column::long("id", 0).not_null().non_negative(),
    Column::text("name", 1).not_null(),
    Column::double("price", 2).not_null().non_negative(),
    Column::double("vat", 3).not_null().non_negative(),
    Column::byte("default_date_enabled", 4).not_null().enum_range(2),
    Column::byte("active", 5).not_null().enum_range(2),
];

impl Record for ItemRow {
    const SCHEMA: Schema = Schema::new("items", ITEM_COLUMNS);

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.name.as_str().into(),
            self.price.into(),
            self.vat.into(),
            self.default_date_enabled.into(),
            self.active.into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut f = Fields::new(Self::SCHEMA, values)?;
        Ok(Self {
            id: f.long()?,
            name: f.text()?,
            price: f.double()?,
            vat: f.double()?,
            default_date_enabled: f.flag()?,
            active: f.flag()?,
        })
    }
}

fn item_id(row: &ItemRow) -> i64 {
    row.id
}

fn set_item_id(row: &mut ItemRow, id: i64) {
    row.id = id;
}

pub const ITEMS: TableSpec<ItemRow> = TableSpec {
    prefix: "items",
    sort_key: item_id,
    primary_key: Some(PrimaryKey {
        counter_key: "items.max_id",
        get: item_id,
        set: set_item_id,
    }),
};

// =============================================================================
// Purchase groups: clustered by invoice id, PK = id
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub id: i64,
    pub invoice_id: i64,
    /// First client, stored inline; the rest live in the relation table
    pub first_client_id: i64,
    pub clients_count: i32,
    pub purchases_count: i32,
    pub stop_words: String,
}

const GROUP_COLUMNS: &[Column] = &[
    Column::long("id", 0).not_null().non_negative(),
    Column::long("invoice_id", 1).not_null().non_negative(),
    Column::long("first_client_id", 2).not_null().non_negative(),
    Column::int("clients_count", 3).not_null().non_negative(),
    Column::int("purchases_count", 4).not_null().non_negative(),
    Column::text("stop_words", 5).not_null(),
];

impl Record for GroupRow {
    const SCHEMA: Schema = Schema::new("purchase_groups", GROUP_COLUMNS);

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.invoice_id.into(),
            self.first_client_id.into(),
            self.clients_count.into(),
            self.purchases_count.into(),
            self.stop_words.as_str().into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut f = Fields::new(Self::SCHEMA, values)?;
        Ok(Self {
            id: f.long()?,
            invoice_id: f.long()?,
            first_client_id: f.long()?,
            clients_count: f.int()?,
            purchases_count: f.int()?,
            stop_words: f.text()?,
        })
    }
}

fn group_invoice(row: &GroupRow) -> i64 {
    row.invoice_id
}

fn group_id(row: &GroupRow) -> i64 {
    row.id
}

fn set_group_id(row: &mut GroupRow, id: i64) {
    row.id = id;
}

pub const GROUPS: TableSpec<GroupRow> = TableSpec {
    prefix: "purchase_groups",
    sort_key: group_invoice,
    primary_key: Some(PrimaryKey {
        counter_key: "purchase_groups.max_id",
        get: group_id,
        set: set_group_id,
    }),
};

// =============================================================================
// Purchases: clustered by group id, no PK
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRow {
    pub group_id: i64,
    pub item_id: i64,
    pub count: i32,
    pub from: Option<i32>,
    pub to: Option<i32>,
    pub date_mode: u8,
}

const PURCHASE_COLUMNS: &[Column] = &[
    Column::long("group_id", 0).not_null().non_negative(),
    Column::long("item_id", 1).not_null().non_negative(),
    Column::int("count", 2).not_null().non_negative(),
    Column::int("from", 3),
    Column::int("to", 4),
    Column::byte("date_mode", 5).not_null().enum_range(super::DateMode::VARIANTS),
];

impl Record for PurchaseRow {
    const SCHEMA: Schema = Schema::new("purchases", PURCHASE_COLUMNS).with_bitmap(NullBitmap::Narrow);

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.group_id.into(),
            self.item_id.into(),
            self.count.into(),
            self.from.into(),
            self.to.into(),
            self.date_mode.into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut f = Fields::new(Self::SCHEMA, values)?;
        Ok(Self {
            group_id: f.long()?,
            item_id: f.long()?,
            count: f.int()?,
            from: f.opt_int()?,
            to: f.opt_int()?,
            date_mode: f.byte()?,
        })
    }
}

fn purchase_group(row: &PurchaseRow) -> i64 {
    row.group_id
}

pub const PURCHASES: TableSpec<PurchaseRow> = TableSpec {
    prefix: "purchases",
    sort_key: purchase_group,
    primary_key: None,
};

// =============================================================================
// Client/group relation: 2nd..Nth client of a group, clustered by group id
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ClientGroupRow {
    pub group_id: i64,
    pub client_id: i64,
}

const CLIENT_GROUP_COLUMNS: &[Column] = &[
    Column::long("group_id", 0).not_null().non_negative(),
    Column::long("client_id", 1).not_null().non_negative(),
];

impl Record for ClientGroupRow {
    const SCHEMA: Schema = Schema::new("client_group_relation", CLIENT_GROUP_COLUMNS);

    fn to_values(&self) -> Vec<Value> {
        vec![self.group_id.into(), self.client_id.into()]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut f = Fields::new(Self::SCHEMA, values)?;
        Ok(Self {
            group_id: f.long()?,
            client_id: f.long()?,
        })
    }
}

fn relation_group(row: &ClientGroupRow) -> i64 {
    row.group_id
}

pub const CLIENT_GROUPS: TableSpec<ClientGroupRow> = TableSpec {
    prefix: "client_group_relation",
    sort_key: relation_group,
    primary_key: None,
};
