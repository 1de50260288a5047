//! Database
//!
//! Typed CRUD and query surface over the six tables. Referential integrity is
//! maintained by hand: children are written after and removed before their
//! parents, and every join checks the row counts its parent recorded.

use std::fs;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::index::{ClusteredIndex, PrimaryKeyIndex};
use crate::schema::Record;
use crate::storage::PropertyPage;

use super::join::JoinCache;
use super::model::{date_to_day, day_to_date, Client, DateMode, Invoice, Item, Purchase, PurchaseGroup};
use super::rows::{
    ClientGroupRow, ClientRow, GroupRow, InvoiceRow, ItemRow, PurchaseRow, CLIENTS, CLIENT_GROUPS,
    GROUPS, INVOICES, ITEMS, PURCHASES,
};

/// Property holding the denormalized invoice count
pub const INVOICE_COUNT_KEY: &str = "invoices.count";

/// Size of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub table: &'static str,
    pub records: usize,
    pub partitions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub invoice_count: i64,
    pub tables: Vec<TableStats>,
}

/// The invoice store
///
/// Mutations are buffered in memory until [`Database::flush`]. Not thread
/// safe; share it through [`crate::task::SharedDatabase`].
pub struct Database {
    config: Config,
    properties: PropertyPage,

    invoices: PrimaryKeyIndex<InvoiceRow>,
    clients: PrimaryKeyIndex<ClientRow>,
    items: PrimaryKeyIndex<ItemRow>,
    groups: PrimaryKeyIndex<GroupRow>,
    purchases: ClusteredIndex<PurchaseRow>,
    client_groups: ClusteredIndex<ClientGroupRow>,

    invoice_count: i64,
}

impl Database {
    /// Open (or create) the database under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let properties = PropertyPage::load(config.properties_path())?;
        let dir = config.data_dir.as_path();
        let max = config.max_partition_size;

        let invoices = PrimaryKeyIndex::open(dir, INVOICES, max, &properties)?;
        let clients = PrimaryKeyIndex::open(dir, CLIENTS, max, &properties)?;
        let items = PrimaryKeyIndex::open(dir, ITEMS, max, &properties)?;
        let groups = PrimaryKeyIndex::open(dir, GROUPS, max, &properties)?;
        let purchases = ClusteredIndex::open(dir, PURCHASES, max)?;
        let client_groups = ClusteredIndex::open(dir, CLIENT_GROUPS, max)?;

        let mut db = Self {
            config,
            properties,
            invoices,
            clients,
            items,
            groups,
            purchases,
            client_groups,
            invoice_count: 0,
        };
        db.invoice_count = db.load_invoice_count()?;

        info!(
            "Opened database at {} ({} invoices)",
            db.config.data_dir.display(),
            db.invoice_count
        );
        Ok(db)
    }

    // =========================================================================
    // Clients and Items
    // =========================================================================

    /// Return the client with this name, inserting it if new
    pub fn insert_client(&mut self, name: &str) -> Result<Client> {
        if let Some(row) = self.clients.query_first(|r| r.name == name)? {
            return Ok(Client::from(row));
        }

        let id = self.clients.assign_unique_id_and_insert(ClientRow {
            id: 0,
            name: name.to_string(),
        })?;
        debug!("Inserted client {} '{}'", id, name);
        Ok(Client {
            id,
            name: name.to_string(),
        })
    }

    /// Return the stored item with the same name, price and VAT, inserting
    /// `item` if there is none. The id on `item` is ignored.
    pub fn insert_item(&mut self, item: &Item) -> Result<Item> {
        if let Some(row) = self
            .items
            .query_first(|r| r.name == item.name && r.price == item.price && r.vat == item.vat)?
        {
            return Ok(Item::from(row));
        }

        let mut row = item.to_row();
        row.id = self.items.assign_unique_id_and_insert(row.clone())?;
        debug!("Inserted item {} '{}'", row.id, row.name);
        Ok(Item::from(row))
    }

    /// All clients by ascending id
    pub fn clients(&mut self) -> Result<Vec<Client>> {
        let rows = self.clients.scan()?;
        Ok(rows.into_iter().rev().map(Client::from).collect())
    }

    /// All items by ascending id
    pub fn items(&mut self) -> Result<Vec<Item>> {
        let rows = self.items.scan()?;
        Ok(rows.into_iter().rev().map(Item::from).collect())
    }

    pub fn client(&mut self, id: i64) -> Result<Option<Client>> {
        Ok(self.clients.query_index(id)?.into_iter().next().map(Client::from))
    }

    pub fn item(&mut self, id: i64) -> Result<Option<Item>> {
        Ok(self.items.query_index(id)?.into_iter().next().map(Item::from))
    }

    /// Mark an item (in)active; inactive items stay resolvable by old invoices
    pub fn set_item_active(&mut self, id: i64, active: bool) -> Result<Item> {
        let mut row = self
            .items
            .remove_key(id)?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::NotFound {
                table: ITEMS.prefix.to_string(),
                id,
            })?;

        row.active = active;
        self.items.insert_unique(row.clone())?;
        Ok(Item::from(row))
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    /// Store a new invoice with fresh invoice and group ids
    ///
    /// Clients and items are resolved through natural-key dedup. Returns the
    /// invoice as stored.
    pub fn insert_invoice(&mut self, invoice: &Invoice) -> Result<Invoice> {
        validate_invoice(invoice)?;

        let row = invoice_row(invoice, 0)?;
        let id = self.invoices.assign_unique_id_and_insert(row)?;
        let stored = self.store_groups(id, invoice)?;
        self.invoice_count += 1;

        info!("Inserted invoice {} ({} groups)", id, stored.groups.len());
        Ok(stored)
    }

    /// Replace the invoice with id `invoice.id`, keeping that id
    ///
    /// Its groups are rewritten with new group ids.
    pub fn replace_invoice(&mut self, invoice: &Invoice) -> Result<Invoice> {
        validate_invoice(invoice)?;

        if !self.remove_invoice(invoice.id)? {
            return Err(LedgerError::NotFound {
                table: INVOICES.prefix.to_string(),
                id: invoice.id,
            });
        }

        self.invoices.insert_with_id(invoice_row(invoice, invoice.id)?)?;
        let stored = self.store_groups(invoice.id, invoice)?;
        self.invoice_count += 1;

        info!("Replaced invoice {}", invoice.id);
        Ok(stored)
    }

    /// Remove an invoice and everything it owns, children first
    ///
    /// Returns false when there is no such invoice.
    pub fn remove_invoice(&mut self, id: i64) -> Result<bool> {
        if self.invoices.find(id)?.is_none() {
            return Ok(false);
        }

        let groups = self.groups.query_index(id)?;
        for group in &groups {
            self.purchases.remove_key(group.id)?;
            self.client_groups.remove_key(group.id)?;
        }
        self.groups.remove_key(id)?;
        self.invoices.remove_first(|r| r.id == id)?;
        self.invoice_count -= 1;

        debug!("Removed invoice {} with {} groups", id, groups.len());
        Ok(true)
    }

    pub fn invoice(&mut self, id: i64) -> Result<Option<Invoice>> {
        match self.invoices.find(id)? {
            Some(row) => self.assemble(row, &mut JoinCache::new()).map(Some),
            None => Ok(None),
        }
    }

    /// Every invoice, newest date first
    pub fn invoices(&mut self) -> Result<Vec<Invoice>> {
        let rows = self.invoices.scan()?;
        self.assemble_all(rows)
    }

    /// Invoices dated `date`
    pub fn invoices_on(&mut self, date: NaiveDate) -> Result<Vec<Invoice>> {
        let rows = self.invoices.query_index(date_to_day(date) as i64)?;
        self.assemble_all(rows)
    }

    /// Denormalized invoice count
    pub fn invoice_count(&self) -> i64 {
        self.invoice_count
    }

    // =========================================================================
    // Integrity and Maintenance
    // =========================================================================

    /// Recompute counts from the tables and fail on any mismatch
    ///
    /// Nothing is corrected: a failure needs an explicit recovery decision.
    pub fn test_data_corrupted(&mut self) -> Result<()> {
        let actual = self.invoices.count()? as i64;
        if actual != self.invoice_count {
            return Err(LedgerError::corrupted(format!(
                "invoice count says {} but the table holds {}",
                self.invoice_count, actual
            )));
        }

        check_counter(&mut self.invoices)?;
        check_counter(&mut self.clients)?;
        check_counter(&mut self.items)?;
        check_counter(&mut self.groups)?;

        // Child tables must hold exactly what their parents recorded
        let (mut groups, mut relations, mut purchases) = (0usize, 0usize, 0usize);
        for row in self.invoices.scan()? {
            groups += row.groups_count as usize;
        }
        for row in self.groups.scan()? {
            relations += (row.clients_count as usize).saturating_sub(1);
            purchases += row.purchases_count as usize;
        }
        check_total(GROUPS.prefix, groups, self.groups.count()?)?;
        check_total(CLIENT_GROUPS.prefix, relations, self.client_groups.count()?)?;
        check_total(PURCHASES.prefix, purchases, self.purchases.count()?)?;

        // Every aggregate must rebuild
        self.invoices()?;
        Ok(())
    }

    /// Compact every table into the fewest full partitions
    pub fn repartition(&mut self) -> Result<()> {
        self.invoices.repartition()?;
        self.clients.repartition()?;
        self.items.repartition()?;
        self.groups.repartition()?;
        self.purchases.repartition()?;
        self.client_groups.repartition()?;
        self.write_properties()
    }

    /// Write all six tables, then the property page
    pub fn flush(&mut self) -> Result<()> {
        self.invoices.flush()?;
        self.clients.flush()?;
        self.items.flush()?;
        self.groups.flush()?;
        self.purchases.flush()?;
        self.client_groups.flush()?;
        self.write_properties()?;

        info!("Flushed database ({} invoices)", self.invoice_count);
        Ok(())
    }

    /// Discard unflushed changes and reread everything from disk
    ///
    /// Needed after files changed underneath, e.g. after a sync pull.
    pub fn reload(&mut self) -> Result<()> {
        self.properties = PropertyPage::load(self.config.properties_path())?;
        self.invoices.invalidate(&self.properties)?;
        self.clients.invalidate(&self.properties)?;
        self.items.invalidate(&self.properties)?;
        self.groups.invalidate(&self.properties)?;
        self.purchases.invalidate()?;
        self.client_groups.invalidate()?;
        self.invoice_count = self.load_invoice_count()?;

        debug!("Reloaded database from {}", self.config.data_dir.display());
        Ok(())
    }

    pub fn stats(&mut self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            invoice_count: self.invoice_count,
            tables: vec![
                table_stats(&mut self.invoices)?,
                table_stats(&mut self.clients)?,
                table_stats(&mut self.items)?,
                table_stats(&mut self.groups)?,
                table_stats(&mut self.purchases)?,
                table_stats(&mut self.client_groups)?,
            ],
        })
    }

    /// True when there are unflushed changes
    pub fn is_dirty(&self) -> bool {
        self.invoices.is_dirty()
            || self.clients.is_dirty()
            || self.items.is_dirty()
            || self.groups.is_dirty()
            || self.purchases.is_dirty()
            || self.client_groups.is_dirty()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn load_invoice_count(&mut self) -> Result<i64> {
        match self.properties.get_i64(INVOICE_COUNT_KEY)? {
            Some(count) => Ok(count),
            None => {
                let count = self.invoices.count()? as i64;
                if count > 0 {
                    warn!("'{}' missing, recounted {} invoices", INVOICE_COUNT_KEY, count);
                }
                Ok(count)
            }
        }
    }

    fn write_properties(&mut self) -> Result<()> {
        self.invoices.store_counter(&mut self.properties);
        self.clients.store_counter(&mut self.properties);
        self.items.store_counter(&mut self.properties);
        self.groups.store_counter(&mut self.properties);
        self.properties.set_i64(INVOICE_COUNT_KEY, self.invoice_count);
        self.properties.save()
    }

    /// Write the groups of `invoice` under `invoice_id`, returning the
    /// invoice as stored
    fn store_groups(&mut self, invoice_id: i64, invoice: &Invoice) -> Result<Invoice> {
        let mut groups = Vec::with_capacity(invoice.groups.len());

        for group in &invoice.groups {
            let clients = group
                .clients
                .iter()
                .map(|c| self.insert_client(&c.name))
                .collect::<Result<Vec<_>>>()?;

            let mut purchases = Vec::with_capacity(group.purchases.len());
            for purchase in &group.purchases {
                purchases.push(Purchase {
                    item: self.insert_item(&purchase.item)?,
                    ..purchase.clone()
                });
            }

            let first = clients.first().ok_or_else(|| {
                LedgerError::invalid_value("clients", "a purchase group needs at least one client")
            })?;
            let row = GroupRow {
                id: 0,
                invoice_id,
                first_client_id: first.id,
                clients_count: count_column("clients_count", clients.len())?,
                purchases_count: count_column("purchases_count", purchases.len())?,
                stop_words: group.stop_words.clone(),
            };
            let group_id = self.groups.assign_unique_id_and_insert(row)?;

            for client in &clients[1..] {
                self.client_groups.insert(ClientGroupRow {
                    group_id,
                    client_id: client.id,
                })?;
            }
            for purchase in &purchases {
                self.purchases.insert(purchase_row(purchase, group_id, purchase.item.id))?;
            }

            groups.push(PurchaseGroup {
                id: group_id,
                clients,
                purchases,
                stop_words: group.stop_words.clone(),
            });
        }

        Ok(Invoice {
            id: invoice_id,
            address: invoice.address.clone(),
            date: invoice.date,
            pdf_filename: invoice.pdf_filename.clone(),
            groups,
        })
    }

    fn assemble_all(&mut self, rows: Vec<InvoiceRow>) -> Result<Vec<Invoice>> {
        let mut cache = JoinCache::new();
        let invoices = rows
            .into_iter()
            .map(|row| self.assemble(row, &mut cache))
            .collect::<Result<Vec<_>>>()?;
        debug!("Assembled {} invoices, {} shared rows", invoices.len(), cache.len());
        Ok(invoices)
    }

    /// Rebuild one invoice from its row
    fn assemble(&mut self, row: InvoiceRow, cache: &mut JoinCache) -> Result<Invoice> {
        let mut group_rows = self.groups.query_index(row.id)?;
        expect_rows("purchase groups of invoice", row.id, row.groups_count, group_rows.len())?;
        // Equal keys are kept in insertion order, the scan yields them reversed
        group_rows.reverse();

        let mut groups = Vec::with_capacity(group_rows.len());
        for group in group_rows {
            groups.push(self.assemble_group(group, cache)?);
        }

        Ok(Invoice {
            id: row.id,
            address: row.address,
            date: day_to_date(row.date)?,
            pdf_filename: row.pdf_filename,
            groups,
        })
    }

    fn assemble_group(&mut self, group: GroupRow, cache: &mut JoinCache) -> Result<PurchaseGroup> {
        if group.clients_count < 1 {
            return Err(LedgerError::corrupted(format!(
                "purchase group {} records {} clients",
                group.id, group.clients_count
            )));
        }

        let mut relations = self.client_groups.query_index(group.id)?;
        expect_rows("extra clients of group", group.id, group.clients_count - 1, relations.len())?;
        relations.reverse();

        let mut clients = Vec::with_capacity(relations.len() + 1);
        clients.push(cache.client(&mut self.clients, group.first_client_id)?);
        for relation in relations {
            clients.push(cache.client(&mut self.clients, relation.client_id)?);
        }

        let mut purchase_rows = self.purchases.query_index(group.id)?;
        expect_rows("purchases of group", group.id, group.purchases_count, purchase_rows.len())?;
        purchase_rows.reverse();

        let mut purchases = Vec::with_capacity(purchase_rows.len());
        for row in purchase_rows {
            purchases.push(Purchase {
                item: cache.item(&mut self.items, row.item_id)?,
                count: row.count,
                from: row.from.map(day_to_date).transpose()?,
                to: row.to.map(day_to_date).transpose()?,
                date_mode: DateMode::from_u8(row.date_mode)?,
            });
        }

        Ok(PurchaseGroup {
            id: group.id,
            clients,
            purchases,
            stop_words: group.stop_words,
        })
    }
}

// =============================================================================
// Row Builders and Checks
// =============================================================================

fn invoice_row(invoice: &Invoice, id: i64) -> Result<InvoiceRow> {
    Ok(InvoiceRow {
        id,
        date: date_to_day(invoice.date),
        address: invoice.address.clone(),
        pdf_filename: invoice.pdf_filename.clone(),
        groups_count: count_column("groups_count", invoice.groups.len())?,
    })
}

fn purchase_row(purchase: &Purchase, group_id: i64, item_id: i64) -> PurchaseRow {
    PurchaseRow {
        group_id,
        item_id,
        count: purchase.count,
        from: purchase.from.map(date_to_day),
        to: purchase.to.map(date_to_day),
        date_mode: purchase.date_mode.as_u8(),
    }
}

fn count_column(column: &str, len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| LedgerError::invalid_value(column, format!("{} is too many", len)))
}

/// Validate every row an invoice would produce before anything is written
fn validate_invoice(invoice: &Invoice) -> Result<()> {
    invoice_row(invoice, 0)?.validate()?;

    for group in &invoice.groups {
        if group.clients.is_empty() {
            return Err(LedgerError::invalid_value(
                "clients",
                "a purchase group needs at least one client",
            ));
        }
        for client in &group.clients {
            ClientRow {
                id: 0,
                name: client.name.clone(),
            }
            .validate()?;
        }

        GroupRow {
            id: 0,
            invoice_id: 0,
            first_client_id: 0,
            clients_count: count_column("clients_count", group.clients.len())?,
            purchases_count: count_column("purchases_count", group.purchases.len())?,
            stop_words: group.stop_words.clone(),
        }
        .validate()?;

        for purchase in &group.purchases {
            purchase.item.to_row().validate()?;
            purchase_row(purchase, 0, 0).validate()?;
            validate_dates(purchase)?;
        }
    }
    Ok(())
}

fn validate_dates(purchase: &Purchase) -> Result<()> {
    match (purchase.date_mode, purchase.from, purchase.to) {
        (DateMode::Disabled, _, _) => Ok(()),
        (DateMode::Single, Some(_), _) => Ok(()),
        (DateMode::Range, Some(from), Some(to)) if from <= to => Ok(()),
        (DateMode::Range, Some(_), Some(_)) => {
            Err(LedgerError::invalid_value("to", "date range ends before it starts"))
        }
        (mode, _, _) => Err(LedgerError::invalid_value(
            "from",
            format!("date mode {:?} needs its dates", mode),
        )),
    }
}

fn expect_rows(what: &str, owner: i64, recorded: i32, found: usize) -> Result<()> {
    if recorded < 0 || recorded as usize != found {
        return Err(LedgerError::corrupted(format!(
            "{} {}: recorded {}, found {}",
            what, owner, recorded, found
        )));
    }
    Ok(())
}

fn check_counter<R: Record>(index: &mut PrimaryKeyIndex<R>) -> Result<()> {
    let max = index.max_id()?;
    if max > index.counter() {
        return Err(LedgerError::corrupted(format!(
            "'{}' is {} but '{}' holds id {}",
            index.counter_key(),
            index.counter(),
            index.table(),
            max
        )));
    }
    Ok(())
}

fn check_total(table: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LedgerError::corrupted(format!(
            "'{}' holds {} rows, parents account for {}",
            table, actual, expected
        )));
    }
    Ok(())
}

fn table_stats<R: Record>(index: &mut ClusteredIndex<R>) -> Result<TableStats> {
    Ok(TableStats {
        table: index.table(),
        records: index.count()?,
        partitions: index.partition_count(),
    })
}
