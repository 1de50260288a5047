//! Join cache
//!
//! Purchases reference items and groups reference clients by id. While one
//! read assembles aggregates, each referenced row is fetched once by a range
//! query on its id-clustered table and then shared.

use std::collections::HashMap;

use crate::error::{LedgerError, Result};
use crate::index::PrimaryKeyIndex;

use super::model::{Client, Item};
use super::rows::{ClientRow, ItemRow};

/// Per-read memo of resolved clients and items
#[derive(Debug, Default)]
pub struct JoinCache {
    clients: HashMap<i64, Client>,
    items: HashMap<i64, Item>,
}

impl JoinCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a client id; a dangling reference is corruption
    pub fn client(&mut self, table: &mut PrimaryKeyIndex<ClientRow>, id: i64) -> Result<Client> {
        if let Some(client) = self.clients.get(&id) {
            return Ok(client.clone());
        }

        let row = table.query_index(id)?.into_iter().next().ok_or_else(|| {
            LedgerError::corrupted(format!("purchase group references missing client {}", id))
        })?;
        let client = Client::from(row);
        self.clients.insert(id, client.clone());
        Ok(client)
    }

    /// Resolve an item id; a dangling reference is corruption
    pub fn item(&mut self, table: &mut PrimaryKeyIndex<ItemRow>, id: i64) -> Result<Item> {
        if let Some(item) = self.items.get(&id) {
            return Ok(item.clone());
        }

        let row = table.query_index(id)?.into_iter().next().ok_or_else(|| {
            LedgerError::corrupted(format!("purchase references missing item {}", id))
        })?;
        let item = Item::from(row);
        self.items.insert(id, item.clone());
        Ok(item)
    }

    /// Number of distinct rows resolved so far
    pub fn len(&self) -> usize {
        self.clients.len() + self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
