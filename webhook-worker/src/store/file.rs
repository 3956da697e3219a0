//! JSON-file backed webhook store.
//!
//! Keeps the tables in memory and persists them under the data directory:
//! - `webhooks.json` holds the webhook table plus the highest ids handed out.
//!   It is small and rewritten through a temporary file and rename.
//! - `deliveries.jsonl` is an append-only log with one delivery row per line.
//!   Each insert or update appends the row's latest state; the last line for
//!   an id wins on load. The log is compacted on open and when a webhook
//!   delete cascades.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::memory::{lock, LastIds, Tables};
use super::WebhookStore;
use crate::error::{Result, WebhookError};
use crate::models::{NewDelivery, NewWebhook, Webhook, WebhookDelivery};

const WEBHOOKS_FILE: &str = "webhooks.json";
const DELIVERIES_FILE: &str = "deliveries.jsonl";

#[derive(Debug, Default, Serialize, Deserialize)]
struct WebhooksTable {
    #[serde(default)]
    last_ids: LastIds,
    #[serde(default)]
    webhooks: Vec<Webhook>,
}

pub struct FileStore {
    tables: Mutex<Tables>,
    data_dir: PathBuf,
}

impl FileStore {
    /// Open the store in `data_dir`, creating the directory if needed and
    /// loading any existing tables.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let table = read_webhooks(&data_dir.join(WEBHOOKS_FILE))?;
        let deliveries = read_delivery_log(&data_dir.join(DELIVERIES_FILE))?;

        let tables = Tables::from_rows(table.webhooks, deliveries, table.last_ids);

        let store = Self {
            tables: Mutex::new(tables),
            data_dir,
        };

        {
            let tables = lock(&store.tables)?;
            store.compact_deliveries(&tables)?;

            info!(
                data_dir = %store.data_dir.display(),
                webhooks = tables.webhooks.len(),
                deliveries = tables.deliveries.len(),
                "file_store_opened"
            );
        }

        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn save_webhooks(&self, tables: &Tables) -> Result<()> {
        let table = WebhooksTable {
            last_ids: tables.last_ids(),
            webhooks: tables.webhooks.values().cloned().collect(),
        };
        let content = serde_json::to_vec_pretty(&table)?;
        replace_file(&self.data_dir.join(WEBHOOKS_FILE), &content)
    }

    fn append_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        let mut line = serde_json::to_vec(delivery)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join(DELIVERIES_FILE))?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Rewrite the delivery log with one line per live row.
    fn compact_deliveries(&self, tables: &Tables) -> Result<()> {
        let mut content = Vec::new();
        for delivery in tables.deliveries.values() {
            serde_json::to_writer(&mut content, delivery)?;
            content.push(b'\n');
        }
        replace_file(&self.data_dir.join(DELIVERIES_FILE), &content)
    }
}

fn read_webhooks(path: &Path) -> Result<WebhooksTable> {
    if !path.exists() {
        return Ok(WebhooksTable::default());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        warn!(path = %path.display(), "file_store_empty_table");
        return Ok(WebhooksTable::default());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Replay the delivery log. A torn final line (crash mid-append) is skipped;
/// corruption anywhere else is an error.
fn read_delivery_log(path: &Path) -> Result<Vec<WebhookDelivery>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

    let mut rows = std::collections::BTreeMap::new();
    for (index, line) in lines.iter().enumerate() {
        match serde_json::from_str::<WebhookDelivery>(line) {
            Ok(row) => {
                rows.insert(row.id, row);
            }
            Err(e) if index + 1 == lines.len() => {
                warn!(path = %path.display(), error = %e, "file_store_torn_delivery_line");
            }
            Err(e) => {
                return Err(WebhookError::Storage(format!(
                    "corrupt delivery log line {}: {e}",
                    index + 1
                )));
            }
        }
    }
    Ok(rows.into_values().collect())
}

fn replace_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl WebhookStore for FileStore {
    fn insert_webhook(&self, webhook: NewWebhook) -> Result<Webhook> {
        let mut tables = lock(&self.tables)?;
        let webhook = tables.insert_webhook(webhook);
        self.save_webhooks(&tables)?;
        Ok(webhook)
    }

    fn update_webhook(&self, id: u64, webhook: NewWebhook) -> Result<Webhook> {
        let mut tables = lock(&self.tables)?;
        let webhook = tables.update_webhook(id, webhook)?;
        self.save_webhooks(&tables)?;
        Ok(webhook)
    }

    fn get_webhook(&self, id: u64) -> Result<Webhook> {
        lock(&self.tables)?.get_webhook(id)
    }

    fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        Ok(lock(&self.tables)?.webhooks.values().cloned().collect())
    }

    fn active_webhooks(
        &self,
        organization_id: Option<u64>,
        include_global: bool,
    ) -> Result<Vec<Webhook>> {
        Ok(lock(&self.tables)?.active_webhooks(organization_id, include_global))
    }

    fn set_active(&self, id: u64, active: bool) -> Result<Webhook> {
        let mut tables = lock(&self.tables)?;
        let webhook = tables.set_active(id, active)?;
        self.save_webhooks(&tables)?;
        Ok(webhook)
    }

    fn delete_webhook(&self, id: u64) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        tables.delete_webhook(id)?;
        self.save_webhooks(&tables)?;
        self.compact_deliveries(&tables)
    }

    fn insert_delivery(&self, delivery: NewDelivery) -> Result<WebhookDelivery> {
        let mut tables = lock(&self.tables)?;
        let delivery = tables.insert_delivery(delivery)?;
        self.append_delivery(&delivery)?;
        Ok(delivery)
    }

    fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        tables.update_delivery(delivery)?;
        self.append_delivery(delivery)
    }

    fn get_delivery(&self, id: u64) -> Result<WebhookDelivery> {
        lock(&self.tables)?.get_delivery(id)
    }

    fn list_deliveries(&self, webhook_id: u64, limit: usize) -> Result<Vec<WebhookDelivery>> {
        Ok(lock(&self.tables)?.list_deliveries(webhook_id, limit))
    }
}
