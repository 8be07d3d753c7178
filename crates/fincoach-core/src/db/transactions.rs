//! Transaction ledger operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, parse_enum, Database};
use crate::error::Result;
use crate::models::Transaction;

const TX_COLUMNS: &str = "id, user_id, tx_type, category, amount, occurred_at, note";

impl Database {
    /// Record a transaction. Returns false if the id was already recorded.
    pub fn insert_transaction(&self, tx: &Transaction) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO coach_transactions
                (id, user_id, tx_type, category, amount, occurred_at, note)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.id,
                tx.user_id,
                tx.tx_type.as_str(),
                tx.category,
                tx.amount,
                format_datetime(&tx.occurred_at),
                tx.note,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let tx_type: String = row.get(2)?;
        let occurred_at: String = row.get(5)?;
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            tx_type: parse_enum(2, &tx_type)?,
            category: row.get(3)?,
            amount: row.get(4)?,
            occurred_at: parse_datetime(5, &occurred_at)?,
            note: row.get(6)?,
        })
    }

    pub fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM coach_transactions WHERE id = ?", TX_COLUMNS);
        let tx = conn
            .query_row(&sql, params![id], Self::row_to_transaction)
            .optional()?;
        Ok(tx)
    }

    /// Transactions at or after `since`, newest first
    pub fn list_transactions_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        self.query_transactions(user_id, Some(since))
    }

    /// Every transaction for a user, newest first
    pub fn list_transactions(&self, user_id: &str) -> Result<Vec<Transaction>> {
        self.query_transactions(user_id, None)
    }

    fn query_transactions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM coach_transactions \
             WHERE user_id = ?1 AND (?2 IS NULL OR occurred_at >= ?2) \
             ORDER BY occurred_at DESC, id",
            TX_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let since = since.as_ref().map(format_datetime);
        let txs = stmt
            .query_map(params![user_id, since], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    pub fn count_transactions(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM coach_transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
