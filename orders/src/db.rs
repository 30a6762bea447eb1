use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

const ORDER_COLUMNS: &str = "id, product, model, price, amount, weight, first_name, last_name,
                             address, telegram_id, timezone, locale";

/// SQLite store of customer orders, keyed for lookup by delivery address.
pub struct OrderDb {
    conn: Mutex<Connection>,
}

impl OrderDb {
    /// Open (or create) the order database at `path`.
    /// Creates the parent directory if it does not exist.
    pub fn open(path: &Path) -> SqlResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|_e| rusqlite::Error::InvalidPath(dir.into()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let db = Self::init(conn)?;
        info!(path = path.display().to_string(), "order database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> SqlResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS orders (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                product     TEXT    NOT NULL,
                model       TEXT,
                price       REAL    NOT NULL,
                amount      INTEGER NOT NULL DEFAULT 1,
                weight      REAL    NOT NULL,
                first_name  TEXT    NOT NULL,
                last_name   TEXT    NOT NULL,
                address     TEXT    NOT NULL,
                telegram_id INTEGER NOT NULL,
                timezone    TEXT    NOT NULL DEFAULT 'UTC',
                locale      TEXT    NOT NULL DEFAULT 'en_US'
            );
            CREATE INDEX IF NOT EXISTS idx_orders_address ON orders(address);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert an order. Returns the new row id.
    pub fn insert(&self, order: &NewOrder) -> SqlResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO orders (product, model, price, amount, weight, first_name, last_name,
                                 address, telegram_id, timezone, locale)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                order.product,
                order.model,
                order.price,
                order.amount,
                order.weight,
                order.first_name,
                order.last_name,
                order.address,
                order.telegram_id,
                order.timezone,
                order.locale
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, address = order.address, "inserted order");
        Ok(id)
    }

    /// The first order (lowest id) shipped to `address`.
    pub fn find_by_address(&self, address: &str) -> SqlResult<Option<Order>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE address = ?1 ORDER BY id ASC LIMIT 1"
        ))?;
        stmt.query_row(params![address], row_to_order).optional()
    }

    /// Every distinct delivery address on record.
    pub fn addresses(&self) -> SqlResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT address FROM orders ORDER BY address")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }
}

fn row_to_order(row: &rusqlite::Row<'_>) -> SqlResult<Order> {
    Ok(Order {
        id: row.get(0)?,
        product: row.get(1)?,
        model: row.get(2)?,
        price: row.get(3)?,
        amount: row.get(4)?,
        weight: row.get(5)?,
        first_name: row.get(6)?,
        last_name: row.get(7)?,
        address: row.get(8)?,
        telegram_id: row.get(9)?,
        timezone: row.get(10)?,
        locale: row.get(11)?,
    })
}

// ── Data types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub product: String,
    pub model: Option<String>,
    /// Euros.
    pub price: f64,
    pub amount: i64,
    /// Kilograms.
    pub weight: f64,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub telegram_id: i64,
    pub timezone: String,
    pub locale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub product: String,
    pub model: Option<String>,
    pub price: f64,
    pub amount: i64,
    pub weight: f64,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub telegram_id: i64,
    pub timezone: String,
    pub locale: String,
}

#[cfg(test)]
pub(crate) fn sample_order(address: &str, locale: &str) -> NewOrder {
    NewOrder {
        product: "Headphones".into(),
        model: Some("WH-1000XM4".into()),
        price: 249.9,
        amount: 1,
        weight: 0.254,
        first_name: "Alex".into(),
        last_name: "Doe".into(),
        address: address.into(),
        telegram_id: 1001,
        timezone: "Europe/Berlin".into(),
        locale: locale.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_by_address() {
        let db = OrderDb::open_in_memory().unwrap();
        let id = db.insert(&sample_order("123 Main St", "en_US")).unwrap();

        let order = db.find_by_address("123 Main St").unwrap().unwrap();
        assert_eq!(order.id, id);
        assert_eq!(order.product, "Headphones");
        assert_eq!(order.model.as_deref(), Some("WH-1000XM4"));
        assert_eq!(order.telegram_id, 1001);
    }

    #[test]
    fn unknown_address_is_none() {
        let db = OrderDb::open_in_memory().unwrap();
        db.insert(&sample_order("123 Main St", "en_US")).unwrap();
        assert!(db.find_by_address("9 Elm Rd").unwrap().is_none());
    }

    #[test]
    fn duplicate_address_returns_oldest_order() {
        let db = OrderDb::open_in_memory().unwrap();
        let first = db.insert(&sample_order("5 Oak Ave", "en_US")).unwrap();
        db.insert(&sample_order("5 Oak Ave", "ru_RU")).unwrap();
        assert_eq!(db.find_by_address("5 Oak Ave").unwrap().unwrap().id, first);
    }

    #[test]
    fn addresses_are_distinct() {
        let db = OrderDb::open_in_memory().unwrap();
        db.insert(&sample_order("B St", "en_US")).unwrap();
        db.insert(&sample_order("A St", "en_US")).unwrap();
        db.insert(&sample_order("B St", "en_US")).unwrap();
        assert_eq!(db.addresses().unwrap(), vec!["A St".to_string(), "B St".to_string()]);
    }
}
