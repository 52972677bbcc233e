use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use crate::error::PosResult;
use crate::models::{OrderStatus, PaymentMethod, Role, Shift};

pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> PosResult<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(path)?;
        debug!("Opened database at {}", path.display());

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> PosResult<Self> {
        let db = Database {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Lock the connection. A panic in another holder leaves SQLite in a
    /// consistent state (open transactions roll back on drop), so poisoning
    /// is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn initialize(&self) -> PosResult<()> {
        let conn = self.lock();

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            -- Admin accounts (email/password)
            CREATE TABLE IF NOT EXISTS admin_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                name TEXT NOT NULL,
                role TEXT,
                created_by INTEGER,
                failed_attempts INTEGER NOT NULL DEFAULT 0,
                locked_until INTEGER,
                created_at INTEGER NOT NULL
            );

            -- Sessions issued on sign-in or code redemption
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id INTEGER,
                code TEXT,
                role TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                CHECK (expires_at > created_at)
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_code ON sessions(code);

            -- Access codes for terminal login
            CREATE TABLE IF NOT EXISTS access_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL CHECK (role IN ('cashier', 'admin')),
                shift TEXT,
                created_by INTEGER,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                used_count INTEGER NOT NULL DEFAULT 0,
                max_uses INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_access_codes_active ON access_codes(is_active);

            -- Menu, owned by menu management
            CREATE TABLE IF NOT EXISTS menu_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                price REAL NOT NULL,
                category TEXT NOT NULL,
                available INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_menu_items_category ON menu_items(category);

            -- Orders
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_number TEXT NOT NULL,
                total REAL NOT NULL,
                payment_method TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'completed',
                cashier TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            CREATE INDEX IF NOT EXISTS idx_orders_cashier ON orders(cashier);
            CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);

            -- Order items, captured by value at checkout
            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                menu_item_id INTEGER,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                price REAL NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 1),
                FOREIGN KEY (order_id) REFERENCES orders(id)
            );
            CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

            CREATE TRIGGER IF NOT EXISTS completed_orders_no_update
            BEFORE UPDATE ON orders WHEN OLD.status = 'completed'
            BEGIN
                SELECT RAISE(ABORT, 'completed orders are immutable');
            END;

            CREATE TRIGGER IF NOT EXISTS completed_orders_no_delete
            BEFORE DELETE ON orders WHEN OLD.status = 'completed'
            BEGIN
                SELECT RAISE(ABORT, 'completed orders are immutable');
            END;

            CREATE TRIGGER IF NOT EXISTS order_items_no_update
            BEFORE UPDATE ON order_items
            BEGIN
                SELECT RAISE(ABORT, 'order items are immutable');
            END;
            ",
        )?;

        // Run migrations for existing databases (pass connection to avoid deadlock)
        Self::migrate_conn(&conn)?;

        Ok(())
    }

    fn migrate_conn(conn: &Connection) -> PosResult<()> {
        let columns: Vec<String> = conn
            .prepare("PRAGMA table_info(admin_users)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(|r| r.ok())
            .collect();

        for (column, ddl) in [
            ("role", "ALTER TABLE admin_users ADD COLUMN role TEXT"),
            ("created_by", "ALTER TABLE admin_users ADD COLUMN created_by INTEGER"),
            (
                "failed_attempts",
                "ALTER TABLE admin_users ADD COLUMN failed_attempts INTEGER NOT NULL DEFAULT 0",
            ),
            ("locked_until", "ALTER TABLE admin_users ADD COLUMN locked_until INTEGER"),
        ] {
            if !columns.iter().any(|c| c == column) {
                conn.execute(ddl, [])?;
            }
        }

        // Accounts created before roles existed get one guessed from their identity
        let unassigned: Vec<(i64, String, String)> = conn
            .prepare("SELECT id, email, name FROM admin_users WHERE role IS NULL")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        for (id, email, name) in &unassigned {
            let role = guess_legacy_role(email, name);
            conn.execute(
                "UPDATE admin_users SET role = ?1 WHERE id = ?2",
                rusqlite::params![role, id],
            )?;
        }

        if !unassigned.is_empty() {
            info!("Assigned roles to {} legacy admin account(s)", unassigned.len());
        }

        Ok(())
    }
}

pub(crate) fn guess_legacy_role(email: &str, name: &str) -> Role {
    let email = email.to_lowercase();
    let name = name.to_lowercase();

    if email.contains("super") || name.contains("super") {
        Role::Superadmin
    } else if email.contains("vc") || name.contains("vc") {
        Role::Vc
    } else {
        Role::Manager
    }
}

pub(crate) fn millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

pub(crate) fn opt_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => time_at(row, idx).map(Some),
        None => Ok(None),
    }
}

macro_rules! text_column {
    ($($ty:ty),*) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    )*};
}

text_column!(Role, Shift, PaymentMethod, OrderStatus);
