//! Read-only view of the menu. Menu editing belongs to menu management.

use rusqlite::{Connection, OptionalExtension};

use crate::db::Database;
use crate::error::{PosError, PosResult};
use crate::models::MenuItem;

const MENU_COLUMNS: &str = "id, name, price, category, available";

fn map_menu_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<MenuItem> {
    Ok(MenuItem {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        category: row.get(3)?,
        available: row.get(4)?,
    })
}

fn query_menu(conn: &Connection, filter: &str, params: &[&dyn rusqlite::ToSql]) -> PosResult<Vec<MenuItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MENU_COLUMNS} FROM menu_items {filter} ORDER BY name"
    ))?;

    let items = stmt
        .query_map(params, map_menu_item)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

pub fn get_menu_items(db: &Database) -> PosResult<Vec<MenuItem>> {
    let conn = db.lock();
    query_menu(&conn, "", &[])
}

pub fn get_available_menu_items(db: &Database) -> PosResult<Vec<MenuItem>> {
    let conn = db.lock();
    query_menu(&conn, "WHERE available = 1", &[])
}

/// Items in `category`; `"All"` returns the whole menu.
pub fn get_menu_items_by_category(db: &Database, category: &str) -> PosResult<Vec<MenuItem>> {
    let conn = db.lock();
    if category == "All" {
        return query_menu(&conn, "", &[]);
    }
    query_menu(&conn, "WHERE category = ?1", &[&category])
}

pub fn get_menu_item(db: &Database, id: i64) -> PosResult<MenuItem> {
    let conn = db.lock();
    conn.query_row(
        &format!("SELECT {MENU_COLUMNS} FROM menu_items WHERE id = ?1"),
        [id],
        map_menu_item,
    )
    .optional()?
    .ok_or_else(|| PosError::NotFound("Menu item".into()))
}

#[cfg(test)]
pub(crate) fn seed_menu(db: &Database) {
    db.lock()
        .execute_batch(
            "
            INSERT INTO menu_items (name, price, category, available) VALUES ('Jollof Rice', 800, 'Meals', 1);
            INSERT INTO menu_items (name, price, category, available) VALUES ('Coke', 300, 'Drinks', 1);
            INSERT INTO menu_items (name, price, category, available) VALUES ('Meat Pie', 500, 'Snacks', 1);
            INSERT INTO menu_items (name, price, category, available) VALUES ('Zobo', 200, 'Drinks', 0);
            ",
        )
        .unwrap();
}
