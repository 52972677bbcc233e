use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::info;

use crate::db::{millis, time_at, Database};
use crate::error::{PosError, PosResult};
use crate::models::{NewOrder, Order, OrderItem, OrderStatus};

const ORDER_COLUMNS: &str = "id, order_number, total, payment_method, status, cashier, created_at";

/// Write the order row and all of its line items in one transaction.
/// Either everything lands or nothing does.
pub(crate) fn insert_order(conn: &mut Connection, order: NewOrder) -> PosResult<Order> {
    // Stored with millisecond precision; the returned order must match a re-read
    let created_at = order.created_at.trunc_subsecs(3);
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO orders (order_number, total, payment_method, status, cashier, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            order.order_number,
            order.total,
            order.payment_method,
            OrderStatus::Completed,
            order.cashier,
            millis(created_at)
        ],
    )?;
    let order_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO order_items (order_id, menu_item_id, name, category, price, quantity) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for item in &order.items {
            stmt.execute(rusqlite::params![
                order_id,
                item.menu_item_id,
                item.name,
                item.category,
                item.price,
                item.quantity
            ])?;
        }
    }

    tx.commit()?;

    info!(
        "Stored order {} ({} items, total {:.2}, {})",
        order.order_number,
        order.items.len(),
        order.total,
        order.payment_method.as_str()
    );

    Ok(Order {
        id: order_id,
        order_number: order.order_number,
        items: order.items,
        total: order.total,
        payment_method: order.payment_method,
        status: OrderStatus::Completed,
        cashier: order.cashier,
        created_at,
    })
}

fn map_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        items: Vec::new(),
        total: row.get(2)?,
        payment_method: row.get(3)?,
        status: row.get(4)?,
        cashier: row.get(5)?,
        created_at: time_at(row, 6)?,
    })
}

fn load_items(conn: &Connection, order_id: i64) -> PosResult<Vec<OrderItem>> {
    let mut stmt = conn.prepare_cached(
        "SELECT menu_item_id, name, category, price, quantity
         FROM order_items
         WHERE order_id = ?1
         ORDER BY id",
    )?;

    let items = stmt
        .query_map([order_id], |row| {
            Ok(OrderItem {
                menu_item_id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                price: row.get(3)?,
                quantity: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Orders matching `filter`, each with its line items attached.
pub(crate) fn query_orders(
    conn: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
) -> PosResult<Vec<Order>> {
    let mut stmt = conn.prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders {filter}"))?;

    let mut orders = stmt
        .query_map(params, map_order)?
        .collect::<Result<Vec<_>, _>>()?;

    for order in &mut orders {
        order.items = load_items(conn, order.id)?;
    }

    Ok(orders)
}

pub fn get_order(db: &Database, id: i64) -> PosResult<Order> {
    let conn = db.lock();

    let mut order = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            [id],
            map_order,
        )
        .optional()?
        .ok_or_else(|| PosError::NotFound("Order".into()))?;
    order.items = load_items(&conn, id)?;

    Ok(order)
}

/// Newest first. Defaults to the last 10 orders.
pub fn get_recent_orders(db: &Database, limit: Option<u32>) -> PosResult<Vec<Order>> {
    let conn = db.lock();
    let limit = limit.unwrap_or(10);

    query_orders(
        &conn,
        "ORDER BY created_at DESC, id DESC LIMIT ?1",
        &[&limit],
    )
}

/// Orders created in `[from, to)`, oldest first.
pub fn get_orders_between(
    db: &Database,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> PosResult<Vec<Order>> {
    let conn = db.lock();

    query_orders(
        &conn,
        "WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at, id",
        &[&millis(from), &millis(to)],
    )
}

pub fn get_orders_by_cashier(db: &Database, cashier: &str) -> PosResult<Vec<Order>> {
    let conn = db.lock();

    query_orders(
        &conn,
        "WHERE cashier = ?1 ORDER BY created_at DESC, id DESC",
        &[&cashier],
    )
}
