//! Read-only sales statistics derived from completed orders.
//!
//! Rolling windows (`get_orders_stats`) are measured back from now. Calendar
//! buckets (weekly sales, shifts, day summaries) use the terminal's local
//! time zone, matching what is printed on receipts.
//!
//! Dashboards need `ViewAnalytics`; the printable day summary needs
//! `ExportReports`.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, Duration, Local, NaiveDate, NaiveTime, Timelike, Utc};
use rusqlite::Connection;

use crate::commands::auth::require_permission;
use crate::commands::orders::query_orders;
use crate::db::{millis, Database};
use crate::error::{PosError, PosResult};
use crate::models::{
    CategorySales, DailySales, DaySummary, Order, OrdersStats, PaymentMethod, PaymentTotal,
    Permission, ShiftTotals, ShiftWindow,
};
use crate::session::SessionContext;

const OTHER_CATEGORY: &str = "Other";

/// Morning runs 06:00 to 17:59, night covers the rest of the day.
pub fn shift_for_hour(hour: u32) -> ShiftWindow {
    if (6..18).contains(&hour) {
        ShiftWindow::Morning
    } else {
        ShiftWindow::Night
    }
}

/// Start of `date` in local time, as UTC.
fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match midnight.and_local_timezone(Local).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Midnight skipped by a DST jump
        None => midnight.and_utc(),
    }
}

fn next_day(date: NaiveDate) -> PosResult<NaiveDate> {
    date.checked_add_days(Days::new(1))
        .ok_or_else(|| PosError::Validation(format!("{date} is out of range")))
}

fn revenue_between(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> PosResult<(f64, i64)> {
    let totals = conn.query_row(
        "SELECT COALESCE(SUM(total), 0), COUNT(*)
         FROM orders
         WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2",
        [millis(from), millis(to)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(totals)
}

fn completed_between(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> PosResult<Vec<Order>> {
    query_orders(
        conn,
        "WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2
         ORDER BY created_at DESC, id DESC",
        &[&millis(from), &millis(to)],
    )
}

fn average(revenue: f64, orders: i64) -> f64 {
    if orders > 0 {
        revenue / orders as f64
    } else {
        0.0
    }
}

/// Signed percentage change, `"+0%"` when there is nothing to compare with.
fn percent_change(current: f64, previous: f64) -> String {
    if previous > 0.0 {
        format!("{:+.1}%", (current - previous) / previous * 100.0)
    } else {
        "+0%".to_string()
    }
}

pub fn get_orders_stats(db: &Database, ctx: &SessionContext) -> PosResult<OrdersStats> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ViewAnalytics)?;
    let now = Utc::now();

    let (_, daily_customers) = revenue_between(&conn, now - Duration::days(1), now)?;
    let (revenue, orders) = revenue_between(&conn, now - Duration::days(7), now)?;
    let (last_revenue, last_orders) =
        revenue_between(&conn, now - Duration::days(14), now - Duration::days(7))?;

    let avg = average(revenue, orders);
    let last_avg = average(last_revenue, last_orders);

    Ok(OrdersStats {
        total_revenue: revenue,
        revenue_change: percent_change(revenue, last_revenue),
        total_orders: orders,
        orders_change: percent_change(orders as f64, last_orders as f64),
        avg_order_value: avg.round() as i64,
        avg_change: percent_change(avg, last_avg),
        daily_customers,
    })
}

/// The last seven local days, oldest first. Days without sales are included.
pub fn get_weekly_sales(db: &Database, ctx: &SessionContext) -> PosResult<Vec<DailySales>> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ViewAnalytics)?;

    let today = Local::now().date_naive();
    let first = today
        .checked_sub_days(Days::new(6))
        .ok_or_else(|| PosError::Validation(format!("{today} is out of range")))?;

    let mut days: BTreeMap<NaiveDate, (f64, i64)> =
        first.iter_days().take(7).map(|date| (date, (0.0, 0))).collect();

    for order in completed_between(&conn, local_midnight(first), local_midnight(next_day(today)?))? {
        let date = order.created_at.with_timezone(&Local).date_naive();
        if let Some((revenue, orders)) = days.get_mut(&date) {
            *revenue += order.total;
            *orders += 1;
        }
    }

    Ok(days
        .into_iter()
        .map(|(date, (revenue, orders))| DailySales {
            date,
            weekday: date.format("%a").to_string(),
            revenue,
            orders,
        })
        .collect())
}

/// Revenue per menu category over the last seven days, largest first.
/// Custom items and items no longer on the menu count as "Other".
pub fn get_category_sales(db: &Database, ctx: &SessionContext) -> PosResult<Vec<CategorySales>> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ViewAnalytics)?;
    let since = Utc::now() - Duration::days(7);

    let mut stmt = conn.prepare(
        "SELECT COALESCE(m.category, ?2), SUM(oi.price * oi.quantity)
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         LEFT JOIN menu_items m ON m.id = oi.menu_item_id
         WHERE o.status = 'completed' AND o.created_at >= ?1
         GROUP BY 1
         ORDER BY 2 DESC, 1",
    )?;

    let totals: Vec<(String, f64)> = stmt
        .query_map(rusqlite::params![millis(since), OTHER_CATEGORY], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let grand_total: f64 = totals.iter().map(|(_, amount)| amount).sum();

    Ok(totals
        .into_iter()
        .map(|(category, amount)| CategorySales {
            percentage: if grand_total > 0.0 {
                (amount / grand_total * 100.0).round() as i64
            } else {
                0
            },
            category,
            amount,
        })
        .collect())
}

fn shift_totals(shift: ShiftWindow, orders: &[&Order]) -> ShiftTotals {
    let payments = PaymentMethod::ALL
        .into_iter()
        .map(|method| {
            let paid: Vec<_> = orders
                .iter()
                .filter(|order| order.payment_method == method)
                .collect();
            PaymentTotal {
                method,
                orders: paid.len() as i64,
                amount: paid.iter().map(|order| order.total).sum(),
            }
        })
        .collect();

    ShiftTotals {
        shift,
        revenue: orders.iter().map(|order| order.total).sum(),
        orders: orders.len() as i64,
        payments,
    }
}

fn split_shifts(orders: &[Order]) -> (ShiftTotals, ShiftTotals) {
    let (morning, night): (Vec<&Order>, Vec<&Order>) = orders.iter().partition(|order| {
        shift_for_hour(order.created_at.with_timezone(&Local).hour()) == ShiftWindow::Morning
    });

    (
        shift_totals(ShiftWindow::Morning, &morning),
        shift_totals(ShiftWindow::Night, &night),
    )
}

fn orders_on(conn: &Connection, date: NaiveDate) -> PosResult<Vec<Order>> {
    completed_between(conn, local_midnight(date), local_midnight(next_day(date)?))
}

/// Morning and night totals for one local calendar day.
pub fn get_shift_breakdown(
    db: &Database,
    ctx: &SessionContext,
    date: NaiveDate,
) -> PosResult<Vec<ShiftTotals>> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ViewAnalytics)?;
    let orders = orders_on(&conn, date)?;
    let (morning, night) = split_shifts(&orders);
    Ok(vec![morning, night])
}

/// Everything sold on `date` (today when `None`), newest order first.
pub fn get_day_summary(
    db: &Database,
    ctx: &SessionContext,
    date: Option<NaiveDate>,
) -> PosResult<DaySummary> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ExportReports)?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());

    let orders = orders_on(&conn, date)?;
    let (morning, night) = split_shifts(&orders);

    Ok(DaySummary {
        date,
        total_revenue: orders.iter().map(|order| order.total).sum(),
        total_orders: orders.len() as i64,
        morning,
        night,
        orders,
    })
}
