//! Checkout for one terminal.
//!
//! A [`Register`] pairs the terminal's cart with whoever is signed in. Orders
//! are written before the cart is cleared, so a failed write never loses the
//! customer's items.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cart::Cart;
use crate::commands::access_codes::masked;
use crate::commands::auth::require_permission;
use crate::commands::orders::insert_order;
use crate::commands::users::read_admin;
use crate::db::Database;
use crate::error::{PosError, PosResult};
use crate::models::{NewOrder, Order, OrderItem, PaymentMethod, Permission};
use crate::session::SessionContext;

/// Completed orders a register keeps in memory. Older ones stay in the database.
pub const RECENT_ORDERS: usize = 50;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Display token such as `ORD-M1ABCD2E`. Sorts with time; the database key
/// identifies the order.
pub fn order_number(at: DateTime<Utc>) -> String {
    let mut n = at.timestamp_millis().unsigned_abs();
    let mut digits = Vec::new();
    loop {
        digits.push(BASE36[(n % 36) as usize] as char);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    format!("ORD-{}", digits.iter().rev().collect::<String>())
}

#[derive(Debug, Default)]
pub struct Register {
    cart: Cart,
    session: SessionContext,
    completed: VecDeque<Order>,
}

impl Register {
    pub fn new(session: SessionContext) -> Self {
        Self {
            cart: Cart::new(),
            session,
            completed: VecDeque::new(),
        }
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut Cart {
        &mut self.cart
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Hand the terminal to someone else. The cart stays as it is.
    pub fn set_session(&mut self, session: SessionContext) {
        self.session = session;
    }

    /// The last [`RECENT_ORDERS`] orders completed on this terminal, most
    /// recent first.
    pub fn completed_orders(&self) -> &VecDeque<Order> {
        &self.completed
    }

    /// Persist the cart as a completed order paid with `method`.
    ///
    /// The cart is cleared only once the order is committed. On any error it
    /// is left exactly as it was, ready for another attempt.
    pub fn complete_order(&mut self, db: &Database, method: PaymentMethod) -> PosResult<Order> {
        if self.cart.is_empty() {
            return Err(PosError::EmptyCart);
        }

        let mut conn = db.lock();
        let session = match require_permission(&conn, &self.session, Permission::ProcessOrders) {
            Ok(session) => session,
            Err(e) => {
                warn!("Checkout refused: {e}");
                return Err(e);
            }
        };

        let cashier = match (&session.code, session.user_id) {
            (Some(code), _) => code.clone(),
            (None, Some(user_id)) => read_admin(&conn, user_id)?
                .map(|user| user.email)
                .ok_or(PosError::NotAuthenticated)?,
            (None, None) => return Err(PosError::NotAuthenticated),
        };

        let items = self.cart.snapshot();
        let total = items.iter().map(OrderItem::subtotal).sum();
        let now = Utc::now();

        let order = insert_order(
            &mut conn,
            NewOrder {
                order_number: order_number(now),
                items,
                total,
                payment_method: method,
                cashier,
                created_at: now,
            },
        )?;
        drop(conn);

        self.cart.clear();
        self.completed.push_front(order.clone());
        self.completed.truncate(RECENT_ORDERS);

        info!(
            "Checkout {} by {} complete",
            order.order_number,
            match &session.code {
                Some(code) => masked(code),
                None => order.cashier.clone(),
            }
        );

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::cart::ItemId;
    use crate::commands::access_codes::{generate_access_code, redeem_code};
    use crate::commands::auth::{sign_out, sign_up};
    use crate::commands::menu::{get_menu_item, seed_menu};
    use crate::commands::orders::get_order;
    use crate::config::Config;
    use crate::db::millis;
    use crate::models::{AuthOutcome, GenerateCode, OrderStatus, SignUp};

    fn superadmin(db: &Database) -> AuthOutcome {
        sign_up(
            db,
            &Config::default(),
            SignUp {
                email: "root@uni.edu".into(),
                password: "Jollof2024".into(),
                name: "Root".into(),
            },
        )
        .unwrap()
    }

    /// Register signed in with a freshly redeemed cashier code.
    fn cashier_register(db: &Database) -> Register {
        let root = SessionContext::from_auth(&superadmin(db));
        let config = Config::default();
        let code = generate_access_code(db, &config, &root, GenerateCode::cashier()).unwrap();
        let redemption = redeem_code(db, &config, &code.code).unwrap();
        Register::new(SessionContext::from_redemption(&redemption))
    }

    fn fill_cart(db: &Database, register: &mut Register) {
        let jollof = get_menu_item(db, 1).unwrap();
        let coke = get_menu_item(db, 2).unwrap();
        let cart = register.cart_mut();
        cart.add_item(&jollof);
        cart.add_item(&jollof);
        cart.add_item(&coke);
    }

    fn order_count(db: &Database) -> i64 {
        db.lock()
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn order_numbers_are_base36_millis() {
        let at = DateTime::from_timestamp_millis(36 * 36 + 35).unwrap();
        assert_eq!(order_number(at), "ORD-10Z");
        assert_eq!(order_number(DateTime::from_timestamp_millis(0).unwrap()), "ORD-0");
    }

    #[test]
    fn checkout_persists_and_clears_cart() {
        let db = Database::open_in_memory().unwrap();
        seed_menu(&db);
        let mut register = cashier_register(&db);
        fill_cart(&db, &mut register);
        assert_eq!(register.cart().total(), 1900.0);

        let order = register.complete_order(&db, PaymentMethod::Cash).unwrap();

        assert!(register.cart().is_empty());
        assert_eq!(order.total, 1900.0);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(Some(&order.cashier), register.session().code.as_ref());
        assert_eq!(register.completed_orders()[0], order);

        let stored = get_order(&db, order.id).unwrap();
        assert_eq!(stored.items, order.items);
        assert_eq!(stored.total, order.total);
        assert_eq!(stored.order_number, order.order_number);
    }

    #[test]
    fn later_cart_changes_do_not_touch_emitted_order() {
        let db = Database::open_in_memory().unwrap();
        seed_menu(&db);
        let mut register = cashier_register(&db);
        fill_cart(&db, &mut register);

        let order = register.complete_order(&db, PaymentMethod::Card).unwrap();
        register.cart_mut().add_item(&get_menu_item(&db, 3).unwrap());
        register.cart_mut().update_quantity(&ItemId::Menu(3), 4);

        assert_eq!(order.items.len(), 2);
        assert_eq!(get_order(&db, order.id).unwrap().total, 1900.0);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut register = cashier_register(&db);

        assert!(matches!(
            register.complete_order(&db, PaymentMethod::Cash),
            Err(PosError::EmptyCart)
        ));
        assert_eq!(order_count(&db), 0);
    }

    #[test]
    fn anonymous_terminal_cannot_check_out() {
        let db = Database::open_in_memory().unwrap();
        seed_menu(&db);
        let mut register = Register::new(SessionContext::anonymous());
        fill_cart(&db, &mut register);

        assert!(matches!(
            register.complete_order(&db, PaymentMethod::Cash),
            Err(PosError::NotAuthenticated)
        ));
        assert_eq!(register.cart().item_count(), 3);
    }

    #[test]
    fn expired_session_keeps_cart() {
        let db = Database::open_in_memory().unwrap();
        seed_menu(&db);
        let mut register = cashier_register(&db);
        fill_cart(&db, &mut register);

        let now = Utc::now();
        db.lock()
            .execute(
                "UPDATE sessions SET created_at = ?1, expires_at = ?2",
                [millis(now - Duration::hours(9)), millis(now - Duration::hours(1))],
            )
            .unwrap();

        assert!(matches!(
            register.complete_order(&db, PaymentMethod::Cash),
            Err(PosError::NotAuthenticated)
        ));
        assert_eq!(register.cart().total(), 1900.0);
        assert_eq!(order_count(&db), 0);
    }

    #[test]
    fn failed_write_keeps_cart() {
        let db = Database::open_in_memory().unwrap();
        seed_menu(&db);
        let mut register = cashier_register(&db);
        fill_cart(&db, &mut register);

        db.lock().execute_batch("DROP TABLE order_items").unwrap();

        let err = register.complete_order(&db, PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, PosError::Storage(_)));
        assert_eq!(register.cart().item_count(), 3);
        assert!(register.completed_orders().is_empty());
        assert_eq!(order_count(&db), 0);
    }

    #[test]
    fn register_keeps_only_recent_orders() {
        let db = Database::open_in_memory().unwrap();
        seed_menu(&db);
        let mut register = cashier_register(&db);
        let coke = get_menu_item(&db, 2).unwrap();

        let mut last = None;
        for _ in 0..RECENT_ORDERS + 3 {
            register.cart_mut().add_item(&coke);
            last = Some(register.complete_order(&db, PaymentMethod::Cash).unwrap());
        }

        assert_eq!(register.completed_orders().len(), RECENT_ORDERS);
        assert_eq!(register.completed_orders().front(), last.as_ref());
        assert_eq!(order_count(&db), (RECENT_ORDERS + 3) as i64);
    }

    #[test]
    fn admin_checkout_records_email() {
        let db = Database::open_in_memory().unwrap();
        seed_menu(&db);
        let outcome = superadmin(&db);
        let mut register = Register::new(SessionContext::from_auth(&outcome));
        fill_cart(&db, &mut register);

        let order = register.complete_order(&db, PaymentMethod::Transfer).unwrap();
        assert_eq!(order.cashier, "root@uni.edu");

        sign_out(&db, &outcome.session.id).unwrap();
        fill_cart(&db, &mut register);
        assert!(register.complete_order(&db, PaymentMethod::Cash).is_err());
        assert!(!register.cart().is_empty());
    }
}
