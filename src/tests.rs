//! End-to-end scenarios across access codes, sessions, checkout and reports.
//! These tests use an in-memory SQLite database unless a file is the point.

#[cfg(test)]
mod tests {
    use chrono::{Local, Utc};
    use rusqlite::Connection;

    use crate::commands::access_codes::{
        deactivate_access_code, generate_access_code, list_access_codes, redeem_code,
        validate_code,
    };
    use crate::commands::auth::{current_user, sign_in, sign_out, sign_up};
    use crate::commands::menu::{get_available_menu_items, get_menu_item, seed_menu};
    use crate::commands::orders::{get_orders_by_cashier, get_recent_orders};
    use crate::commands::reports::{get_category_sales, get_day_summary, get_orders_stats};
    use crate::models::{
        CodeRejection, GenerateCode, PaymentMethod, Role, SignIn, SignUp,
    };
    use crate::{open, Config, Database, PosError, Register, SessionContext};

    fn setup() -> (Database, Config) {
        let db = Database::open_in_memory().expect("Failed to create in-memory database");
        seed_menu(&db);
        (db, Config::default())
    }

    fn register_admin(db: &Database, config: &Config, email: &str) -> SessionContext {
        let outcome = sign_up(
            db,
            config,
            SignUp {
                email: email.into(),
                password: "Jollof2024".into(),
                name: "Canteen Admin".into(),
            },
        )
        .unwrap();
        SessionContext::from_auth(&outcome)
    }

    // ===== CASHIER SHIFT =====

    #[test]
    fn test_cashier_shift_from_code_to_report() {
        let (db, config) = setup();
        let root = register_admin(&db, &config, "root@uni.edu");

        let code = generate_access_code(
            &db,
            &config,
            &root,
            GenerateCode {
                max_uses: Some(1),
                ..GenerateCode::cashier()
            },
        )
        .unwrap();

        // Typed in lower case at the terminal
        let redemption = redeem_code(&db, &config, &code.code.to_lowercase()).unwrap();
        assert_eq!(redemption.role, Role::Cashier);

        let again = redeem_code(&db, &config, &code.code);
        assert!(matches!(again, Err(PosError::Code(CodeRejection::Exhausted))));

        let mut register = Register::new(SessionContext::from_redemption(&redemption));
        let jollof = get_menu_item(&db, 1).unwrap();
        let coke = get_menu_item(&db, 2).unwrap();
        register.cart_mut().add_item(&jollof);
        register.cart_mut().add_item(&jollof);
        register.cart_mut().add_item(&coke);
        assert_eq!(register.cart().total(), 1900.0);
        assert_eq!(register.cart().item_count(), 3);

        let order = register.complete_order(&db, PaymentMethod::Cash).unwrap();
        assert!(register.cart().is_empty());
        assert_eq!(order.total, 1900.0);
        assert_eq!(order.items.len(), 2);

        let recent = get_recent_orders(&db, None).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0], order);
        assert_eq!(get_orders_by_cashier(&db, &code.code).unwrap().len(), 1);

        let stats = get_orders_stats(&db, &root).unwrap();
        assert_eq!(stats.total_revenue, 1900.0);
        assert_eq!(stats.daily_customers, 1);

        let categories = get_category_sales(&db, &root).unwrap();
        assert_eq!(categories[0].category, "Meals");
        assert_eq!(categories[0].amount, 1600.0);
        assert_eq!(categories[1].category, "Drinks");

        let date = order.created_at.with_timezone(&Local).date_naive();
        let today = get_day_summary(&db, &root, Some(date)).unwrap();
        assert_eq!(today.total_revenue, 1900.0);
        assert_eq!(today.morning.orders + today.night.orders, 1);
    }

    #[test]
    fn test_custom_item_checkout() {
        let (db, config) = setup();
        let root = register_admin(&db, &config, "root@uni.edu");
        let code = generate_access_code(&db, &config, &root, GenerateCode::cashier()).unwrap();
        let redemption = redeem_code(&db, &config, &code.code).unwrap();
        let mut register = Register::new(SessionContext::from_redemption(&redemption));

        let pie = get_menu_item(&db, 3).unwrap();
        register.cart_mut().add_item(&pie);
        register
            .cart_mut()
            .add_custom_item("Takeaway pack", 150.0, "")
            .unwrap();

        let order = register.complete_order(&db, PaymentMethod::Transfer).unwrap();
        assert_eq!(order.total, 650.0);
        assert_eq!(order.items[1].menu_item_id, None);

        let categories = get_category_sales(&db, &root).unwrap();
        let other = categories.iter().find(|c| c.category == "Other").unwrap();
        assert_eq!(other.amount, 150.0);
    }

    #[test]
    fn test_unavailable_items_are_not_offered() {
        let (db, _) = setup();
        let offered = get_available_menu_items(&db).unwrap();
        assert!(offered.iter().all(|item| item.name != "Zobo"));
    }

    // ===== ACCESS CODES =====

    #[test]
    fn test_validate_and_redeem_agree_after_deactivation() {
        let (db, config) = setup();
        let root = register_admin(&db, &config, "root@uni.edu");
        let code = generate_access_code(&db, &config, &root, GenerateCode::cashier()).unwrap();

        assert!(validate_code(&db, &code.code).unwrap().valid);
        deactivate_access_code(&db, &root, code.id).unwrap();

        let validation = validate_code(&db, &code.code).unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.reason, Some(CodeRejection::Deactivated));
        assert!(matches!(
            redeem_code(&db, &config, &code.code),
            Err(PosError::Code(CodeRejection::Deactivated))
        ));
    }

    #[test]
    fn test_managers_issue_cashier_codes_only() {
        let (db, config) = setup();
        register_admin(&db, &config, "root@uni.edu");
        let manager = register_admin(&db, &config, "ops@uni.edu");

        assert!(generate_access_code(&db, &config, &manager, GenerateCode::cashier()).is_ok());

        let admin_code = GenerateCode {
            role: Role::Admin,
            ..GenerateCode::cashier()
        };
        assert!(matches!(
            generate_access_code(&db, &config, &manager, admin_code),
            Err(PosError::Unauthorized(_))
        ));
        assert_eq!(list_access_codes(&db, &manager).unwrap().len(), 1);
    }

    #[test]
    fn test_cashier_cannot_administer_codes() {
        let (db, config) = setup();
        let root = register_admin(&db, &config, "root@uni.edu");
        let code = generate_access_code(&db, &config, &root, GenerateCode::cashier()).unwrap();
        let cashier = SessionContext::from_redemption(&redeem_code(&db, &config, &code.code).unwrap());

        assert!(list_access_codes(&db, &cashier).is_err());
        assert!(generate_access_code(&db, &config, &cashier, GenerateCode::cashier()).is_err());
    }

    // ===== ADMIN ACCOUNTS =====

    #[test]
    fn test_first_admin_is_superadmin() {
        let (db, config) = setup();
        let first = register_admin(&db, &config, "a@x.com");
        let second = register_admin(&db, &config, "b@x.com");

        assert_eq!(first.role, Some(Role::Superadmin));
        assert_eq!(second.role, Some(Role::Manager));
    }

    #[test]
    fn test_lockout_after_five_failures() {
        let (db, config) = setup();
        register_admin(&db, &config, "root@uni.edu");

        let attempt = |password: &str| {
            sign_in(
                &db,
                &config,
                SignIn {
                    email: "ROOT@uni.edu".into(),
                    password: password.into(),
                },
            )
        };

        for _ in 0..4 {
            assert!(matches!(attempt("wrong"), Err(PosError::InvalidCredentials)));
        }
        assert!(matches!(attempt("wrong"), Err(PosError::AccountLocked { .. })));
        assert!(matches!(
            attempt("Jollof2024"),
            Err(PosError::AccountLocked { remaining_minutes: 15 })
        ));

        // Cool-down elapsed
        db.lock()
            .execute("UPDATE admin_users SET locked_until = ?1", [Utc::now().timestamp_millis() - 1])
            .unwrap();

        let outcome = attempt("Jollof2024").unwrap();
        assert_eq!(outcome.user.failed_attempts, 0);
        assert!(current_user(&db, &outcome.session.id).unwrap().is_some());

        sign_out(&db, &outcome.session.id).unwrap();
        assert!(current_user(&db, &outcome.session.id).unwrap().is_none());
    }

    // ===== PERSISTENCE =====

    #[test]
    fn test_session_context_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: dir.path().join("cafeteria.db"),
            ..Config::default()
        };
        let session_file = dir.path().join("session.json");

        {
            let db = open(&config).unwrap();
            seed_menu(&db);
            let root = register_admin(&db, &config, "root@uni.edu");
            let code = generate_access_code(&db, &config, &root, GenerateCode::cashier()).unwrap();
            let redemption = redeem_code(&db, &config, &code.code).unwrap();
            SessionContext::from_redemption(&redemption)
                .save(&session_file)
                .unwrap();
        }

        let db = open(&config).unwrap();
        let restored = SessionContext::load(&session_file).unwrap();
        assert_eq!(restored.role, Some(Role::Cashier));

        let mut register = Register::new(restored);
        register.cart_mut().add_item(&get_menu_item(&db, 2).unwrap());
        assert!(register.complete_order(&db, PaymentMethod::Card).is_ok());

        SessionContext::clear(&session_file).unwrap();
        assert_eq!(
            SessionContext::load(&session_file).unwrap(),
            SessionContext::anonymous()
        );
    }

    #[test]
    fn test_open_migrates_legacy_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "
                CREATE TABLE admin_users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    name TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                INSERT INTO admin_users (email, password_hash, name, created_at)
                    VALUES ('vc.office@uni.edu', 'x', 'Office', 0);
                ",
            )
            .unwrap();
        }

        let db = open(&Config {
            database_path: path,
            ..Config::default()
        })
        .unwrap();

        let role: Role = db
            .lock()
            .query_row("SELECT role FROM admin_users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(role, Role::Vc);
    }
}
