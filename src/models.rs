use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ===== ROLES =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Cashier,
    /// Legacy admin tier, equivalent to `Manager`.
    Admin,
    Manager,
    Vc,
    Superadmin,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageAdmins,
    ManageCashiers,
    ViewAnalytics,
    ExportReports,
    ProcessOrders,
    GenerateAdminCodes,
    GenerateCashierCodes,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Cashier => "cashier",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Vc => "vc",
            Role::Superadmin => "superadmin",
        }
    }

    /// Privilege tier: 0 cashier, 1 admin/manager/vc, 2 superadmin.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Cashier => 0,
            Role::Admin | Role::Manager | Role::Vc => 1,
            Role::Superadmin => 2,
        }
    }

    /// Roles an admin account may hold.
    pub fn is_admin_tier(&self) -> bool {
        self.rank() >= 1
    }

    /// Roles an access code may grant.
    pub fn is_code_role(&self) -> bool {
        matches!(self, Role::Cashier | Role::Admin)
    }

    pub fn can(&self, permission: Permission) -> bool {
        match self {
            Role::Superadmin => true,
            Role::Admin | Role::Manager | Role::Vc => !matches!(
                permission,
                Permission::ManageAdmins | Permission::GenerateAdminCodes
            ),
            Role::Cashier => permission == Permission::ProcessOrders,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cashier" => Ok(Role::Cashier),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "vc" => Ok(Role::Vc),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ===== ACCESS CODES =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Morning,
    Evening,
}

impl Shift {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Morning => "morning",
            Shift::Evening => "evening",
        }
    }
}

impl FromStr for Shift {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(Shift::Morning),
            "evening" => Ok(Shift::Evening),
            other => Err(format!("unknown shift: {other}")),
        }
    }
}

/// Why an access code cannot be used, in the order the checks are applied.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CodeRejection {
    NotFound,
    Deactivated,
    Expired,
    Exhausted,
}

impl fmt::Display for CodeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodeRejection::NotFound => "Invalid access code",
            CodeRejection::Deactivated => "Access code has been deactivated",
            CodeRejection::Expired => "Access code has expired",
            CodeRejection::Exhausted => "Access code has reached maximum uses",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessCode {
    pub id: i64,
    pub code: String,
    pub role: Role,
    pub shift: Option<Shift>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used_count: u32,
    /// `None` means unlimited uses.
    pub max_uses: Option<u32>,
    pub is_active: bool,
}

impl AccessCode {
    /// The first reason this code is unusable at `now`, if any.
    pub fn rejection_at(&self, now: DateTime<Utc>) -> Option<CodeRejection> {
        if !self.is_active {
            return Some(CodeRejection::Deactivated);
        }
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Some(CodeRejection::Expired);
        }
        if self.max_uses.is_some_and(|max| self.used_count >= max) {
            return Some(CodeRejection::Exhausted);
        }
        None
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateCode {
    pub role: Role,
    pub shift: Option<Shift>,
    pub expires_in_days: Option<i64>,
    pub max_uses: Option<u32>,
}

impl GenerateCode {
    pub fn cashier() -> Self {
        Self {
            role: Role::Cashier,
            shift: None,
            expires_in_days: None,
            max_uses: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CodeValidation {
    pub valid: bool,
    pub code: String,
    pub role: Option<Role>,
    pub reason: Option<CodeRejection>,
}

// ===== SESSIONS & ADMIN USERS =====

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub user_id: Option<i64>,
    pub code: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Redemption {
    pub session: Session,
    pub role: Role,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AdminUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

/// An admin account created by a superadmin on someone else's behalf.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewAdmin {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthOutcome {
    pub session: Session,
    pub user: AdminUser,
}

// ===== MENU =====

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub category: String,
    pub available: bool,
}

// ===== ORDERS =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "transfer" => Ok(PaymentMethod::Transfer),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// A line item as captured at checkout. Name and price are copies, not
/// references, so later menu edits never alter past orders.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderItem {
    /// `None` for custom items.
    pub menu_item_id: Option<i64>,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn subtotal(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewOrder {
    pub order_number: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub cashier: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub cashier: String,
    pub created_at: DateTime<Utc>,
}

// ===== REPORTS =====

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrdersStats {
    pub total_revenue: f64,
    pub revenue_change: String,
    pub total_orders: i64,
    pub orders_change: String,
    pub avg_order_value: i64,
    pub avg_change: String,
    pub daily_customers: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailySales {
    pub date: NaiveDate,
    pub weekday: String,
    pub revenue: f64,
    pub orders: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategorySales {
    pub category: String,
    pub amount: f64,
    pub percentage: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShiftWindow {
    /// 06:00 to 17:59 local time.
    Morning,
    /// 18:00 to 05:59 local time.
    Night,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentTotal {
    pub method: PaymentMethod,
    pub orders: i64,
    pub amount: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ShiftTotals {
    pub shift: ShiftWindow,
    pub revenue: f64,
    pub orders: i64,
    pub payments: Vec<PaymentTotal>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub total_revenue: f64,
    pub total_orders: i64,
    pub morning: ShiftTotals,
    pub night: ShiftTotals,
    pub orders: Vec<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(max_uses: Option<u32>, used_count: u32) -> AccessCode {
        AccessCode {
            id: 1,
            code: "ABC234".into(),
            role: Role::Cashier,
            shift: None,
            created_by: None,
            created_at: Utc::now(),
            expires_at: None,
            used_count,
            max_uses,
            is_active: true,
        }
    }

    #[test]
    fn role_permissions() {
        assert!(Role::Superadmin.can(Permission::GenerateAdminCodes));
        assert!(Role::Manager.can(Permission::GenerateCashierCodes));
        assert!(!Role::Manager.can(Permission::ManageAdmins));
        assert!(!Role::Vc.can(Permission::GenerateAdminCodes));
        assert!(Role::Cashier.can(Permission::ProcessOrders));
        assert!(!Role::Cashier.can(Permission::ViewAnalytics));
        assert_eq!(Role::Admin.rank(), Role::Manager.rank());
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in [
            Role::Cashier,
            Role::Admin,
            Role::Manager,
            Role::Vc,
            Role::Superadmin,
        ] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn code_rejection_priority() {
        let mut c = code(Some(1), 1);
        c.is_active = false;
        c.expires_at = Some(Utc::now() - Duration::days(1));
        assert_eq!(c.rejection_at(Utc::now()), Some(CodeRejection::Deactivated));

        c.is_active = true;
        assert_eq!(c.rejection_at(Utc::now()), Some(CodeRejection::Expired));

        c.expires_at = None;
        assert_eq!(c.rejection_at(Utc::now()), Some(CodeRejection::Exhausted));
    }

    #[test]
    fn unlimited_code_never_exhausts() {
        assert_eq!(code(None, 10_000).rejection_at(Utc::now()), None);
        assert_eq!(code(Some(3), 2).rejection_at(Utc::now()), None);
    }

    #[test]
    fn session_expiry_is_exclusive() {
        let now = Utc::now();
        let session = Session {
            id: "s".into(),
            user_id: None,
            code: None,
            role: Role::Cashier,
            created_at: now - Duration::hours(8),
            expires_at: now,
        };
        assert!(!session.is_valid_at(now));
        assert!(session.is_valid_at(now - Duration::seconds(1)));
    }
}
