use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::commands::auth::{authorize, normalize_email, require_name, require_permission};
use crate::config::Config;
use crate::db::{millis, opt_time_at, time_at, Database};
use crate::error::{PosError, PosResult};
use crate::models::{AdminUser, NewAdmin, Permission, Role};
use crate::password;
use crate::session::SessionContext;

const ADMIN_COLUMNS: &str =
    "id, email, name, role, created_at, created_by, failed_attempts, locked_until";

fn map_admin(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdminUser> {
    Ok(AdminUser {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        created_at: time_at(row, 4)?,
        created_by: row.get(5)?,
        failed_attempts: row.get(6)?,
        locked_until: opt_time_at(row, 7)?,
    })
}

pub(crate) fn read_admin(conn: &Connection, id: i64) -> PosResult<Option<AdminUser>> {
    let user = conn
        .query_row(
            &format!("SELECT {ADMIN_COLUMNS} FROM admin_users WHERE id = ?1"),
            [id],
            map_admin,
        )
        .optional()?;
    Ok(user)
}

pub(crate) fn insert_admin(
    conn: &Connection,
    email: &str,
    password_hash: &str,
    name: &str,
    role: Role,
    created_by: Option<i64>,
    now: DateTime<Utc>,
) -> PosResult<AdminUser> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM admin_users WHERE email = ?1)",
        [email],
        |row| row.get(0),
    )?;
    if taken {
        return Err(PosError::EmailTaken);
    }

    conn.execute(
        "INSERT INTO admin_users (email, password_hash, name, role, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![email, password_hash, name, role, created_by, millis(now)],
    )?;

    let id = conn.last_insert_rowid();
    read_admin(conn, id)?.ok_or_else(|| PosError::NotFound("Admin user".into()))
}

pub fn list_admin_users(db: &Database, ctx: &SessionContext) -> PosResult<Vec<AdminUser>> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ManageAdmins)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admin_users ORDER BY created_at, id"
    ))?;
    let users = stmt
        .query_map([], map_admin)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(users)
}

/// Create an admin account with an explicit role (superadmin only).
pub fn create_admin_user(
    db: &Database,
    config: &Config,
    ctx: &SessionContext,
    input: NewAdmin,
) -> PosResult<AdminUser> {
    let email = normalize_email(&input.email)?;
    let name = require_name(&input.name)?;
    if !input.role.is_admin_tier() {
        return Err(PosError::Validation(format!(
            "{} is not an admin role",
            input.role
        )));
    }
    password::check_policy(&input.password, config.min_password_length)?;

    // Checked again under the insert's lock; this one just skips hashing for outsiders
    authorize(db, ctx, Permission::ManageAdmins)?;
    let password_hash = password::hash_password(&input.password)?;

    let conn = db.lock();
    let actor = require_permission(&conn, ctx, Permission::ManageAdmins)?;
    let user = insert_admin(
        &conn,
        &email,
        &password_hash,
        name,
        input.role,
        actor.user_id,
        Utc::now(),
    )?;

    info!("Admin {:?} created admin {} as {}", actor.user_id, user.id, user.role);

    Ok(user)
}

pub fn change_admin_role(
    db: &Database,
    ctx: &SessionContext,
    user_id: i64,
    role: Role,
) -> PosResult<AdminUser> {
    if !role.is_admin_tier() {
        return Err(PosError::Validation(format!("{role} is not an admin role")));
    }

    let conn = db.lock();
    let actor = require_permission(&conn, ctx, Permission::ManageAdmins)?;
    if actor.user_id == Some(user_id) {
        return Err(PosError::Unauthorized("Cannot change your own role".into()));
    }

    let updated = conn.execute(
        "UPDATE admin_users SET role = ?1 WHERE id = ?2",
        rusqlite::params![role, user_id],
    )?;
    if updated == 0 {
        return Err(PosError::NotFound("Admin user".into()));
    }

    info!("Admin {:?} set role of admin {user_id} to {role}", actor.user_id);

    read_admin(&conn, user_id)?.ok_or_else(|| PosError::NotFound("Admin user".into()))
}

/// Delete an admin account together with its sessions.
pub fn delete_admin_user(db: &Database, ctx: &SessionContext, user_id: i64) -> PosResult<()> {
    let mut conn = db.lock();
    let actor = require_permission(&conn, ctx, Permission::ManageAdmins)?;
    if actor.user_id == Some(user_id) {
        return Err(PosError::Unauthorized("Cannot delete your own account".into()));
    }

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?;
    let deleted = tx.execute("DELETE FROM admin_users WHERE id = ?1", [user_id])?;
    if deleted == 0 {
        return Err(PosError::NotFound("Admin user".into()));
    }
    tx.commit()?;

    info!("Admin {:?} deleted admin {user_id}", actor.user_id);
    Ok(())
}
