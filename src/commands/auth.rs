use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::users;
use crate::config::Config;
use crate::db::{millis, time_at, Database};
use crate::error::{PosError, PosResult};
use crate::models::{AdminUser, AuthOutcome, Permission, Role, Session, SignIn, SignUp};
use crate::password;
use crate::session::SessionContext;

const SESSION_COLUMNS: &str = "id, user_id, code, role, created_at, expires_at";

fn map_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        code: row.get(2)?,
        role: row.get(3)?,
        created_at: time_at(row, 4)?,
        expires_at: time_at(row, 5)?,
    })
}

pub(crate) fn create_session(
    conn: &Connection,
    user_id: Option<i64>,
    code: Option<&str>,
    role: Role,
    now: DateTime<Utc>,
    ttl: Duration,
) -> PosResult<Session> {
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id,
        code: code.map(str::to_string),
        role,
        created_at: now,
        expires_at: now + ttl,
    };

    conn.execute(
        "INSERT INTO sessions (id, user_id, code, role, created_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            session.id,
            session.user_id,
            session.code,
            session.role,
            millis(session.created_at),
            millis(session.expires_at)
        ],
    )?;

    Ok(session)
}

/// A session that exists and has not expired. Expired rows are left in place
/// and simply treated as absent.
pub(crate) fn resolve_session_conn(
    conn: &Connection,
    session_id: &str,
    now: DateTime<Utc>,
) -> PosResult<Option<Session>> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            [session_id],
            map_session,
        )
        .optional()?;

    Ok(session.filter(|s| s.is_valid_at(now)))
}

pub fn resolve_session(db: &Database, session_id: &str) -> PosResult<Option<Session>> {
    let conn = db.lock();
    resolve_session_conn(&conn, session_id, Utc::now())
}

/// Re-resolve the caller's session and check it grants `permission`.
///
/// For admin sessions the role is read from the account, so role changes and
/// deletions take effect immediately. The returned session carries that
/// current role.
pub(crate) fn require_permission(
    conn: &Connection,
    ctx: &SessionContext,
    permission: Permission,
) -> PosResult<Session> {
    let session_id = ctx.session_id.as_deref().ok_or(PosError::NotAuthenticated)?;
    let mut session =
        resolve_session_conn(conn, session_id, Utc::now())?.ok_or(PosError::NotAuthenticated)?;

    if let Some(user_id) = session.user_id {
        let user = users::read_admin(conn, user_id)?.ok_or(PosError::NotAuthenticated)?;
        session.role = user.role;
    }

    if !session.role.can(permission) {
        warn!(
            "Denied {:?} to session {} with role {}",
            permission, session.id, session.role
        );
        return Err(PosError::Unauthorized(format!(
            "{} role is not allowed to do this",
            session.role
        )));
    }

    Ok(session)
}

pub fn authorize(db: &Database, ctx: &SessionContext, permission: Permission) -> PosResult<Session> {
    let conn = db.lock();
    require_permission(&conn, ctx, permission)
}

pub(crate) fn normalize_email(email: &str) -> PosResult<String> {
    let email = email.trim().to_lowercase();

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(PosError::Validation("Enter a valid email address".into()));
    }
    Ok(email)
}

pub(crate) fn require_name(name: &str) -> PosResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PosError::Validation("Name is required".into()));
    }
    Ok(name)
}

/// Register an admin account. The very first account becomes superadmin,
/// every later one a manager.
pub fn sign_up(db: &Database, config: &Config, input: SignUp) -> PosResult<AuthOutcome> {
    let email = normalize_email(&input.email)?;
    let name = require_name(&input.name)?;
    password::check_policy(&input.password, config.min_password_length)?;
    let password_hash = password::hash_password(&input.password)?;

    let conn = db.lock();
    let now = Utc::now();

    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM admin_users", [], |row| row.get(0))?;
    let role = if existing == 0 {
        Role::Superadmin
    } else {
        Role::Manager
    };

    let user = users::insert_admin(&conn, &email, &password_hash, name, role, None, now)?;
    let session = create_session(&conn, Some(user.id), None, role, now, config.admin_session_ttl())?;

    info!("Registered admin {} as {}", user.id, role);

    Ok(AuthOutcome { session, user })
}

pub fn sign_in(db: &Database, config: &Config, input: SignIn) -> PosResult<AuthOutcome> {
    let email = input.email.trim().to_lowercase();

    let record: Option<(i64, String, Option<i64>)> = db
        .lock()
        .query_row(
            "SELECT id, password_hash, locked_until FROM admin_users WHERE email = ?1",
            [&email],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((id, password_hash, locked_until)) = record else {
        warn!("Sign-in attempt for unknown account");
        return Err(PosError::InvalidCredentials);
    };

    let now = Utc::now();
    check_lock(locked_until, now)?;

    // The connection is free for other terminals while the hash is checked
    let verified = password::verify_password(&input.password, &password_hash)?;

    let conn = db.lock();
    let now = Utc::now();

    if !verified {
        let failed: Option<u32> = conn
            .query_row(
                "UPDATE admin_users SET failed_attempts = failed_attempts + 1 WHERE id = ?1 RETURNING failed_attempts",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(failed) = failed else {
            return Err(PosError::InvalidCredentials);
        };

        if failed >= config.max_failed_logins {
            let until = now + config.lockout_duration();
            conn.execute(
                "UPDATE admin_users SET failed_attempts = 0, locked_until = ?1 WHERE id = ?2",
                rusqlite::params![millis(until), id],
            )?;
            warn!("Admin {id} locked after {failed} failed sign-ins");
            return Err(PosError::AccountLocked {
                remaining_minutes: minutes_until(now, until),
            });
        }

        warn!("Failed sign-in for admin {id} ({failed} in a row)");
        return Err(PosError::InvalidCredentials);
    }

    // Another attempt may have locked the account while the hash was checked
    let cleared = conn.execute(
        "UPDATE admin_users SET failed_attempts = 0, locked_until = NULL
         WHERE id = ?1 AND (locked_until IS NULL OR locked_until <= ?2)",
        rusqlite::params![id, millis(now)],
    )?;
    if cleared == 0 {
        let locked_until: Option<Option<i64>> = conn
            .query_row(
                "SELECT locked_until FROM admin_users WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        check_lock(locked_until.flatten(), now)?;
        return Err(PosError::InvalidCredentials);
    }

    let user = users::read_admin(&conn, id)?.ok_or(PosError::InvalidCredentials)?;
    let session = create_session(
        &conn,
        Some(user.id),
        None,
        user.role,
        now,
        config.admin_session_ttl(),
    )?;

    info!("Admin {} signed in", user.id);

    Ok(AuthOutcome { session, user })
}

fn check_lock(locked_until: Option<i64>, now: DateTime<Utc>) -> PosResult<()> {
    match locked_until.and_then(DateTime::from_timestamp_millis) {
        Some(until) if until > now => Err(PosError::AccountLocked {
            remaining_minutes: minutes_until(now, until),
        }),
        _ => Ok(()),
    }
}

/// Delete the session immediately. Unknown ids are ignored.
pub fn sign_out(db: &Database, session_id: &str) -> PosResult<()> {
    let conn = db.lock();
    let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
    if removed > 0 {
        info!("Session {session_id} signed out");
    }
    Ok(())
}

/// The admin behind a valid session, if any.
pub fn current_user(db: &Database, session_id: &str) -> PosResult<Option<AdminUser>> {
    let conn = db.lock();
    match resolve_session_conn(&conn, session_id, Utc::now())?.and_then(|s| s.user_id) {
        Some(user_id) => users::read_admin(&conn, user_id),
        None => Ok(None),
    }
}

fn minutes_until(now: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
    let seconds = (until - now).num_seconds().max(0);
    ((seconds + 59) / 60).max(1)
}
