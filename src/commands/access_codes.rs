use chrono::{Duration, Utc};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::commands::auth::{create_session, require_permission};
use crate::config::Config;
use crate::db::{millis, opt_time_at, time_at, Database};
use crate::error::{PosError, PosResult};
use crate::models::{
    AccessCode, CodeRejection, CodeValidation, GenerateCode, Permission, Redemption, Role,
};
use crate::session::SessionContext;

/// Upper-case letters and digits without the look-alikes 0, O, 1, I and L.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Below this the code space is small enough to run out.
pub const MIN_CODE_LENGTH: usize = 6;

const CODE_COLUMNS: &str =
    "id, code, role, shift, created_by, created_at, expires_at, used_count, max_uses, is_active";

fn map_code(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessCode> {
    Ok(AccessCode {
        id: row.get(0)?,
        code: row.get(1)?,
        role: row.get(2)?,
        shift: row.get(3)?,
        created_by: row.get(4)?,
        created_at: time_at(row, 5)?,
        expires_at: opt_time_at(row, 6)?,
        used_count: row.get(7)?,
        max_uses: row.get(8)?,
        is_active: row.get(9)?,
    })
}

pub fn random_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are typed by hand; accept any case and stray whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Enough of a code to correlate log lines without leaking it.
pub(crate) fn masked(code: &str) -> String {
    format!("{}****", code.chars().take(2).collect::<String>())
}

fn find_code(conn: &Connection, code: &str) -> PosResult<Option<AccessCode>> {
    let found = conn
        .query_row(
            &format!("SELECT {CODE_COLUMNS} FROM access_codes WHERE code = ?1"),
            [code],
            map_code,
        )
        .optional()?;
    Ok(found)
}

fn find_code_by_id(conn: &Connection, id: i64) -> PosResult<AccessCode> {
    conn.query_row(
        &format!("SELECT {CODE_COLUMNS} FROM access_codes WHERE id = ?1"),
        [id],
        map_code,
    )
    .optional()?
    .ok_or_else(|| PosError::NotFound("Access code".into()))
}

/// Draw codes until one is not already stored.
fn unique_code(conn: &Connection, mut draw: impl FnMut() -> String) -> PosResult<String> {
    loop {
        let candidate = draw();
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM access_codes WHERE code = ?1)",
            [&candidate],
            |row| row.get(0),
        )?;
        if !taken {
            return Ok(candidate);
        }
    }
}

fn issuing_permission(role: Role) -> Permission {
    match role {
        Role::Cashier => Permission::GenerateCashierCodes,
        _ => Permission::GenerateAdminCodes,
    }
}

pub fn generate_access_code(
    db: &Database,
    config: &Config,
    ctx: &SessionContext,
    request: GenerateCode,
) -> PosResult<AccessCode> {
    if !request.role.is_code_role() {
        return Err(PosError::Validation(format!(
            "Access codes cannot grant the {} role",
            request.role
        )));
    }
    if request.max_uses == Some(0) {
        return Err(PosError::Validation("Maximum uses must be at least 1".into()));
    }
    if request.expires_in_days.is_some_and(|days| days <= 0) {
        return Err(PosError::Validation("Expiry must be at least 1 day".into()));
    }
    if config.code_length < MIN_CODE_LENGTH {
        return Err(PosError::Validation(format!(
            "Access codes must be at least {MIN_CODE_LENGTH} characters"
        )));
    }

    let conn = db.lock();
    let actor = require_permission(&conn, ctx, issuing_permission(request.role))?;

    let code = unique_code(&conn, || random_code(config.code_length))?;
    let now = Utc::now();
    let expires_at = match request.expires_in_days {
        Some(days) => Some(
            Duration::try_days(days)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(|| PosError::Validation("Expiry is too far in the future".into()))?,
        ),
        None => None,
    };

    conn.execute(
        "INSERT INTO access_codes (code, role, shift, created_by, created_at, expires_at, used_count, max_uses, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, 1)",
        rusqlite::params![
            code,
            request.role,
            request.shift,
            actor.user_id,
            millis(now),
            expires_at.map(millis),
            request.max_uses
        ],
    )?;

    info!(
        "Generated {} code {} (max uses {:?}, expires {:?})",
        request.role,
        masked(&code),
        request.max_uses,
        expires_at
    );

    find_code_by_id(&conn, conn.last_insert_rowid())
}

/// Read-only check of whether `code` could be redeemed right now.
pub fn validate_code(db: &Database, code: &str) -> PosResult<CodeValidation> {
    let code = normalize_code(code);
    let conn = db.lock();

    let reason = match find_code(&conn, &code)? {
        Some(found) => match found.rejection_at(Utc::now()) {
            Some(reason) => Err(reason),
            None => Ok(found.role),
        },
        None => Err(CodeRejection::NotFound),
    };

    Ok(match reason {
        Ok(role) => CodeValidation {
            valid: true,
            code,
            role: Some(role),
            reason: None,
        },
        Err(reason) => CodeValidation {
            valid: false,
            code,
            role: None,
            reason: Some(reason),
        },
    })
}

/// Consume one use of `code` and open a terminal session for its role.
///
/// The usability check and the increment are one conditional `UPDATE`, so
/// two terminals racing on a single-use code cannot both win.
pub fn redeem_code(db: &Database, config: &Config, code: &str) -> PosResult<Redemption> {
    let code = normalize_code(code);
    let mut conn = db.lock();
    let now = Utc::now();

    let tx = conn.transaction()?;
    let redeemed: Option<Role> = tx
        .query_row(
            "UPDATE access_codes SET used_count = used_count + 1
             WHERE code = ?1
               AND is_active = 1
               AND (expires_at IS NULL OR expires_at > ?2)
               AND (max_uses IS NULL OR used_count < max_uses)
             RETURNING role",
            rusqlite::params![code, millis(now)],
            |row| row.get(0),
        )
        .optional()?;

    let Some(role) = redeemed else {
        let reason = find_code(&tx, &code)?
            .and_then(|found| found.rejection_at(now))
            .unwrap_or(CodeRejection::NotFound);
        warn!("Rejected code {}: {}", masked(&code), reason);
        return Err(reason.into());
    };

    let session = create_session(
        &tx,
        None,
        Some(&code),
        role,
        now,
        config.cashier_session_ttl(),
    )?;
    tx.commit()?;

    info!("Redeemed {} code {}", role, masked(&code));

    Ok(Redemption {
        session,
        role,
        code,
    })
}

/// All codes, newest first.
pub fn list_access_codes(db: &Database, ctx: &SessionContext) -> PosResult<Vec<AccessCode>> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ManageCashiers)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {CODE_COLUMNS} FROM access_codes ORDER BY created_at DESC, id DESC"
    ))?;
    let codes = stmt
        .query_map([], map_code)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(codes)
}

pub fn deactivate_access_code(db: &Database, ctx: &SessionContext, id: i64) -> PosResult<()> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ManageCashiers)?;
    let found = find_code_by_id(&conn, id)?;
    require_permission(&conn, ctx, issuing_permission(found.role))?;

    conn.execute("UPDATE access_codes SET is_active = 0 WHERE id = ?1", [id])?;
    info!("Deactivated {} code {}", found.role, masked(&found.code));
    Ok(())
}

pub fn delete_access_code(db: &Database, ctx: &SessionContext, id: i64) -> PosResult<()> {
    let conn = db.lock();
    require_permission(&conn, ctx, Permission::ManageCashiers)?;
    let found = find_code_by_id(&conn, id)?;
    require_permission(&conn, ctx, issuing_permission(found.role))?;

    conn.execute("DELETE FROM access_codes WHERE id = ?1", [id])?;
    info!("Deleted {} code {}", found.role, masked(&found.code));
    Ok(())
}
