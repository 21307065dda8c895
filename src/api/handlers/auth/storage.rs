//! Database helpers for pairs, members, and token state.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::is_unique_violation;
use crate::token::{generate_opaque_token, hash_opaque_token};

/// Outcome when attempting to create a pending pair with two members.
#[derive(Debug)]
pub(super) enum InitiateOutcome {
    Created {
        pair_id: Uuid,
        first_token: String,
        second_token: String,
    },
    Conflict,
}

/// Outcome for a verification-token redemption.
#[derive(Debug)]
pub(super) enum VerifyOutcome {
    NotFound,
    AlreadyVerified,
    Expired,
    Verified { both_verified: bool },
}

/// Outcome for completing registration on a pending pair.
#[derive(Debug)]
pub(super) enum CompleteOutcome {
    PairNotFound,
    NotBothVerified,
    Completed,
}

/// Outcome for a refresh-token redemption.
#[derive(Debug)]
pub(super) enum RedeemOutcome {
    NotFound,
    Expired,
    Redeemed {
        member_id: Uuid,
        pair_id: Uuid,
        role: String,
        refresh_token: String,
    },
}

/// Outcome for a password-reset confirmation.
#[derive(Debug)]
pub(super) enum ResetOutcome {
    NotFound,
    Expired,
    Updated,
}

/// Fields needed to authenticate a member and issue tokens.
pub(super) struct MemberAuthRecord {
    pub(super) member_id: Uuid,
    pub(super) pair_id: Uuid,
    pub(super) role: String,
    pub(super) password_hash: Option<String>,
    pub(super) email_verified: bool,
    pub(super) pair_status: String,
}

/// Hashed credentials applied to one member at registration completion.
pub(super) struct MemberSetup {
    pub(super) password_hash: String,
    pub(super) display_name: String,
}

/// Account view used by the account endpoints; includes soft-deleted rows.
pub(crate) struct AccountRecord {
    pub(crate) member_id: Uuid,
    pub(crate) pair_id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) role: String,
    pub(crate) pair_status: String,
    pub(crate) deleted_at_unix: Option<i64>,
}

/// Create a pending pair and both members in one transaction.
///
/// Returns the raw verification tokens so the caller can email them after
/// commit; only their hashes are stored.
pub(super) async fn insert_pair_and_members(
    pool: &PgPool,
    pair_name: &str,
    anniversary_date: Option<&str>,
    first_email: &str,
    second_email: &str,
    config: &AuthConfig,
) -> Result<InitiateOutcome> {
    let mut tx = pool.begin().await.context("begin initiate transaction")?;

    let query = r"
        INSERT INTO pairs (pair_name, anniversary_date)
        VALUES ($1, $2::date)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(pair_name)
        .bind(anniversary_date)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert pair")?;
    let pair_id: Uuid = row.get("id");

    let mut tokens = Vec::with_capacity(2);
    for (role, email) in [("first", first_email), ("second", second_email)] {
        let token = generate_opaque_token()?;
        let token_hash = hash_opaque_token(&token);

        let query = r"
            INSERT INTO members
                (pair_id, email, role, verification_token_hash, verification_expires_at)
            VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(pair_id)
            .bind(email)
            .bind(role)
            .bind(token_hash)
            .bind(config.verification_token_ttl_seconds())
            .execute(&mut *tx)
            .instrument(span)
            .await;

        if let Err(err) = result {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(InitiateOutcome::Conflict);
            }
            return Err(err).context("failed to insert member");
        }

        tokens.push(token);
    }

    tx.commit().await.context("commit initiate transaction")?;

    let second_token = tokens.pop().context("missing second token")?;
    let first_token = tokens.pop().context("missing first token")?;
    Ok(InitiateOutcome::Created {
        pair_id,
        first_token,
        second_token,
    })
}

/// Consume a verification token and mark the member verified.
pub(super) async fn verify_member(pool: &PgPool, token_hash: &[u8]) -> Result<VerifyOutcome> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    let query = r"
        SELECT id, pair_id, email_verified,
               COALESCE(verification_expires_at > NOW(), false) AS live
        FROM members
        WHERE verification_token_hash = $1
          AND deleted_at IS NULL
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup verification token")?;

    let Some(row) = row else {
        return Ok(VerifyOutcome::NotFound);
    };
    if row.get::<bool, _>("email_verified") {
        return Ok(VerifyOutcome::AlreadyVerified);
    }
    if !row.get::<bool, _>("live") {
        return Ok(VerifyOutcome::Expired);
    }

    let member_id: Uuid = row.get("id");
    let pair_id: Uuid = row.get("pair_id");

    let query = r"
        UPDATE members
        SET email_verified = true,
            verification_token_hash = NULL,
            verification_expires_at = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(member_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark member verified")?;

    let query = r"
        SELECT bool_and(email_verified) AS both_verified
        FROM members
        WHERE pair_id = $1
          AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(pair_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to check partner verification")?;
    let both_verified: bool = row.try_get::<Option<bool>, _>("both_verified")?.unwrap_or(false);

    tx.commit().await.context("commit verify transaction")?;

    Ok(VerifyOutcome::Verified { both_verified })
}

/// Set credentials on both members and activate the pair, atomically.
pub(super) async fn complete_registration(
    pool: &PgPool,
    pair_id: Uuid,
    first: &MemberSetup,
    second: &MemberSetup,
) -> Result<CompleteOutcome> {
    let mut tx = pool.begin().await.context("begin complete transaction")?;

    let query = r"
        SELECT id
        FROM pairs
        WHERE id = $1
          AND status = 'pending'
          AND deleted_at IS NULL
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(pair_id)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup pending pair")?;
    if row.is_none() {
        return Ok(CompleteOutcome::PairNotFound);
    }

    let query = r"
        SELECT role, email_verified
        FROM members
        WHERE pair_id = $1
          AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(pair_id)
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load pair members")?;

    let verified = |role: &str| {
        rows.iter()
            .find(|row| row.get::<String, _>("role") == role)
            .is_some_and(|row| row.get::<bool, _>("email_verified"))
    };
    if rows.len() != 2 || !verified("first") || !verified("second") {
        return Ok(CompleteOutcome::NotBothVerified);
    }

    for (role, setup) in [("first", first), ("second", second)] {
        let query = r"
            UPDATE members
            SET password_hash = $3,
                display_name = $4,
                updated_at = NOW()
            WHERE pair_id = $1
              AND role = $2
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(pair_id)
            .bind(role)
            .bind(&setup.password_hash)
            .bind(&setup.display_name)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to set member credentials")?;
    }

    let query = r"
        UPDATE pairs
        SET status = 'active',
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(pair_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to activate pair")?;

    tx.commit().await.context("commit complete transaction")?;

    Ok(CompleteOutcome::Completed)
}

/// Look up auth data by normalized email (used by password login).
pub(super) async fn lookup_member_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<MemberAuthRecord>> {
    let query = r"
        SELECT members.id, members.pair_id, members.role, members.password_hash,
               members.email_verified, pairs.status AS pair_status
        FROM members
        JOIN pairs ON pairs.id = members.pair_id
        WHERE members.email = $1
          AND members.deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup member by email")?;

    Ok(row.map(|row| MemberAuthRecord {
        member_id: row.get("id"),
        pair_id: row.get("pair_id"),
        role: row.get("role"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
        pair_status: row.get("pair_status"),
    }))
}

/// Look up auth data by Apple subject (used by federated login).
pub(super) async fn lookup_member_by_apple_sub(
    pool: &PgPool,
    apple_sub: &str,
) -> Result<Option<MemberAuthRecord>> {
    let query = r"
        SELECT members.id, members.pair_id, members.role, members.password_hash,
               members.email_verified, pairs.status AS pair_status
        FROM members
        JOIN pairs ON pairs.id = members.pair_id
        WHERE members.apple_sub = $1
          AND members.deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(apple_sub)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup member by apple subject")?;

    Ok(row.map(|row| MemberAuthRecord {
        member_id: row.get("id"),
        pair_id: row.get("pair_id"),
        role: row.get("role"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
        pair_status: row.get("pair_status"),
    }))
}

/// Link an Apple subject to an existing member after a verified email match.
pub(super) async fn link_apple_sub(pool: &PgPool, member_id: Uuid, apple_sub: &str) -> Result<()> {
    let query = r"
        UPDATE members
        SET apple_sub = $2,
            updated_at = NOW()
        WHERE id = $1
          AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(member_id)
        .bind(apple_sub)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to link apple subject")?;
    Ok(())
}

/// Generate a refresh token, store only its hash, and return the raw value.
pub(super) async fn issue_refresh_token(
    pool: &PgPool,
    member_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let query = r"
        INSERT INTO refresh_tokens (member_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_opaque_token()?;
        let token_hash = hash_opaque_token(&token);
        let result = sqlx::query(query)
            .bind(member_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert refresh token"),
        }
    }

    Err(anyhow!("failed to generate unique refresh token"))
}

/// Redeem a refresh token: revoke the old row and insert its replacement.
///
/// The revoke `UPDATE ... WHERE revoked_at IS NULL` is the serialization
/// point; a losing concurrent request sees zero rows and gets `NotFound`.
pub(super) async fn redeem_refresh_token(
    pool: &PgPool,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<RedeemOutcome> {
    let mut tx = pool.begin().await.context("begin refresh transaction")?;

    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE token_hash = $1
          AND revoked_at IS NULL
        RETURNING member_id, (expires_at > NOW()) AS live
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke refresh token")?;

    let Some(row) = row else {
        return Ok(RedeemOutcome::NotFound);
    };
    let member_id: Uuid = row.get("member_id");
    if !row.get::<bool, _>("live") {
        // Keep the revocation: the token was unusable either way.
        tx.commit().await.context("commit expired refresh")?;
        return Ok(RedeemOutcome::Expired);
    }

    let query = r"
        SELECT members.pair_id, members.role
        FROM members
        WHERE members.id = $1
          AND members.deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(member_id)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load member for refresh")?;
    let Some(row) = row else {
        tx.commit().await.context("commit orphan refresh")?;
        return Ok(RedeemOutcome::NotFound);
    };
    let pair_id: Uuid = row.get("pair_id");
    let role: String = row.get("role");

    let query = r"
        INSERT INTO refresh_tokens (member_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    let mut refresh_token = None;
    for _ in 0..3 {
        let token = generate_opaque_token()?;
        let new_hash = hash_opaque_token(&token);
        let result = sqlx::query(query)
            .bind(member_id)
            .bind(new_hash)
            .bind(ttl_seconds)
            .execute(&mut *tx)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => {
                refresh_token = Some(token);
                break;
            }
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert replacement refresh token"),
        }
    }
    let Some(refresh_token) = refresh_token else {
        return Err(anyhow!("failed to generate unique refresh token"));
    };

    tx.commit().await.context("commit refresh transaction")?;

    Ok(RedeemOutcome::Redeemed {
        member_id,
        pair_id,
        role,
        refresh_token,
    })
}

/// Store a hashed reset token for the member owning `email`, if any.
///
/// Returns the raw token when the member exists; `None` is indistinguishable
/// to the caller's client, which always sees the same accepted response.
pub(super) async fn set_reset_token(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<Option<String>> {
    let token = generate_opaque_token()?;
    let token_hash = hash_opaque_token(&token);

    let query = r"
        UPDATE members
        SET reset_token_hash = $2,
            reset_expires_at = NOW() + ($3 * INTERVAL '1 second'),
            updated_at = NOW()
        WHERE email = $1
          AND deleted_at IS NULL
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(token_hash)
        .bind(config.reset_token_ttl_seconds())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to set reset token")?;

    Ok(row.map(|_| token))
}

/// Consume a reset token and replace the member's password hash.
pub(super) async fn consume_reset_token(
    pool: &PgPool,
    token_hash: &[u8],
    new_password_hash: &str,
) -> Result<ResetOutcome> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = r"
        SELECT id, COALESCE(reset_expires_at > NOW(), false) AS live
        FROM members
        WHERE reset_token_hash = $1
          AND deleted_at IS NULL
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup reset token")?;

    let Some(row) = row else {
        return Ok(ResetOutcome::NotFound);
    };
    if !row.get::<bool, _>("live") {
        return Ok(ResetOutcome::Expired);
    }
    let member_id: Uuid = row.get("id");

    let query = r"
        UPDATE members
        SET password_hash = $2,
            reset_token_hash = NULL,
            reset_expires_at = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(member_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password")?;

    tx.commit().await.context("commit reset transaction")?;

    Ok(ResetOutcome::Updated)
}

/// Load the account view for a member, including soft-deleted rows.
pub(crate) async fn lookup_account(
    pool: &PgPool,
    member_id: Uuid,
) -> Result<Option<AccountRecord>> {
    let query = r"
        SELECT members.id, members.pair_id, members.email, members.display_name,
               members.role, pairs.status AS pair_status,
               EXTRACT(EPOCH FROM members.deleted_at)::bigint AS deleted_at_unix
        FROM members
        JOIN pairs ON pairs.id = members.pair_id
        WHERE members.id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(member_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account")?;

    Ok(row.map(|row| AccountRecord {
        member_id: row.get("id"),
        pair_id: row.get("pair_id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        pair_status: row.get("pair_status"),
        deleted_at_unix: row.get("deleted_at_unix"),
    }))
}

/// Update the display name of a live member.
pub(crate) async fn update_display_name(
    pool: &PgPool,
    member_id: Uuid,
    display_name: &str,
) -> Result<()> {
    let query = r"
        UPDATE members
        SET display_name = $2,
            updated_at = NOW()
        WHERE id = $1
          AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(member_id)
        .bind(display_name)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update display name")?;
    Ok(())
}

/// Soft-delete a member; an active pair drops to `single`.
///
/// Returns `false` when the member was already deleted or missing.
pub(crate) async fn soft_delete_account(pool: &PgPool, member_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin delete transaction")?;

    let query = r"
        UPDATE members
        SET deleted_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
          AND deleted_at IS NULL
        RETURNING pair_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(member_id)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to soft-delete member")?;

    let Some(row) = row else {
        return Ok(false);
    };
    let pair_id: Uuid = row.get("pair_id");

    let query = r"
        UPDATE pairs
        SET status = 'single',
            updated_at = NOW()
        WHERE id = $1
          AND status = 'active'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(pair_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update pair status")?;

    tx.commit().await.context("commit delete transaction")?;

    Ok(true)
}

/// Restore a soft-deleted member; the pair returns to `active` when the
/// partner is still live.
pub(crate) async fn restore_account(pool: &PgPool, member_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("begin restore transaction")?;

    let query = r"
        UPDATE members
        SET deleted_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        RETURNING pair_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(member_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to restore member")?;
    let pair_id: Uuid = row.get("pair_id");

    let query = r"
        UPDATE pairs
        SET status = 'active',
            updated_at = NOW()
        WHERE id = $1
          AND status = 'single'
          AND EXISTS (
              SELECT 1 FROM members
              WHERE members.pair_id = $1
                AND members.id <> $2
                AND members.deleted_at IS NULL
          )
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(pair_id)
        .bind(member_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to reactivate pair")?;

    tx.commit().await.context("commit restore transaction")?;

    Ok(())
}
