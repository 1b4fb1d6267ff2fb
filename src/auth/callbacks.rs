//! The three hooks every sign-in and session read goes through.
//!
//! Each one runs at most two store operations and fails with an [`AuthError`]
//! whose message is shown to the user as is.

use anyhow::Context;
use tracing::{debug, error, info, instrument, warn};

use super::{
    dto::{Credentials, Session},
    password,
    provider::{Account, ExternalIdentity, ProviderId},
};
use crate::{
    error::AuthError,
    users::{NewUser, User, UserStore},
};

/// Credentials check: returns the stored user when email and password match.
#[instrument(skip_all)]
pub async fn authorize(users: &dyn UserStore, credentials: Credentials) -> Result<User, AuthError> {
    let (email, plain) = match (credentials.email, credentials.password) {
        (Some(email), Some(plain)) if !email.is_empty() && !plain.is_empty() => (email, plain),
        _ => return Err(AuthError::MissingCredentials),
    };

    let Some(user) = users.find_by_email(&email).await? else {
        warn!("login unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    let Some(hash) = user.password_hash.clone() else {
        warn!(user_id = %user.id, "password login on account without password");
        return Err(AuthError::InvalidCredentials);
    };

    let verified = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .context("password verification task")?;

    match verified {
        Ok(true) => Ok(user),
        Ok(false) => {
            warn!(user_id = %user.id, "login invalid password");
            Err(AuthError::InvalidCredentials)
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "stored password hash unreadable");
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Runs after a provider has authenticated someone. GitHub identities get a
/// local user record on first sign-in.
#[instrument(skip(users, identity), fields(provider = account.provider.as_str()))]
pub async fn sign_in(
    users: &dyn UserStore,
    identity: &ExternalIdentity,
    account: &Account,
) -> Result<bool, AuthError> {
    if account.provider == ProviderId::GitHub {
        let email = identity
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::MissingProviderEmail)?;

        if users.find_by_email(email).await?.is_none() {
            let new_user = NewUser {
                email: email.to_string(),
                name: Some(identity.name.clone().unwrap_or_default()),
                image: Some(identity.image.clone().unwrap_or_default()),
                password_hash: None,
            };
            match users.create(new_user).await? {
                Some(user) => info!(user_id = %user.id, "user created on first github sign-in"),
                None => debug!("user created concurrently by another sign-in"),
            }
        }
    }
    Ok(true)
}

/// Backfills id, name and image from the store when the session has an email.
#[instrument(skip_all)]
pub async fn session(users: &dyn UserStore, mut session: Session) -> Result<Session, AuthError> {
    let Some(session_user) = session.user.as_mut() else {
        return Ok(session);
    };
    let Some(email) = session_user.email.as_deref() else {
        return Ok(session);
    };

    if let Some(user) = users.find_by_email(email).await? {
        session_user.id = Some(user.id.to_string());
        session_user.name = user.name;
        session_user.image = user.image;
    }
    Ok(session)
}
