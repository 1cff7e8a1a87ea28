use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, TokenResponse, UserUpdate},
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
        repo::{UserRepo, EMAIL_TAKEN, USERNAME_TAKEN},
        repo_types::{NewUser, User, UserChanges},
    },
    error::{AppError, AppResult},
};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;

const BAD_CREDENTIALS: &str = "Incorrect email or password";
pub const INACTIVE_ACCOUNT: &str = "Inactive account";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    Ok(email)
}

fn validate_username(username: &str) -> AppResult<String> {
    let username = username.trim();
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::Validation(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    Ok(username.to_string())
}

pub async fn register(
    users: &dyn UserRepo,
    req: RegisterRequest,
    now: OffsetDateTime,
) -> AppResult<User> {
    let email = normalize_email(&req.email)?;
    let username = validate_username(&req.username)?;

    if req.password.chars().count() < PASSWORD_MIN {
        return Err(AppError::Validation(format!(
            "Password must be at least {PASSWORD_MIN} characters"
        )));
    }
    if req.password != req.password_confirm {
        return Err(AppError::BadRequest("Passwords do not match".into()));
    }

    // Cheap checks before paying for the hash; insert re-checks under its own lock.
    if users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict(EMAIL_TAKEN.into()));
    }
    if users.find_by_username(&username).await?.is_some() {
        warn!(username = %username, "username already taken");
        return Err(AppError::Conflict(USERNAME_TAKEN.into()));
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let user = users
        .insert(
            NewUser {
                email,
                username,
                password_hash,
            },
            now,
        )
        .await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

pub async fn login(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    req: LoginRequest,
    now: OffsetDateTime,
) -> AppResult<TokenResponse> {
    let email = normalize_email(&req.email)?;

    let Some(user) = users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::Unauthenticated(BAD_CREDENTIALS.into()));
    };

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::Unauthenticated(BAD_CREDENTIALS.into()));
    }

    if !user.is_active {
        warn!(user_id = user.id, "login on inactive account");
        return Err(AppError::Unauthenticated(INACTIVE_ACCOUNT.into()));
    }

    let access_token = keys.issue(&user.email, user.id, now)?;
    info!(user_id = user.id, "user logged in");
    Ok(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        expires_in: keys.ttl.as_secs(),
    })
}

/// Changing the email invalidates tokens issued for the old address.
pub async fn update_me(
    users: &dyn UserRepo,
    current: &User,
    update: UserUpdate,
) -> AppResult<User> {
    let changes = UserChanges {
        email: update.email.as_deref().map(normalize_email).transpose()?,
        username: update.username.as_deref().map(validate_username).transpose()?,
    };
    let email_changed = changes
        .email
        .as_ref()
        .is_some_and(|e| *e != current.email);

    let user = users.update_profile(current.id, changes).await?;

    info!(user_id = user.id, email_changed, "profile updated");
    Ok(user)
}

pub async fn deactivate_me(users: &dyn UserRepo, current: &User) -> AppResult<()> {
    users.deactivate(current.id).await?;
    info!(user_id = current.id, "account deactivated");
    Ok(())
}
