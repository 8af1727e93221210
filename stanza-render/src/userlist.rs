//! Basic-auth user lists referenced by backend challenges.

use crate::context::RenderContext;
use crate::directive::{Directive, Section};
use stanza_core::error::StanzaError;
use stanza_core::lookup::{self, SecretLookup};
use stanza_core::model::User;

const GLOBAL_OWNER: &str = "global users";

/// `userlist <name>Users` for a service with its own users.
pub fn service_users(ctx: &RenderContext<'_>) -> Option<Section> {
    if !ctx.has_users() {
        return None;
    }
    Some(userlist(format!("{}Users", ctx.name()), &ctx.service.users))
}

/// Parse a comma-separated `user:pass` list. Blank entries are skipped.
pub fn parse_users(raw: &str, encrypted: bool) -> Result<Vec<User>, StanzaError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (username, password) =
                entry
                    .split_once(':')
                    .ok_or_else(|| StanzaError::InvalidUsers {
                        owner: GLOBAL_OWNER.into(),
                        reason: format!("entry `{entry}` is not `user:password`"),
                    })?;
            if username.is_empty() || password.is_empty() {
                return Err(StanzaError::InvalidUsers {
                    owner: GLOBAL_OWNER.into(),
                    reason: format!("entry `{entry}` has an empty user or password"),
                });
            }
            Ok(User {
                username: username.to_string(),
                password: password.to_string(),
                pass_encrypted: encrypted,
            })
        })
        .collect()
}

/// `userlist defaultUsers` built from the lookup's `USERS` value.
pub fn global_users(lookup: &dyn SecretLookup) -> Result<Option<Section>, StanzaError> {
    let raw = lookup.lookup(lookup::USERS);
    if raw.is_empty() {
        return Ok(None);
    }
    let users = parse_users(&raw, lookup.flag(lookup::USERS_PASS_ENCRYPTED))?;
    if users.is_empty() {
        return Ok(None);
    }
    Ok(Some(userlist("defaultUsers", &users)))
}

fn userlist(name: impl Into<String>, users: &[User]) -> Section {
    let mut section = Section::userlist(name);
    section.extend(users.iter().map(|u| Directive::User {
        name: u.username.clone(),
        password: u.password.clone(),
        encrypted: u.pass_encrypted,
    }));
    section
}
