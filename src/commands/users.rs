use std::io::Write;

use anyhow::Context as _;

use super::{CommandError, Context};
use crate::storage::InsertError;

pub(super) async fn register(ctx: &mut Context, name: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::Usage("register <name>".to_string()).into());
    }

    let user = match ctx.db.create_user(name).await {
        Ok(user) => user,
        Err(InsertError::DuplicateKey { .. }) => {
            return Err(CommandError::AlreadyExists(format!("user {name}")).into())
        }
        Err(e) => return Err(e).context("Failed to create user"),
    };

    ctx.set_current_user(&user.name)?;
    tracing::info!(user = %user.name, "Registered user");
    writeln!(out, "User {} created successfully", user.name)?;
    Ok(())
}

pub(super) async fn login(ctx: &mut Context, name: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let user = ctx
        .db
        .get_user_by_name(name)
        .await
        .context("Failed to look up user")?
        .ok_or_else(|| CommandError::NotFound {
            what: "user",
            name: name.to_string(),
        })?;

    ctx.set_current_user(&user.name)?;
    tracing::info!(user = %user.name, "Logged in");
    writeln!(out, "Logged in as {}", user.name)?;
    Ok(())
}

pub(super) async fn reset(ctx: &mut Context, out: &mut dyn Write) -> anyhow::Result<()> {
    let removed = ctx
        .db
        .delete_all_users()
        .await
        .context("Failed to reset database")?;
    tracing::info!(users = removed, "Reset database");
    writeln!(out, "Database reset: removed {removed} users and everything they owned")?;
    Ok(())
}

pub(super) async fn list(ctx: &mut Context, out: &mut dyn Write) -> anyhow::Result<()> {
    let users = ctx.db.list_users().await.context("Failed to list users")?;
    let current = ctx.config.current_user_name.as_deref();

    if users.is_empty() {
        writeln!(out, "No users registered")?;
        return Ok(());
    }

    for user in users {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}
