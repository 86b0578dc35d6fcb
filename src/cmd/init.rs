//! Database bootstrap command: `claimboard init`.

use anyhow::{Context, Result};
use claimboard::store::BoardDb;
use claimboard_common::{OrgId, Role, User, UserId};
use std::path::{Path, PathBuf};

pub fn cmd_init(
    config_path: &Path,
    db_path: Option<PathBuf>,
    org: Option<&str>,
    owner: Option<&str>,
) -> Result<()> {
    let toml = super::load_effective(config_path)?;
    let db_path = db_path.unwrap_or(toml.store.db_path);

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = BoardDb::new(&db_path)?;
    println!("Board database initialized at {}", db_path.display());

    if let (Some(org), Some(owner)) = (org, owner) {
        let existing = db.get_user(&UserId::new(owner))?;
        if let Some(user) = existing
            && (user.org_id.as_str() != org || user.role != Role::Owner)
        {
            anyhow::bail!(
                "User '{}' already exists as {} in organization '{}'",
                owner,
                user.role,
                user.org_id
            );
        }
        db.upsert_user(&User {
            id: UserId::new(owner),
            role: Role::Owner,
            org_id: OrgId::new(org),
            office_id: None,
            department_id: None,
            name: owner.to_string(),
        })?;
        println!("Owner '{}' bootstrapped for organization '{}'", owner, org);
    }

    Ok(())
}
