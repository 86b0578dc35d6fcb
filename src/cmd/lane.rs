//! Lane table lookup: `claimboard lane`.

use anyhow::{Context, Result};
use claimboard::board::lane_for;
use claimboard_common::JobStatus;

pub fn cmd_lane(status: &str, assigned: usize) -> Result<()> {
    let status: JobStatus = status
        .parse()
        .with_context(|| format!("Cannot map '{}' to a lane", status))?;
    println!("{}", lane_for(status, assigned));
    Ok(())
}
