use anyhow::{Result, bail};

use crate::auth::JwtVerifier;
use crate::core::AppConfig;

pub fn run(user_id: &str, ttl_hours: i64, config: &AppConfig) -> Result<()> {
    if user_id.trim().is_empty() {
        bail!("--user-id can't be empty");
    }
    let token = JwtVerifier::new(&config.jwt_secret).issue(user_id, ttl_hours * 60 * 60)?;
    println!("{}", token);
    Ok(())
}
