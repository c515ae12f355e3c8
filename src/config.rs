use std::env;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session_signing_secret: String,
    pub psp_a_secret: String,
    pub psp_b_shop_id: String,
    pub psp_b_secret: String,
    pub public_base_url: String,
    pub default_timezone: Tz,
    pub host: String,
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub access_token_ttl_days: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let session_signing_secret = env::var("SESSION_SIGNING_SECRET")?;
        let psp_a_secret = env::var("PSP_A_SECRET").unwrap_or_default();
        let psp_b_shop_id = env::var("PSP_B_SHOP_ID").unwrap_or_default();
        let psp_b_secret = env::var("PSP_B_SECRET").unwrap_or_default();
        let public_base_url =
            env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        let default_timezone = env::var("DEFAULT_TIMEZONE")
            .ok()
            .and_then(|tz| tz.parse::<Tz>().ok())
            .unwrap_or(chrono_tz::UTC);
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("HTTP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(100);
        let access_token_ttl_days = env::var("ACCESS_TOKEN_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(7);

        Ok(Self {
            database_url,
            session_signing_secret,
            psp_a_secret,
            psp_b_shop_id,
            psp_b_secret,
            public_base_url,
            default_timezone,
            host,
            port,
            rate_limit_per_minute,
            access_token_ttl_days,
        })
    }
}
