use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;

/// Default number of minutes after issuance during which a token lineage may be refreshed (two weeks).
pub const DEFAULT_REFRESH_WINDOW_MINUTES: i64 = 20160;

/// Default lifetime of a newly issued token in minutes.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

/// Claim used to key whitelist entries unless configured otherwise.
pub const DEFAULT_REGISTRY_KEY_CLAIM: &str = "jti";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Seconds a freshly whitelisted token waits before its entry is considered in force.
    #[arg(long, env, default_value_t = 0)]
    pub grace_period_seconds: i64,

    /// Minutes after original issuance during which a token may still be refreshed.
    #[arg(long, env, default_value_t = DEFAULT_REFRESH_WINDOW_MINUTES)]
    pub refresh_window_minutes: i64,

    /// The claim whose value identifies a token's whitelist entry.
    #[arg(long, env, default_value = DEFAULT_REGISTRY_KEY_CLAIM)]
    pub registry_key_claim: String,

    /// Claims copied from an expiring token into its refreshed successor.
    /// `sub` and `iat` are always carried and need not be listed.
    #[arg(long, env, value_delimiter = ',', use_value_delimiter = true)]
    pub persistent_claims: Vec<String>,

    /// Lifetime of newly issued tokens in minutes.
    #[arg(long, env, default_value_t = DEFAULT_TOKEN_TTL_MINUTES)]
    pub token_ttl_minutes: i64,

    /// Issue tokens without an `exp` claim. Such tokens are whitelisted forever.
    #[arg(long, env, default_value_t = false)]
    pub non_expiring_tokens: bool,

    /// Clock skew allowance in seconds applied to `exp`, `nbf` and `iat` checks.
    #[arg(long, env, default_value_t = 0)]
    pub leeway_seconds: i64,

    /// Optional `iss` claim stamped on every issued token.
    #[arg(long, env = "TOKEN_ISSUER")]
    issuer: Option<String>,

    /// The HMAC secret used to sign and verify tokens.
    #[arg(long, env = "TOKEN_SIGNING_SECRET")]
    signing_secret: Option<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Lifetime of new tokens, or `None` when tokens are issued without expiry.
    pub fn token_ttl_minutes(&self) -> Option<i64> {
        if self.non_expiring_tokens {
            None
        } else {
            Some(self.token_ttl_minutes)
        }
    }

    pub fn issuer(&self) -> Option<String> {
        self.issuer.clone()
    }

    pub fn signing_secret(&self) -> Option<String> {
        self.signing_secret.clone()
    }
}
