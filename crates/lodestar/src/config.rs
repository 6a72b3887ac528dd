use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "lodestar")]
#[command(about = "Lodestar Account Server", long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Start the account server
    Serve(ServeConfig),

    /// Run database migrations
    Migrate {
        /// Database connection URL
        #[arg(
            long,
            env = "DATABASE_URL",
            default_value = "sqlite://./lodestar.db?mode=rwc"
        )]
        database_url: String,
    },

    /// List all accounts
    ListAccounts {
        #[arg(
            long,
            env = "DATABASE_URL",
            default_value = "sqlite://./lodestar.db?mode=rwc"
        )]
        database_url: String,
    },

    /// Clear an account's stored refresh token, ending its session
    RevokeSession {
        #[arg(
            long,
            env = "DATABASE_URL",
            default_value = "sqlite://./lodestar.db?mode=rwc"
        )]
        database_url: String,

        /// Username of the account
        #[arg(short, long)]
        username: String,
    },
}

#[derive(Debug, Clone, Parser)]
pub struct ServeConfig {
    /// Database connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://./lodestar.db?mode=rwc"
    )]
    pub database_url: String,

    /// Server bind address
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1:8000")]
    pub bind_address: String,

    /// Allowed CORS origins (comma-separated)
    #[arg(
        long,
        env = "CORS_ORIGINS",
        default_value = "http://localhost:3000,http://localhost:5173"
    )]
    pub cors_origins: String,

    /// Base URL for the server, used as the token issuer claim
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Secret used to sign access tokens
    #[arg(long, env = "ACCESS_TOKEN_SECRET", hide_env_values = true)]
    pub access_token_secret: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_EXPIRY", default_value = "86400")]
    pub access_token_expiry: i64,

    /// Secret used to sign refresh tokens (must differ from the access secret)
    #[arg(long, env = "REFRESH_TOKEN_SECRET", hide_env_values = true)]
    pub refresh_token_secret: String,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_EXPIRY", default_value = "864000")]
    pub refresh_token_expiry: i64,

    /// Cloudinary cloud name
    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    pub cloudinary_cloud_name: String,

    /// Cloudinary API key
    #[arg(long, env = "CLOUDINARY_API_KEY")]
    pub cloudinary_api_key: String,

    /// Cloudinary API secret
    #[arg(long, env = "CLOUDINARY_API_SECRET", hide_env_values = true)]
    pub cloudinary_api_secret: String,

    /// Optional Cloudinary folder for uploads
    #[arg(long, env = "CLOUDINARY_FOLDER")]
    pub cloudinary_folder: Option<String>,

    /// Directory where multipart uploads are buffered before being sent to Cloudinary
    #[arg(long, env = "UPLOAD_DIR", default_value = "./public/temp")]
    pub upload_dir: PathBuf,

    /// Maximum accepted size of a multipart request, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: usize,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl ServeConfig {
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_token_secret.trim().is_empty() || self.refresh_token_secret.trim().is_empty()
        {
            anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must be non-empty");
        }
        if self.access_token_secret == self.refresh_token_secret {
            anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            anyhow::bail!("Token expiry values must be positive");
        }
        Ok(())
    }
}
