use std::path::PathBuf;

use thiserror::Error;

pub const CREDENTIALS_HELP: &str = "Please set up your credentials:
1. Get a Client ID and Secret from https://develop.battle.net/
2. Set environment variables:
   export BLIZZARD_CLIENT_ID=\"your_client_id\"
   export BLIZZARD_CLIENT_SECRET=\"your_client_secret\"
3. Or create a .env file in the project root with:
   BLIZZARD_CLIENT_ID=your_client_id
   BLIZZARD_CLIENT_SECRET=your_client_secret";

/// Failures the tools report by kind. Anything else travels as plain
/// `anyhow` context.
#[derive(Debug, Error)]
pub enum SpellError {
    #[error("{} not found", .path.display())]
    MissingConfigFile { path: PathBuf },

    #[error(
        "Blizzard API credentials not found (missing {missing})\n\n{help}",
        help = CREDENTIALS_HELP
    )]
    MissingCredentials { missing: String },

    #[error("failed to get access token (HTTP {status})\nResponse: {body}")]
    AuthFailed { status: u16, body: String },

    #[error("class '{class}' not found (available classes: {})", .available.join(", "))]
    UnknownClass {
        class: String,
        available: Vec<String>,
    },

    #[error("key '{key}' not found for class '{class}'")]
    UnknownKey { class: String, key: String },

    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}
