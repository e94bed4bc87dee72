pub mod blizzard;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod http;
pub mod keybinds;
pub mod merge;
pub mod probe;
pub mod prompt;
pub mod reconcile;
pub mod runtime;
pub mod tooltip;
pub mod wowhead;

pub use error::SpellError;
pub use keybinds::SpellId;
