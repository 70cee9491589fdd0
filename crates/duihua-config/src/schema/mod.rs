//! Configuration schema types for duihua.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod conversations;
mod presence;
mod system;

pub use conversations::*;
pub use presence::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DuihuaConfig {
    pub presence: PresenceConfig,
    pub conversations: ConversationsConfig,
    pub messages: MessagesConfig,
    pub logging: LoggingConfig,
}
