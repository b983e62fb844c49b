//! Kernel configuration
//!
//! Every field has a default, so a board description only needs to name
//! what it changes:
//!
//! ```json
//! { "heap_quota_bytes": 8192, "max_queue_depth": 4 }
//! ```

use alloc::string::ToString;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Tunables for one kernel instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Bytes of heap kernel objects (wait sets, queues, channels) may use
    pub heap_quota_bytes: usize,
    /// Audit events kept before the oldest are dropped
    pub audit_capacity: usize,
    /// Largest depth a message queue may be created with
    pub max_queue_depth: usize,
    /// Largest message size a queue may be created with
    pub max_message_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            heap_quota_bytes: 16 * 1024,
            audit_capacity: 1024,
            max_queue_depth: 64,
            max_message_size: 256,
        }
    }
}

impl KernelConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        let config: KernelConfig =
            serde_json::from_str(json).map_err(|e| KernelError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no kernel can run with.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.max_queue_depth == 0 {
            return Err(KernelError::InvalidConfig(
                "max_queue_depth must be non-zero".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(KernelError::InvalidConfig(
                "max_message_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
