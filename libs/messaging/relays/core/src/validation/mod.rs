//! # Message Validation - Checksum and Parity Policies
//!
//! ## Purpose
//! Decides whether a received `MESG` may be relayed. Every message passes
//! through two integrity layers before any other member sees it:
//!
//! ```text
//! checksum line + MESG text
//!        │
//!        ▼
//!  CRC-32C field check ──mismatch──▶ MERR (checksum)
//!        │
//!        ▼
//!  2D parity verify ──empty─────▶ MERR (parity)      [strict]
//!        │             └──────────▶ warn + relay      [lenient]
//!        ▼
//!    SealedMessage (relayed verbatim)
//! ```
//!
//! ## Policies
//! - **strict** (`enforce_parity = true`): both layers must pass.
//! - **lenient** (`enforce_parity = false`): a parity failure is logged and
//!   the message is still relayed. The checksum layer is never optional.
//!
//! The relay only receives the text, so its parity layer recomputes the
//! block from the received bytes and cannot catch corruption; in practice it
//! fails only for an empty payload. Corruption is caught by the checksum.
//!
//! With `audit = true` every verdict is also written to the `audit` tracing
//! target, independent of the policy.

use crate::config::ValidationPolicy;
use codec::{ProtocolResult, SealedMessage};
use tracing::{debug, warn};

/// Message validator trait
pub trait MessageValidator: Send + Sync {
    /// Verify a checksum field and message text, returning the message to relay
    fn validate(&self, checksum_field: &str, text: &str) -> ProtocolResult<SealedMessage>;

    /// Get validation policy name
    fn policy_name(&self) -> &str;
}

/// Create validator based on policy
pub fn create_validator(policy: &ValidationPolicy) -> Box<dyn MessageValidator> {
    if policy.enforce_parity {
        Box::new(StrictValidator::new(policy.clone()))
    } else {
        Box::new(LenientParityValidator::new(policy.clone()))
    }
}

/// Checksum and parity both enforced
struct StrictValidator {
    policy: ValidationPolicy,
}

impl StrictValidator {
    fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }
}

impl MessageValidator for StrictValidator {
    fn validate(&self, checksum_field: &str, text: &str) -> ProtocolResult<SealedMessage> {
        let result = SealedMessage::open(checksum_field, text).and_then(|mut sealed| {
            let block = sealed.verify_parity()?;
            debug!("{}", block.display(text.as_bytes()));
            Ok(sealed)
        });

        if self.policy.audit {
            audit_log(self.policy_name(), text, &result);
        }

        if result.is_ok() {
            debug!("Checksum and parity validation passed");
        }
        result
    }

    fn policy_name(&self) -> &str {
        "strict"
    }
}

/// Checksum enforced, parity failures logged only
struct LenientParityValidator {
    policy: ValidationPolicy,
}

impl LenientParityValidator {
    fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }
}

impl MessageValidator for LenientParityValidator {
    fn validate(&self, checksum_field: &str, text: &str) -> ProtocolResult<SealedMessage> {
        let result = SealedMessage::open(checksum_field, text).map(|mut sealed| {
            if let Err(e) = sealed.verify_parity() {
                warn!("Parity check failed, relaying anyway: {}", e);
            }
            sealed
        });

        if self.policy.audit {
            audit_log(self.policy_name(), text, &result);
        }

        result
    }

    fn policy_name(&self) -> &str {
        "lenient-parity"
    }
}

fn audit_log(policy: &str, text: &str, validation_result: &ProtocolResult<SealedMessage>) {
    let status = if validation_result.is_ok() {
        "PASS"
    } else {
        "FAIL"
    };

    tracing::info!(
        target: "audit",
        "AUDIT: Message validation {} - Policy: {}, Size: {} bytes",
        status,
        policy,
        text.len()
    );

    if let Err(e) = validation_result {
        tracing::warn!(
            target: "audit",
            "AUDIT: Validation failure ({:?}) reason: {}",
            e.kind(),
            e
        );
    }
}
