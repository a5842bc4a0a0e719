//! Audit log entries produced by the ledger
//!
//! The audit sink is append-only and write-only from the ledger's point of
//! view: entries are never read back to make decisions.

use super::transaction::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Transaction,
    Balance,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityType::Transaction => "transaction",
            EntityType::Balance => "balance",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
        })
    }
}

/// One appended audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: EntityType,
    pub entity_id: u64,
    pub action: AuditAction,
    pub details: String,
    pub actor_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        entity_type: EntityType,
        entity_id: u64,
        action: AuditAction,
        details: impl Into<String>,
        actor_user_id: UserId,
    ) -> Self {
        AuditEntry {
            entity_type,
            entity_id,
            action,
            details: details.into(),
            actor_user_id,
            created_at: Utc::now(),
        }
    }
}
