//! Consistency checks on decoded IFO tables.
//!
//! Real discs break the nominal layout in known ways, so a failed check is a
//! `Violation` handed to a `StrictnessPolicy`. The default policy logs and
//! keeps decoding; the strict one turns the first violation into an error.

use std::fmt;

use super::IfoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A reserved field that must be zero is not.
    NonZero,
    /// A cross-field bound does not hold.
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Table being decoded, e.g. `vmgi_mat`.
    pub table: &'static str,
    /// Field name or the failed expression.
    pub check: String,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::NonZero => write!(f, "{}: {} not zero ({})", self.table, self.check, self.detail),
            ViolationKind::Value => write!(f, "{}: check `{}` failed ({})", self.table, self.check, self.detail),
        }
    }
}

pub trait StrictnessPolicy: Send + Sync {
    fn on_violation(&self, violation: Violation) -> Result<(), IfoError>;
}

/// Logs every violation and continues.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lenient;

impl StrictnessPolicy for Lenient {
    fn on_violation(&self, violation: Violation) -> Result<(), IfoError> {
        tracing::debug!(target: "dvdnav::ifo", "tolerated: {}", violation);
        Ok(())
    }
}

/// Fails on the first violation. Used for conformance runs and fuzzing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Strict;

impl StrictnessPolicy for Strict {
    fn on_violation(&self, violation: Violation) -> Result<(), IfoError> {
        tracing::warn!(target: "dvdnav::ifo", "strict: {}", violation);
        Err(IfoError::Strict(violation))
    }
}

/// Check helper bound to one table.
pub(crate) struct Checker<'a> {
    policy: &'a dyn StrictnessPolicy,
    table: &'static str,
}

impl<'a> Checker<'a> {
    pub fn new(policy: &'a dyn StrictnessPolicy, table: &'static str) -> Self {
        Self { policy, table }
    }

    pub fn zero<T>(&self, field: &str, value: T) -> Result<(), IfoError>
    where
        T: Default + PartialEq + fmt::Debug,
    {
        if value == T::default() {
            return Ok(());
        }
        self.policy.on_violation(Violation {
            kind: ViolationKind::NonZero,
            table: self.table,
            check: field.to_string(),
            detail: format!("{value:?}"),
        })
    }

    pub fn zero_bytes(&self, field: &str, bytes: &[u8]) -> Result<(), IfoError> {
        if bytes.iter().all(|&b| b == 0) {
            return Ok(());
        }
        self.policy.on_violation(Violation {
            kind: ViolationKind::NonZero,
            table: self.table,
            check: field.to_string(),
            detail: format!("{} non-zero bytes", bytes.iter().filter(|&&b| b != 0).count()),
        })
    }

    pub fn value(&self, ok: bool, check: &str, detail: impl fmt::Display) -> Result<(), IfoError> {
        if ok {
            return Ok(());
        }
        self.policy.on_violation(Violation {
            kind: ViolationKind::Value,
            table: self.table,
            check: check.to_string(),
            detail: detail.to_string(),
        })
    }
}
