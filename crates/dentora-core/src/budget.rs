//! Budgets (treatment plans) and their lifecycle.
//!
//! A budget moves through `draft -> active -> completed`, with an
//! `active -> draft` revert path. Guards for each transition live here so
//! every storage backend enforces the same rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Lifecycle state of a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Draft,
    Active,
    Completed,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(CoreError::validation(
                "status",
                format!("unknown budget status '{other}'"),
            )),
        }
    }
}

/// A single priced line of a budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetItem {
    pub id: Uuid,
    pub budget_id: Uuid,
    pub service_id: Option<Uuid>,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub position: i32,
}

impl BudgetItem {
    pub fn line_total(quantity: u32, unit_price_cents: i64) -> i64 {
        i64::from(quantity) * unit_price_cents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: BudgetStatus,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub total_cents: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub activated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl Budget {
    pub fn can_activate(&self, item_count: usize) -> bool {
        self.status == BudgetStatus::Draft && item_count > 0
    }

    pub fn can_complete(&self) -> bool {
        self.status == BudgetStatus::Active
    }

    pub fn can_revert(&self) -> bool {
        self.status == BudgetStatus::Active
    }

    pub fn can_edit(&self) -> bool {
        self.status == BudgetStatus::Draft
    }

    pub fn can_delete(&self) -> bool {
        self.status == BudgetStatus::Draft
    }

    pub fn ensure_can_activate(&self, item_count: usize) -> Result<()> {
        if self.status != BudgetStatus::Draft {
            return Err(CoreError::invalid_transition(
                "budget",
                "activated",
                self.status.as_str(),
            ));
        }
        if item_count == 0 {
            return Err(CoreError::conflict("an empty budget cannot be activated"));
        }
        Ok(())
    }

    pub fn ensure_can_complete(&self) -> Result<()> {
        if !self.can_complete() {
            return Err(CoreError::invalid_transition(
                "budget",
                "completed",
                self.status.as_str(),
            ));
        }
        Ok(())
    }

    pub fn ensure_can_revert(&self) -> Result<()> {
        if !self.can_revert() {
            return Err(CoreError::invalid_transition(
                "budget",
                "reverted",
                self.status.as_str(),
            ));
        }
        Ok(())
    }

    pub fn ensure_can_edit(&self) -> Result<()> {
        if !self.can_edit() {
            return Err(CoreError::invalid_transition(
                "budget",
                "edited",
                self.status.as_str(),
            ));
        }
        Ok(())
    }

    pub fn ensure_can_delete(&self) -> Result<()> {
        if !self.can_delete() {
            return Err(CoreError::invalid_transition(
                "budget",
                "deleted",
                self.status.as_str(),
            ));
        }
        Ok(())
    }
}

/// Recomputes every line total in place and returns the budget total.
///
/// Totals are stored denormalised; this is the single place that derives
/// them, so a budget's `total_cents` always equals the sum of its lines.
pub fn recompute_totals(items: &mut [BudgetItem]) -> i64 {
    let mut total = 0i64;
    for item in items.iter_mut() {
        item.line_total_cents = BudgetItem::line_total(item.quantity, item.unit_price_cents);
        total += item.line_total_cents;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::generate_id;
    use time::macros::datetime;

    fn budget(status: BudgetStatus) -> Budget {
        Budget {
            id: generate_id(),
            patient_id: generate_id(),
            doctor_id: generate_id(),
            status,
            title: "Implant plan".to_string(),
            notes: None,
            total_cents: 0,
            created_at: datetime!(2026-01-10 09:00:00 UTC),
            updated_at: datetime!(2026-01-10 09:00:00 UTC),
            activated_at: None,
            completed_at: None,
        }
    }

    fn item(quantity: u32, unit_price_cents: i64) -> BudgetItem {
        BudgetItem {
            id: generate_id(),
            budget_id: generate_id(),
            service_id: None,
            description: "Cleaning".to_string(),
            quantity,
            unit_price_cents,
            line_total_cents: 0,
            position: 0,
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            BudgetStatus::Draft,
            BudgetStatus::Active,
            BudgetStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<BudgetStatus>().unwrap(), status);
        }
        assert!("archived".parse::<BudgetStatus>().is_err());
    }

    #[test]
    fn test_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&BudgetStatus::Draft).unwrap(),
            "\"draft\""
        );
        let back: BudgetStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(back, BudgetStatus::Active);
    }

    #[test]
    fn test_draft_guards() {
        let b = budget(BudgetStatus::Draft);
        assert!(b.can_activate(2));
        assert!(!b.can_activate(0));
        assert!(b.can_edit());
        assert!(b.can_delete());
        assert!(!b.can_complete());
        assert!(!b.can_revert());
    }

    #[test]
    fn test_active_guards() {
        let b = budget(BudgetStatus::Active);
        assert!(!b.can_activate(2));
        assert!(!b.can_edit());
        assert!(!b.can_delete());
        assert!(b.can_complete());
        assert!(b.can_revert());
    }

    #[test]
    fn test_completed_guards() {
        let b = budget(BudgetStatus::Completed);
        assert!(!b.can_activate(2));
        assert!(!b.can_edit());
        assert!(!b.can_delete());
        assert!(!b.can_complete());
        assert!(!b.can_revert());
    }

    #[test]
    fn test_ensure_can_activate_empty_budget() {
        let b = budget(BudgetStatus::Draft);
        match b.ensure_can_activate(0) {
            Err(CoreError::Conflict(msg)) => assert!(msg.contains("empty")),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_can_activate_wrong_status() {
        let b = budget(BudgetStatus::Completed);
        match b.ensure_can_activate(3) {
            Err(CoreError::InvalidTransition { status, .. }) => assert_eq!(status, "completed"),
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_can_delete_active() {
        let b = budget(BudgetStatus::Active);
        let err = b.ensure_can_delete().unwrap_err();
        assert_eq!(err.to_string(), "budget cannot be deleted while active");
    }

    #[test]
    fn test_recompute_totals() {
        let mut items = vec![item(2, 4_500), item(1, 12_000), item(3, 0)];
        let total = recompute_totals(&mut items);
        assert_eq!(items[0].line_total_cents, 9_000);
        assert_eq!(items[1].line_total_cents, 12_000);
        assert_eq!(items[2].line_total_cents, 0);
        assert_eq!(total, 21_000);
    }

    #[test]
    fn test_recompute_totals_empty() {
        let mut items: Vec<BudgetItem> = Vec::new();
        assert_eq!(recompute_totals(&mut items), 0);
    }
}
