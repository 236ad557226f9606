//! Daily ledger snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Balances keyed by cash point name (`caisse`, `fundex`, ...).
pub type Balances = BTreeMap<String, CashPointBalance>;

/// Open client context (ip, agent, tags). Stored as-is.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketBalance {
    #[serde(default)]
    pub opening: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing: Option<Decimal>,
}

/// Opening/closing amounts of one cash point, optionally split per currency-like bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashPointBalance {
    #[serde(default)]
    pub opening: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing: Option<Decimal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub buckets: BTreeMap<String, BucketBalance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// One transaction line of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub section: String,
    pub direction: Direction,
    pub amount: Decimal,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionTotals {
    pub credit: Decimal,
    pub debit: Decimal,
}

/// Aggregate derived from the entries when the snapshot is saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub net: Decimal,
    pub entry_count: u32,
    #[serde(default)]
    pub sections: BTreeMap<String, SectionTotals>,
}

impl Totals {
    /// Sum the entries per direction and section.
    ///
    /// Fails with a validation error when a sum leaves the `Decimal` range.
    pub fn from_entries(entries: &[Entry]) -> Result<Self, CoreError> {
        let mut totals = Totals::default();
        for (index, entry) in entries.iter().enumerate() {
            let section = totals.sections.entry(entry.section.clone()).or_default();
            let (total, section_total) = match entry.direction {
                Direction::Credit => (&mut totals.total_credit, &mut section.credit),
                Direction::Debit => (&mut totals.total_debit, &mut section.debit),
            };
            *total = checked_sum(*total, entry.amount, index)?;
            *section_total = checked_sum(*section_total, entry.amount, index)?;
        }
        totals.net = totals
            .total_credit
            .checked_sub(totals.total_debit)
            .ok_or_else(|| CoreError::validation("net total is out of range"))?;
        totals.entry_count = u32::try_from(entries.len())
            .map_err(|_| CoreError::validation("too many entries"))?;
        Ok(totals)
    }
}

fn checked_sum(total: Decimal, amount: Decimal, index: usize) -> Result<Decimal, CoreError> {
    total.checked_add(amount).ok_or_else(|| {
        CoreError::validation(format!("entry {index}: running total is out of range"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Active,
    Archived,
    Deleted,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Active => "active",
            OperationStatus::Archived => "archived",
            OperationStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OperationStatus::Active),
            "archived" => Ok(OperationStatus::Archived),
            "deleted" => Ok(OperationStatus::Deleted),
            other => Err(format!("unknown operation status '{other}'")),
        }
    }
}

/// A save request for one owner and day, as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDraft {
    pub date: NaiveDate,
    #[serde(default)]
    pub balances: Balances,
    #[serde(default, alias = "operations")]
    pub entries: Vec<Entry>,
    /// Totals as computed by the client; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl OperationDraft {
    /// Reject malformed lines before anything touches the store.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, balance) in &self.balances {
            if name.trim().is_empty() {
                return Err(CoreError::validation("cash point name must not be empty"));
            }
            if balance.buckets.keys().any(|bucket| bucket.trim().is_empty()) {
                return Err(CoreError::validation(format!(
                    "cash point '{name}' has an unnamed bucket"
                )));
            }
        }
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.section.trim().is_empty() {
                return Err(CoreError::validation(format!(
                    "entry {index}: section is required"
                )));
            }
            if entry.amount.is_sign_negative() {
                return Err(CoreError::validation(format!(
                    "entry {index}: amount must not be negative"
                )));
            }
        }
        Totals::from_entries(&self.entries)?;
        Ok(())
    }
}

/// A stored daily snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub balances: Balances,
    pub entries: Vec<Entry>,
    pub totals: Totals,
    pub metadata: Metadata,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperationRecord {
    /// Whole-object snapshot recorded in the audit trail.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("valid decimal literal")
    }

    fn entry(section: &str, direction: Direction, amount: &str) -> Entry {
        Entry {
            section: section.to_string(),
            direction,
            amount: dec(amount),
            note: String::new(),
        }
    }

    #[test]
    fn test_totals_from_entries() {
        let entries = vec![
            entry("caisse", Direction::Credit, "1000.50"),
            entry("caisse", Direction::Debit, "200"),
            entry("fundex", Direction::Credit, "300"),
        ];
        let totals = Totals::from_entries(&entries).unwrap();
        assert_eq!(totals.total_credit, dec("1300.50"));
        assert_eq!(totals.total_debit, dec("200"));
        assert_eq!(totals.net, dec("1100.50"));
        assert_eq!(totals.entry_count, 3);
        assert_eq!(totals.sections["caisse"].credit, dec("1000.50"));
        assert_eq!(totals.sections["caisse"].debit, dec("200"));
        assert_eq!(totals.sections["fundex"].debit, Decimal::ZERO);
    }

    #[test]
    fn test_empty_entries_give_zero_totals() {
        let totals = Totals::from_entries(&[]).unwrap();
        assert_eq!(totals, Totals::default());
    }

    #[test]
    fn test_draft_accepts_operations_alias_and_numbers() {
        let draft: OperationDraft = serde_json::from_value(serde_json::json!({
            "date": "2024-01-01",
            "balances": {"caisse": {"opening": 1000}},
            "operations": [
                {"section": "caisse", "direction": "credit", "amount": 250.25, "note": "deposit"}
            ],
            "metadata": {"ip": "10.0.0.7"}
        }))
        .unwrap();

        assert_eq!(draft.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(draft.balances["caisse"].opening, dec("1000"));
        assert_eq!(draft.entries.len(), 1);
        assert_eq!(draft.entries[0].amount, dec("250.25"));
        assert_eq!(draft.metadata["ip"], "10.0.0.7");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_draft_requires_date() {
        let result: Result<OperationDraft, _> =
            serde_json::from_value(serde_json::json!({"balances": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_negative_amount() {
        let draft = OperationDraft {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            balances: Balances::new(),
            entries: vec![entry("caisse", Direction::Debit, "-5")],
            totals: None,
            metadata: Metadata::new(),
        };
        let err = draft.validate().unwrap_err();
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn test_totals_out_of_range_are_rejected() {
        let draft: OperationDraft = serde_json::from_value(serde_json::json!({
            "date": "2024-01-01",
            "entries": [
                {"section": "caisse", "direction": "credit", "amount": 7e28},
                {"section": "caisse", "direction": "credit", "amount": 7e28}
            ]
        }))
        .unwrap();
        assert_eq!(draft.entries[0].amount, dec("70000000000000000000000000000"));

        let err = draft.validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("entry 1: running total is out of range"));
        assert!(Totals::from_entries(&draft.entries).is_err());
    }

    #[test]
    fn test_amounts_keep_full_precision() {
        let entry: Entry = serde_json::from_str(
            r#"{"section": "caisse", "direction": "credit", "amount": 12345678901234567.89}"#,
        )
        .unwrap();
        assert_eq!(entry.amount, dec("12345678901234567.89"));

        let stored = serde_json::to_string(&entry.amount).unwrap();
        assert_eq!(stored, "12345678901234567.89");
        let value = serde_json::to_value(&entry).unwrap();
        let back: Entry = serde_json::from_value(value).unwrap();
        assert_eq!(back.amount, entry.amount);
    }

    #[test]
    fn test_validate_rejects_blank_section() {
        let draft = OperationDraft {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            balances: Balances::new(),
            entries: vec![entry("  ", Direction::Credit, "5")],
            totals: None,
            metadata: Metadata::new(),
        };
        assert!(matches!(draft.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            OperationStatus::Active,
            OperationStatus::Archived,
            OperationStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
        assert!("purged".parse::<OperationStatus>().is_err());
    }
}
