//! File loaders for seeding settings and rules, and CSV exchange of historical sales and users.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::commission::{CommissionSettings, RuleDraft, RuleUsed, Tier, ValidationError};
use crate::recalculation::{SaleCommission, SaleId, SaleRecord, UserId, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unable to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid {field} '{value}'")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {row}: {source}")]
    Validation {
        row: usize,
        #[source]
        source: ValidationError,
    },
}

fn open(path: &Path) -> Result<BufReader<File>, ImportError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ImportError> {
    serde_json::from_reader(open(path)?).map_err(|source| ImportError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Commission settings stored as a single JSON object.
pub fn load_settings(path: impl AsRef<Path>) -> Result<CommissionSettings, ImportError> {
    read_json(path.as_ref())
}

/// Rule drafts stored as a JSON array; they still go through validation when created.
pub fn load_rule_drafts(path: impl AsRef<Path>) -> Result<Vec<RuleDraft>, ImportError> {
    read_json(path.as_ref())
}

pub fn sales_from_path(path: impl AsRef<Path>) -> Result<Vec<SaleRecord>, ImportError> {
    parse_sales(open(path.as_ref())?)
}

pub fn users_from_path(path: impl AsRef<Path>) -> Result<Vec<UserProfile>, ImportError> {
    parse_users(open(path.as_ref())?)
}

#[derive(Debug, Deserialize, Serialize)]
struct SaleRow {
    sale_id: String,
    user_id: String,
    total_amount: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    liters: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    commission_amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    commission_rate: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rule_used: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    cashback_earned: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    settings_snapshot: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    user_id: String,
    tier: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    sales_count: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    network_size: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    growth_rate: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

fn parse_field<T: FromStr>(row: usize, field: &'static str, raw: &str) -> Result<T, ImportError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ImportError::InvalidField {
            row,
            field,
            value: raw.to_string(),
        })
}

fn parse_optional<T: FromStr>(
    row: usize,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<T>, ImportError> {
    raw.map(|value| parse_field(row, field, value)).transpose()
}

pub fn parse_sales<R: Read>(reader: R) -> Result<Vec<SaleRecord>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut sales = Vec::new();

    for (index, record) in csv_reader.deserialize::<SaleRow>().enumerate() {
        let row = record?;
        let line = index + 1;

        let commission = match row.commission_amount.as_deref() {
            Some(amount) => Some(SaleCommission {
                amount: parse_field::<Decimal>(line, "commission_amount", amount)?,
                rate: parse_optional::<Decimal>(line, "commission_rate", row.commission_rate.as_deref())?
                    .unwrap_or(Decimal::ZERO),
                rule_used: RuleUsed::from_label(row.rule_used.as_deref().unwrap_or_default()),
            }),
            None => None,
        };

        sales.push(SaleRecord {
            id: SaleId(row.sale_id),
            user_id: UserId(row.user_id),
            total_amount: parse_field(line, "total_amount", &row.total_amount)?,
            liters: parse_optional(line, "liters", row.liters.as_deref())?,
            commission,
            cashback_earned: parse_optional(line, "cashback_earned", row.cashback_earned.as_deref())?,
            settings_snapshot: row.settings_snapshot,
        });
    }

    Ok(sales)
}

pub fn parse_users<R: Read>(reader: R) -> Result<Vec<UserProfile>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut users = Vec::new();

    for (index, record) in csv_reader.deserialize::<UserRow>().enumerate() {
        let row = record?;
        let line = index + 1;
        let tier = row
            .tier
            .parse::<Tier>()
            .map_err(|source| ImportError::Validation { row: line, source })?;

        users.push(UserProfile {
            id: UserId(row.user_id),
            tier,
            sales_count: parse_optional(line, "sales_count", row.sales_count.as_deref())?,
            network_size: parse_optional(line, "network_size", row.network_size.as_deref())?,
            growth_rate: parse_optional(line, "growth_rate", row.growth_rate.as_deref())?,
        });
    }

    Ok(users)
}

/// Write sales back out in the same column layout `parse_sales` reads.
pub fn write_sales<W: Write>(writer: W, sales: &[SaleRecord]) -> Result<(), ImportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for sale in sales {
        let commission = sale.commission.as_ref();
        csv_writer.serialize(SaleRow {
            sale_id: sale.id.0.clone(),
            user_id: sale.user_id.0.clone(),
            total_amount: sale.total_amount.to_string(),
            liters: sale.liters.map(|liters| liters.to_string()),
            commission_amount: commission.map(|c| c.amount.to_string()),
            commission_rate: commission.map(|c| c.rate.to_string()),
            rule_used: commission.map(|c| c.rule_used.to_string()),
            cashback_earned: sale.cashback_earned.map(|cashback| cashback.to_string()),
            settings_snapshot: sale.settings_snapshot.clone(),
        })?;
    }

    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const SALES: &str = "\
sale_id,user_id,total_amount,liters,commission_amount,commission_rate,rule_used,cashback_earned,settings_snapshot
s-1,u-1,1000.00,50,40.00,4.00,fallback,20.00,settings-v1
s-2,u-2,250,,,,,,
";

    #[test]
    fn parses_sales_with_optional_columns() {
        let sales = parse_sales(Cursor::new(SALES)).expect("sales parse");

        assert_eq!(sales.len(), 2);
        let first = &sales[0];
        assert_eq!(first.id, SaleId("s-1".to_string()));
        assert_eq!(first.liters, Some(dec!(50)));
        let commission = first.commission.as_ref().expect("commission present");
        assert_eq!(commission.amount, dec!(40.00));
        assert_eq!(commission.rule_used, RuleUsed::Fallback);
        assert_eq!(first.settings_snapshot.as_deref(), Some("settings-v1"));

        let second = &sales[1];
        assert!(second.liters.is_none());
        assert!(second.commission.is_none());
        assert!(second.cashback_earned.is_none());
    }

    #[test]
    fn reports_row_for_invalid_amount() {
        let csv = "sale_id,user_id,total_amount\ns-1,u-1,lots\n";
        match parse_sales(Cursor::new(csv)) {
            Err(ImportError::InvalidField { row, field, value }) => {
                assert_eq!(row, 1);
                assert_eq!(field, "total_amount");
                assert_eq!(value, "lots");
            }
            other => panic!("expected invalid field, got {other:?}"),
        }
    }

    #[test]
    fn parses_users_and_rejects_unknown_tier() {
        let users = parse_users(Cursor::new(
            "user_id,tier,sales_count,network_size,growth_rate\nu-1,Gold,12,,0.15\n",
        ))
        .expect("users parse");
        assert_eq!(users[0].tier, Tier::Gold);
        assert_eq!(users[0].sales_count, Some(12));
        assert_eq!(users[0].network_size, None);
        assert_eq!(users[0].growth_rate, Some(dec!(0.15)));

        let unknown = parse_users(Cursor::new("user_id,tier\nu-2,diamond\n"));
        assert!(matches!(
            unknown,
            Err(ImportError::Validation {
                row: 1,
                source: ValidationError::UnknownTier(_)
            })
        ));
    }

    #[test]
    fn written_sales_read_back_identically() {
        let sales = parse_sales(Cursor::new(SALES)).expect("sales parse");
        let mut buffer = Vec::new();
        write_sales(&mut buffer, &sales).expect("sales written");

        let reparsed = parse_sales(Cursor::new(buffer)).expect("written sales parse");
        assert_eq!(reparsed, sales);
    }
}
