use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::Statement;
use crate::domain::{format_cents, Account, Transaction};

/// Statement export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

/// Snapshot of a statement as written to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

/// Writes a statement out in a machine-readable format
pub struct StatementExporter<'a> {
    statement: &'a Statement,
}

impl<'a> StatementExporter<'a> {
    pub fn new(statement: &'a Statement) -> Self {
        Self { statement }
    }

    pub fn export<W: Write>(&self, format: ExportFormat, writer: W) -> Result<usize> {
        match format {
            ExportFormat::Csv => self.export_csv(writer),
            ExportFormat::Json => self
                .export_json(writer)
                .map(|snapshot| snapshot.transactions.len()),
        }
    }

    /// One row per ledger entry, in statement order. Returns the row count.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "occurred_at",
            "kind",
            "amount",
            "description",
        ])?;

        let mut count = 0;
        for transaction in &self.statement.transactions {
            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.sequence.to_string(),
                transaction.occurred_at.to_rfc3339(),
                transaction.kind.as_str().to_string(),
                format_cents(transaction.amount_cents),
                transaction.description.clone().unwrap_or_default(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    pub fn export_json<W: Write>(&self, mut writer: W) -> Result<StatementSnapshot> {
        let snapshot = StatementSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account: self.statement.account.clone(),
            transactions: self.statement.transactions.clone(),
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
