use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::domain::{InstitutionRecord, InstitutionType, RawAddress};
use crate::error::{PipelineError, Result};

/// Column aliases seen across source files. Headers are matched after
/// lowercasing and folding spaces/dashes to underscores.
const NAME_ALIASES: &[&str] = &["name", "college_name", "institution_name", "institution"];
const TYPE_ALIASES: &[&str] = &["type", "institution_type", "category", "management"];
const STREET_ALIASES: &[&str] = &["address", "address_line", "street", "address1", "location"];
const CITY_ALIASES: &[&str] = &["city", "town", "district_hq"];
const STATE_ALIASES: &[&str] = &["state", "state_name", "state_ut"];
const POSTAL_ALIASES: &[&str] = &["pincode", "pin_code", "pin", "postal_code", "zip"];

#[derive(Debug)]
pub struct IngestOutcome {
    pub records: Vec<InstitutionRecord>,
    /// Rows dropped for having no resolvable institution name
    pub skipped_invalid: usize,
}

/// Map each known field to its column index for one particular file
#[derive(Debug, Default)]
struct ColumnMap {
    name: Option<usize>,
    institution_type: Option<usize>,
    street: Option<usize>,
    city: Option<usize>,
    state: Option<usize>,
    postal_code: Option<usize>,
}

fn fold_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace([' ', '-', '.'], "_")
        .replace("__", "_")
}

fn build_column_map(headers: &csv::StringRecord) -> ColumnMap {
    let folded: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, h)| (fold_header(h), idx))
        .collect();
    let find = |aliases: &[&str]| aliases.iter().find_map(|a| folded.get(*a)).copied();
    ColumnMap {
        name: find(NAME_ALIASES),
        institution_type: find(TYPE_ALIASES),
        street: find(STREET_ALIASES),
        city: find(CITY_ALIASES),
        state: find(STATE_ALIASES),
        postal_code: find(POSTAL_ALIASES),
    }
}

fn field(row: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    let value = row.get(idx?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Load institution records from one CSV file. Column names vary by source,
/// so headers are resolved through the alias tables; rows without a name are
/// skipped with a logged reason. An unreadable file aborts the run.
pub fn load_csv(path: &Path) -> Result<IngestOutcome> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            PipelineError::Config(format!("Failed to open input file '{}': {}", path.display(), e))
        })?;

    let headers = reader.headers()?.clone();
    let columns = build_column_map(&headers);
    if columns.name.is_none() {
        return Err(PipelineError::Validation(format!(
            "No institution name column found in '{}' (headers: {:?})",
            path.display(),
            headers.iter().collect::<Vec<_>>()
        )));
    }

    let mut records = Vec::new();
    let mut skipped_invalid = 0usize;
    for (row_number, row) in reader.records().enumerate() {
        let row = row?;
        let Some(name) = field(&row, columns.name) else {
            warn!(
                row = row_number + 2, // 1-based, after the header line
                file = %path.display(),
                "skipping record: missing institution name"
            );
            skipped_invalid += 1;
            continue;
        };

        let institution_type = field(&row, columns.institution_type)
            .map(|t| InstitutionType::parse(&t))
            .unwrap_or(InstitutionType::Other);

        let raw_address = RawAddress {
            street: field(&row, columns.street),
            city: field(&row, columns.city),
            state: field(&row, columns.state),
            postal_code: field(&row, columns.postal_code),
        };

        records.push(InstitutionRecord::new(name, institution_type, raw_address));
    }

    info!(
        "Ingested {} records from {} ({} skipped)",
        records.len(),
        path.display(),
        skipped_invalid
    );
    Ok(IngestOutcome {
        records,
        skipped_invalid,
    })
}
