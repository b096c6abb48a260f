use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::airr::{Cell, CellBuilder, Chain, ChainBuilder};
use crate::domain::{Locus, LocusCall};
use crate::error::KiraError;
use crate::http;
use crate::locus::{DEFAULT_GENE_KEYS, infer_locus};
use crate::table::{Row, SourceTable};

pub const DEFAULT_EXPORT_URL: &str =
    "https://www.iedb.org/downloader.php?file_name=doc/receptor_full_v3.zip";

pub const CELL_ID_COLUMN: &str = "cell_id";

pub const DEDUP_KEYS: [&str; 7] = [
    "Chain 1 CDR3 Curated",
    "Chain 2 CDR3 Curated",
    "Organism",
    "Antigen",
    "Response Type",
    "Chain 1 Type",
    "Chain 2 Type",
];

pub const CURATED_FIELDS: [&str; 8] = [
    "Chain 1 CDR3 Curated",
    "Chain 2 CDR3 Curated",
    "Curated Chain 1 V Gene",
    "Curated Chain 2 V Gene",
    "Curated Chain 1 D Gene",
    "Curated Chain 2 D Gene",
    "Curated Chain 1 J Gene",
    "Curated Chain 2 J Gene",
];

pub const CELL_METADATA_FIELDS: [&str; 6] = [
    "Receptor ID",
    "Antigen",
    "Organism",
    "Response Type",
    "Reference IRI",
    "Epitope IRI",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainType {
    Alpha,
    Beta,
    Heavy,
    Light,
    Gamma,
    Delta,
}

impl ChainType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "alpha" => Some(ChainType::Alpha),
            "beta" => Some(ChainType::Beta),
            "heavy" => Some(ChainType::Heavy),
            "light" => Some(ChainType::Light),
            "gamma" => Some(ChainType::Gamma),
            "delta" => Some(ChainType::Delta),
            _ => None,
        }
    }

    pub fn locus(self) -> LocusCall {
        match self {
            ChainType::Alpha => LocusCall::Resolved(Locus::Tra),
            ChainType::Beta => LocusCall::Resolved(Locus::Trb),
            ChainType::Heavy => LocusCall::Resolved(Locus::Igh),
            ChainType::Gamma => LocusCall::Resolved(Locus::Trg),
            ChainType::Delta => LocusCall::Resolved(Locus::Trd),
            ChainType::Light => LocusCall::Unresolved {
                reason: "light chain without kappa/lambda annotation".to_string(),
            },
        }
    }
}

struct ChainColumns {
    chain_type: &'static str,
    cdr3: &'static str,
    v_gene: &'static str,
    d_gene: &'static str,
    j_gene: &'static str,
}

const CHAIN_COLUMNS: [ChainColumns; 2] = [
    ChainColumns {
        chain_type: "Chain 1 Type",
        cdr3: "Chain 1 CDR3 Curated",
        v_gene: "Curated Chain 1 V Gene",
        d_gene: "Curated Chain 1 D Gene",
        j_gene: "Curated Chain 1 J Gene",
    },
    ChainColumns {
        chain_type: "Chain 2 Type",
        cdr3: "Chain 2 CDR3 Curated",
        v_gene: "Curated Chain 2 V Gene",
        d_gene: "Curated Chain 2 D Gene",
        j_gene: "Curated Chain 2 J Gene",
    },
];

pub trait IedbClient: Send + Sync {
    fn fetch_table(&self) -> Result<SourceTable, KiraError>;
}

#[derive(Clone)]
pub struct IedbHttpClient {
    client: Client,
    export_url: String,
}

impl IedbHttpClient {
    pub fn new(export_url: impl Into<String>) -> Result<Self, KiraError> {
        let client = http::build_client(Duration::from_secs(600))
            .map_err(|err| KiraError::IedbHttp(err.to_string()))?;
        Ok(Self {
            client,
            export_url: export_url.into(),
        })
    }
}

impl IedbClient for IedbHttpClient {
    fn fetch_table(&self) -> Result<SourceTable, KiraError> {
        tracing::info!(url = %self.export_url, "downloading IEDB receptor export");
        let response = http::send_with_retries(|| self.client.get(&self.export_url))
            .map_err(|err| KiraError::IedbHttp(err.to_string()))?;
        let response = http::check_status(response)
            .map_err(|(status, message)| KiraError::IedbStatus { status, message })?;

        let temp_dir = tempfile::Builder::new()
            .prefix("kira-airr-iedb")
            .tempdir()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let archive_path = temp_dir.path().join("receptor_full_v3.zip");
        http::write_response_to_file(response, &archive_path)?;

        let csv_path =
            crate::fs_util::extract_zip_entry(&archive_path, temp_dir.path(), "*.csv", |name| {
                name.to_ascii_lowercase().ends_with(".csv")
            })?;
        let file = File::open(&csv_path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        SourceTable::from_reader(BufReader::new(file), b',')
    }
}

pub fn preprocess(table: &mut SourceTable) -> Result<(), KiraError> {
    let fetched = table.len();
    table.drop_duplicates();
    table.drop_duplicates_on(&DEDUP_KEYS)?;

    for curated in CURATED_FIELDS {
        let calculated = curated.replace("Curated", "Calculated");
        table.fill_and_uppercase(curated, &calculated)?;
    }

    table.push_position_column(CELL_ID_COLUMN);
    let deduplicated = table.len();

    for columns in &CHAIN_COLUMNS {
        table.column_index(columns.chain_type)?;
    }
    table.retain(|row| {
        CHAIN_COLUMNS.iter().all(|columns| {
            row.get_opt(columns.chain_type)
                .and_then(ChainType::from_label)
                .is_some()
        })
    });

    tracing::info!(
        fetched,
        deduplicated,
        accepted = table.len(),
        "IEDB table preprocessed"
    );
    Ok(())
}

#[derive(Debug, Default)]
pub struct LocusWarnings {
    counts: BTreeMap<String, usize>,
}

impl LocusWarnings {
    pub fn record(&mut self, cell_id: &str, reason: &str) -> bool {
        let count = self.counts.entry(reason.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            tracing::warn!(cell_id, reason, "could not resolve chain locus");
            return true;
        }
        false
    }

    pub fn count(&self, reason: &str) -> usize {
        self.counts.get(reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    fn summarize(&self) {
        if self.counts.is_empty() {
            return;
        }
        for (reason, count) in &self.counts {
            tracing::debug!(reason, count, "unresolved locus reason");
        }
        tracing::warn!(total = self.total(), "chains left with unresolved locus");
    }
}

/// Turns preprocessed IEDB rows into cells; call [`preprocess`] first.
pub fn normalize(table: &SourceTable) -> Result<Vec<Cell>, KiraError> {
    let kinds = table.column_kinds(&CELL_METADATA_FIELDS);
    let mut warnings = LocusWarnings::default();
    let mut cells = Vec::with_capacity(table.len());

    for row in table.rows() {
        let cell_id = row
            .get(CELL_ID_COLUMN)?
            .ok_or_else(|| KiraError::MissingColumn(CELL_ID_COLUMN.to_string()))?;
        let mut cell = CellBuilder::new(cell_id);
        for field in CELL_METADATA_FIELDS {
            cell.set(field, row.scalar(field, kinds[field]));
        }
        for columns in &CHAIN_COLUMNS {
            let chain = row_chain(&row, columns)?;
            if let LocusCall::Unresolved { reason } = &chain.locus {
                warnings.record(cell_id, reason);
            }
            cell.add_chain(chain);
        }
        cells.push(cell.build());
    }

    warnings.summarize();
    Ok(cells)
}

fn row_chain(row: &Row<'_>, columns: &ChainColumns) -> Result<Chain, KiraError> {
    let label = row.get(columns.chain_type)?;
    let locus = match label.and_then(ChainType::from_label) {
        Some(chain_type) => chain_type.locus(),
        None => LocusCall::Unresolved {
            reason: format!("unsupported chain type {label:?}"),
        },
    };
    let chain = ChainBuilder::new(locus)
        .junction_aa(row.get(columns.cdr3)?)
        .junction(None)
        .consensus_count(None)
        .v_call(row.get(columns.v_gene)?)
        .d_call(row.get(columns.d_gene)?)
        .j_call(row.get(columns.j_gene)?)
        .productive(true)
        .resolve_locus(|chain| infer_locus(|key| chain.gene(key), &DEFAULT_GENE_KEYS))
        .build();
    Ok(chain)
}
