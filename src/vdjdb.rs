use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::airr::{Cell, CellBuilder, ChainBuilder};
use crate::domain::Locus;
use crate::error::KiraError;
use crate::http;
use crate::table::{Row, SourceTable};

pub const DEFAULT_LATEST_VERSION_URL: &str =
    "https://raw.githubusercontent.com/antigenomics/vdjdb-db/master/latest-version.txt";

pub const FULL_TABLE_NAME: &str = "vdjdb_full.txt";

pub const CELL_METADATA_FIELDS: [&str; 25] = [
    "species",
    "mhc.a",
    "mhc.b",
    "mhc.class",
    "antigen.epitope",
    "antigen.gene",
    "antigen.species",
    "reference.id",
    "method.identification",
    "method.frequency",
    "method.singlecell",
    "method.sequencing",
    "method.verification",
    "meta.study.id",
    "meta.cell.subset",
    "meta.subject.cohort",
    "meta.subject.id",
    "meta.replica.id",
    "meta.clone.id",
    "meta.epitope.id",
    "meta.tissue",
    "meta.donor.MHC",
    "meta.donor.MHC.method",
    "meta.structure.id",
    "vdjdb.score",
];

pub trait VdjdbClient: Send + Sync {
    fn fetch_table(&self) -> Result<SourceTable, KiraError>;
}

#[derive(Clone)]
pub struct VdjdbHttpClient {
    client: Client,
    latest_version_url: String,
}

impl VdjdbHttpClient {
    pub fn new(latest_version_url: impl Into<String>) -> Result<Self, KiraError> {
        let client = http::build_client(Duration::from_secs(300))
            .map_err(|err| KiraError::VdjdbHttp(err.to_string()))?;
        Ok(Self {
            client,
            latest_version_url: latest_version_url.into(),
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, KiraError> {
        let response = http::send_with_retries(|| self.client.get(url))
            .map_err(|err| KiraError::VdjdbHttp(err.to_string()))?;
        http::check_status(response)
            .map_err(|(status, message)| KiraError::VdjdbStatus { status, message })
    }

    fn latest_archive_url(&self) -> Result<String, KiraError> {
        let listing = self
            .get(&self.latest_version_url)?
            .text()
            .map_err(|err| KiraError::VdjdbHttp(err.to_string()))?;
        parse_latest_version(&listing)
    }
}

impl VdjdbClient for VdjdbHttpClient {
    fn fetch_table(&self) -> Result<SourceTable, KiraError> {
        let archive_url = self.latest_archive_url()?;
        tracing::info!(url = %archive_url, "downloading latest VDJdb release");

        let temp_dir = tempfile::Builder::new()
            .prefix("kira-airr-vdjdb")
            .tempdir()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let archive_path = temp_dir.path().join("vdjdb.zip");
        let response = self.get(&archive_url)?;
        let bytes = http::write_response_to_file(response, &archive_path)?;
        tracing::debug!(bytes, "VDJdb archive downloaded");

        let table_path = crate::fs_util::extract_zip_entry(
            &archive_path,
            temp_dir.path(),
            FULL_TABLE_NAME,
            |name| name == FULL_TABLE_NAME,
        )?;
        let file = File::open(&table_path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        SourceTable::from_reader(BufReader::new(file), b'\t')
    }
}

pub fn parse_latest_version(listing: &str) -> Result<String, KiraError> {
    listing
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or(KiraError::EmptyVersionListing)
}

pub fn normalize(table: &SourceTable) -> Result<Vec<Cell>, KiraError> {
    let kinds = table.column_kinds(&CELL_METADATA_FIELDS);
    table
        .rows()
        .enumerate()
        .map(|(idx, row)| {
            let mut cell = CellBuilder::new(idx.to_string());
            for chain in row_chains(&row)? {
                cell.add_chain(chain);
            }
            for field in CELL_METADATA_FIELDS {
                cell.set(field, row.scalar(field, kinds[field]));
            }
            Ok(cell.build())
        })
        .collect()
}

fn row_chains(row: &Row<'_>) -> Result<Vec<crate::airr::Chain>, KiraError> {
    let mut chains = Vec::with_capacity(2);
    if let Some(cdr3) = row.get("cdr3.alpha")? {
        chains.push(
            ChainBuilder::new(Locus::Tra)
                .junction_aa(Some(cdr3))
                .v_call(row.get("v.alpha")?)
                .j_call(row.get("j.alpha")?)
                .consensus_count(Some(0))
                .productive(true)
                .build(),
        );
    }
    if let Some(cdr3) = row.get("cdr3.beta")? {
        chains.push(
            ChainBuilder::new(Locus::Trb)
                .junction_aa(Some(cdr3))
                .v_call(row.get("v.beta")?)
                .d_call(row.get("d.beta")?)
                .j_call(row.get("j.beta")?)
                .consensus_count(Some(0))
                .productive(true)
                .build(),
        );
    }
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::airr::Scalar;
    use crate::domain::LocusCall;

    const HEADER: &str = "cdr3.alpha\tv.alpha\tj.alpha\tcdr3.beta\tv.beta\td.beta\tj.beta\tspecies\tvdjdb.score\textra";

    fn table(rows: &[&str]) -> SourceTable {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        SourceTable::from_reader(text.as_bytes(), b'\t').unwrap()
    }

    #[test]
    fn alpha_only_row() {
        let t = table(&["CAVRPTSGGSYIPTF\tTRAV3\tTRAJ6\t\t\t\t\tHomoSapiens\t2\tx"]);
        let cells = normalize(&t).unwrap();
        assert_eq!(cells.len(), 1);
        let chains = cells[0].chains();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].locus, LocusCall::Resolved(Locus::Tra));
        assert_eq!(chains[0].junction_aa.as_deref(), Some("CAVRPTSGGSYIPTF"));
        assert_eq!(chains[0].v_call.as_deref(), Some("TRAV3"));
        assert_eq!(chains[0].j_call.as_deref(), Some("TRAJ6"));
        assert_eq!(chains[0].d_call, None);
        assert_eq!(chains[0].consensus_count, Some(0));
        assert!(chains[0].productive);
    }

    #[test]
    fn paired_and_empty_rows() {
        let t = table(&[
            "CAVSF\tTRAV1\tTRAJ1\tCASSF\tTRBV2\tTRBD1\tTRBJ2-7\tHomoSapiens\t1\t",
            "\t\t\t\t\t\t\tHomoSapiens\t0\t",
        ]);
        let cells = normalize(&t).unwrap();
        assert_eq!(cells[0].loci(), vec![Locus::Tra, Locus::Trb]);
        assert_eq!(cells[0].chains()[1].d_call.as_deref(), Some("TRBD1"));
        assert_eq!(cells[1].cell_id(), "1");
        assert!(cells[1].chains().is_empty());
    }

    #[test]
    fn metadata_allow_list_is_complete() {
        let t = table(&["CAVSF\tTRAV1\tTRAJ1\t\t\t\t\tHomoSapiens\t3\tdropped"]);
        let cells = normalize(&t).unwrap();
        let cell = &cells[0];
        assert_eq!(cell.metadata().len(), CELL_METADATA_FIELDS.len());
        assert_eq!(cell.get("vdjdb.score"), Some(&Scalar::Int(3)));
        assert_eq!(cell.get("mhc.a"), Some(&Scalar::Null));
        assert_eq!(cell.get("extra"), None);
    }

    #[test]
    fn missing_chain_column_aborts() {
        let t = SourceTable::from_reader("cdr3.alpha\nCAVSF\n".as_bytes(), b'\t').unwrap();
        assert_matches!(normalize(&t), Err(KiraError::MissingColumn(_)));
    }

    #[test]
    fn latest_version_listing() {
        let listing = "https://github.com/antigenomics/vdjdb-db/releases/download/2024-06-13/vdjdb-2024-06-13.zip 2024-06-13\n";
        assert!(parse_latest_version(listing).unwrap().ends_with(".zip"));
        assert_matches!(
            parse_latest_version("  \n"),
            Err(KiraError::EmptyVersionListing)
        );
    }
}
