use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::airr::{Cell, Chain};
use crate::domain::{Locus, Source};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub name: String,
    pub date_downloaded: String,
}

impl DatabaseMetadata {
    pub fn now(source: Source) -> Self {
        Self {
            name: source.db_name().to_string(),
            date_downloaded: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIndex {
    pub vj: Vec<usize>,
    pub vdj: Vec<usize>,
    pub multichain: bool,
}

const MAX_CHAINS_PER_ARM: usize = 2;

impl ChainIndex {
    pub fn for_chains(chains: &[Chain]) -> Self {
        let mut vj = Vec::new();
        let mut vdj = Vec::new();
        for (idx, chain) in chains.iter().enumerate() {
            if !chain.productive || chain.junction_aa.is_none() {
                continue;
            }
            match chain.locus.locus() {
                Some(locus) if locus.is_vdj() => vdj.push(idx),
                Some(_) => vj.push(idx),
                None => {}
            }
        }
        let multichain = vj.len() > MAX_CHAINS_PER_ARM || vdj.len() > MAX_CHAINS_PER_ARM;
        for arm in [&mut vj, &mut vdj] {
            // stable: equal counts keep discovery order
            arm.sort_by_key(|idx| std::cmp::Reverse(chains[*idx].consensus_count.unwrap_or(0)));
            arm.truncate(MAX_CHAINS_PER_ARM);
        }
        Self { vj, vdj, multichain }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirrContainer {
    db: Option<DatabaseMetadata>,
    cells: Vec<Cell>,
    #[serde(default)]
    chain_indices: Vec<ChainIndex>,
}

impl AirrContainer {
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        Self {
            db: None,
            cells,
            chain_indices: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, db: DatabaseMetadata) -> Self {
        self.db = Some(db);
        self
    }

    pub fn index_chains(&mut self) {
        self.chain_indices = self
            .cells
            .iter()
            .map(|cell| ChainIndex::for_chains(cell.chains()))
            .collect();
    }

    pub fn db(&self) -> Option<&DatabaseMetadata> {
        self.db.as_ref()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn chain_indices(&self) -> &[ChainIndex] {
        &self.chain_indices
    }

    pub fn summary(&self) -> ContainerSummary {
        let mut loci = BTreeMap::new();
        let mut chains = 0;
        let mut unresolved = 0;
        for chain in self.cells.iter().flat_map(|cell| cell.chains()) {
            chains += 1;
            match chain.locus.locus() {
                Some(locus) => *loci.entry(locus).or_insert(0) += 1,
                None => unresolved += 1,
            }
        }
        ContainerSummary {
            database: self.db.as_ref().map(|db| db.name.clone()),
            date_downloaded: self.db.as_ref().map(|db| db.date_downloaded.clone()),
            cells: self.cells.len(),
            empty_cells: self
                .cells
                .iter()
                .filter(|cell| cell.chains().is_empty())
                .count(),
            multichain_cells: self
                .chain_indices
                .iter()
                .filter(|index| index.multichain)
                .count(),
            chains,
            unresolved_loci: unresolved,
            loci,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub database: Option<String>,
    pub date_downloaded: Option<String>,
    pub cells: usize,
    pub empty_cells: usize,
    pub multichain_cells: usize,
    pub chains: usize,
    pub unresolved_loci: usize,
    pub loci: BTreeMap<Locus, usize>,
}
