use serde::{Deserialize, Serialize};

use crate::domain::{Locus, LocusCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneField {
    V,
    D,
    J,
}

impl GeneField {
    pub fn column(self) -> &'static str {
        match self {
            GeneField::V => "v_call",
            GeneField::D => "d_call",
            GeneField::J => "j_call",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(value) => Some(value),
            _ => None,
        }
    }
}

/// One normalized receptor chain.
///
/// Every field is always serialized; absent values show up as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub locus: LocusCall,
    pub junction_aa: Option<String>,
    pub junction: Option<String>,
    pub v_call: Option<String>,
    pub d_call: Option<String>,
    pub j_call: Option<String>,
    pub consensus_count: Option<u64>,
    pub productive: bool,
}

impl Chain {
    pub fn gene(&self, field: GeneField) -> Option<&str> {
        match field {
            GeneField::V => self.v_call.as_deref(),
            GeneField::D => self.d_call.as_deref(),
            GeneField::J => self.j_call.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainBuilder {
    chain: Chain,
}

impl ChainBuilder {
    pub fn new(locus: impl Into<LocusCall>) -> Self {
        Self {
            chain: Chain {
                locus: locus.into(),
                junction_aa: None,
                junction: None,
                v_call: None,
                d_call: None,
                j_call: None,
                consensus_count: None,
                productive: true,
            },
        }
    }

    pub fn junction_aa(mut self, value: Option<&str>) -> Self {
        self.chain.junction_aa = value.map(str::to_string);
        self
    }

    pub fn junction(mut self, value: Option<&str>) -> Self {
        self.chain.junction = value.map(str::to_string);
        self
    }

    pub fn v_call(mut self, value: Option<&str>) -> Self {
        self.chain.v_call = value.map(str::to_string);
        self
    }

    pub fn d_call(mut self, value: Option<&str>) -> Self {
        self.chain.d_call = value.map(str::to_string);
        self
    }

    pub fn j_call(mut self, value: Option<&str>) -> Self {
        self.chain.j_call = value.map(str::to_string);
        self
    }

    pub fn consensus_count(mut self, value: Option<u64>) -> Self {
        self.chain.consensus_count = value;
        self
    }

    pub fn productive(mut self, value: bool) -> Self {
        self.chain.productive = value;
        self
    }

    pub fn resolve_locus<F>(mut self, resolve: F) -> Self
    where
        F: FnOnce(&Chain) -> LocusCall,
    {
        if !self.chain.locus.is_resolved() {
            self.chain.locus = resolve(&self.chain);
        }
        self
    }

    pub fn locus(&self) -> &LocusCall {
        &self.chain.locus
    }

    pub fn build(self) -> Chain {
        self.chain
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    cell_id: String,
    chains: Vec<Chain>,
    metadata: Vec<(String, Scalar)>,
}

impl Cell {
    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn metadata(&self) -> &[(String, Scalar)] {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.metadata
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn loci(&self) -> Vec<Locus> {
        self.chains
            .iter()
            .filter_map(|chain| chain.locus.locus())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CellBuilder {
    cell: Cell,
}

impl CellBuilder {
    pub fn new(cell_id: impl Into<String>) -> Self {
        Self {
            cell: Cell {
                cell_id: cell_id.into(),
                chains: Vec::new(),
                metadata: Vec::new(),
            },
        }
    }

    pub fn add_chain(&mut self, chain: Chain) -> &mut Self {
        self.cell.chains.push(chain);
        self
    }

    pub fn set(&mut self, key: &str, value: Scalar) -> &mut Self {
        match self.cell.metadata.iter_mut().find(|(name, _)| name == key) {
            Some((_, slot)) => *slot = value,
            None => self.cell.metadata.push((key.to_string(), value)),
        }
        self
    }

    pub fn build(self) -> Cell {
        self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_serializes_full_field_set() {
        let chain = ChainBuilder::new(Locus::Tra)
            .junction_aa(Some("CAVRPTSGGSYIPTF"))
            .build();
        let value = serde_json::to_value(&chain).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "locus",
            "junction_aa",
            "junction",
            "v_call",
            "d_call",
            "j_call",
            "consensus_count",
            "productive",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert!(object["junction"].is_null());
        assert_eq!(object["productive"], serde_json::json!(true));
    }

    #[test]
    fn resolve_locus_only_runs_when_unresolved() {
        let chain = ChainBuilder::new(Locus::Trb)
            .resolve_locus(|_| LocusCall::Resolved(Locus::Igk))
            .build();
        assert_eq!(chain.locus, LocusCall::Resolved(Locus::Trb));

        let chain = ChainBuilder::new(LocusCall::Unresolved {
            reason: "light".to_string(),
        })
        .v_call(Some("IGLV1-40"))
        .resolve_locus(|chain| match chain.v_call.as_deref() {
            Some("IGLV1-40") => LocusCall::Resolved(Locus::Igl),
            _ => unreachable!(),
        })
        .build();
        assert_eq!(chain.locus, LocusCall::Resolved(Locus::Igl));
    }

    #[test]
    fn cell_keeps_chain_order_and_unique_keys() {
        let mut builder = CellBuilder::new("7");
        builder
            .add_chain(ChainBuilder::new(Locus::Trb).build())
            .add_chain(ChainBuilder::new(Locus::Tra).build())
            .set("species", Scalar::Str("HomoSapiens".to_string()))
            .set("vdjdb.score", Scalar::Int(1))
            .set("species", Scalar::Str("MusMusculus".to_string()));
        let cell = builder.build();

        assert_eq!(cell.cell_id(), "7");
        assert_eq!(cell.loci(), vec![Locus::Trb, Locus::Tra]);
        assert_eq!(cell.metadata().len(), 2);
        assert_eq!(
            cell.get("species").and_then(Scalar::as_str),
            Some("MusMusculus")
        );
    }

    #[test]
    fn empty_cell_is_valid() {
        let cell = CellBuilder::new("0").build();
        assert!(cell.chains().is_empty());
        assert!(cell.loci().is_empty());
    }
}
