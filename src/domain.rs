use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Vdjdb,
    Iedb,
}

impl Source {
    pub fn db_name(self) -> &'static str {
        match self {
            Source::Vdjdb => "VDJDB",
            Source::Iedb => "IEDB",
        }
    }

    pub fn cache_file_name(self) -> &'static str {
        match self {
            Source::Vdjdb => "vdjdb.json.gz",
            Source::Iedb => "iedb.json.gz",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Vdjdb => write!(f, "vdjdb"),
            Source::Iedb => write!(f, "iedb"),
        }
    }
}

impl FromStr for Source {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vdjdb" => Ok(Source::Vdjdb),
            "iedb" => Ok(Source::Iedb),
            _ => Err(KiraError::InvalidSource(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Locus {
    #[serde(rename = "TRA")]
    Tra,
    #[serde(rename = "TRB")]
    Trb,
    #[serde(rename = "TRG")]
    Trg,
    #[serde(rename = "TRD")]
    Trd,
    #[serde(rename = "IGH")]
    Igh,
    #[serde(rename = "IGK")]
    Igk,
    #[serde(rename = "IGL")]
    Igl,
}

impl Locus {
    pub const ALL: [Locus; 7] = [
        Locus::Tra,
        Locus::Trb,
        Locus::Trg,
        Locus::Trd,
        Locus::Igh,
        Locus::Igk,
        Locus::Igl,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Locus::Tra => "TRA",
            Locus::Trb => "TRB",
            Locus::Trg => "TRG",
            Locus::Trd => "TRD",
            Locus::Igh => "IGH",
            Locus::Igk => "IGK",
            Locus::Igl => "IGL",
        }
    }

    pub fn is_vdj(self) -> bool {
        matches!(self, Locus::Trb | Locus::Trd | Locus::Igh)
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Locus {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Locus::ALL
            .into_iter()
            .find(|locus| locus.code() == normalized)
            .ok_or_else(|| KiraError::InvalidLocus(value.to_string()))
    }
}

/// Outcome of assigning a locus to a chain.
///
/// Resolution failure is kept on the chain instead of collapsing into a null,
/// so "no locus" and "could not tell which locus" stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocusCall {
    Resolved(Locus),
    Unresolved { reason: String },
}

impl LocusCall {
    pub fn locus(&self) -> Option<Locus> {
        match self {
            LocusCall::Resolved(locus) => Some(*locus),
            LocusCall::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, LocusCall::Resolved(_))
    }
}

impl From<Locus> for LocusCall {
    fn from(locus: Locus) -> Self {
        LocusCall::Resolved(locus)
    }
}
