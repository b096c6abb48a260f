use std::sync::OnceLock;

use regex::Regex;

use crate::airr::GeneField;
use crate::domain::{Locus, LocusCall};

pub const DEFAULT_GENE_KEYS: [GeneField; 3] = [GeneField::V, GeneField::D, GeneField::J];

fn locus_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"(?i)^\s*(TR[ABDG]|IG[HKL])").expect("static regex"))
}

pub fn locus_from_gene_name(gene: &str) -> Option<Locus> {
    let captures = locus_prefix().captures(gene)?;
    captures.get(1)?.as_str().parse().ok()
}

pub fn infer_locus<'a, F>(gene: F, keys: &[GeneField]) -> LocusCall
where
    F: Fn(GeneField) -> Option<&'a str>,
{
    for key in keys {
        if let Some(locus) = gene(*key).and_then(locus_from_gene_name) {
            return LocusCall::Resolved(locus);
        }
    }
    let inspected = keys
        .iter()
        .map(|key| key.column())
        .collect::<Vec<_>>()
        .join(", ");
    LocusCall::Unresolved {
        reason: format!("no locus prefix in {inspected}"),
    }
}
