// src/heuristics/profile.rs

use super::{FieldMapping, Sample};

/// Known field layout of a 1C document kind.
#[derive(Debug)]
pub struct KindProfile {
    pub kind: &'static str,
    pub item: &'static str,
    pub unit: &'static str,
    pub quantity: &'static str,
    pub price: &'static str,
    pub amount: &'static str,
    /// Header field holding the contractor / order reference.
    pub counterparty: &'static str,
}

/// Standard outgoing invoice (ДРН). `SP4505` is the price including VAT;
/// `SP1036` next to it is the net price and must not be picked.
const STANDARD: KindProfile = KindProfile {
    kind: "S3",
    item: "SP1031",
    unit: "SP1032",
    quantity: "SP1033",
    price: "SP4505",
    amount: "SP1040",
    counterparty: "SP1012",
};

/// МРН: unit lives in `SP4537` (not `SP4534`), VAT-inclusive unit price in
/// `SP4545` (not `SP4543`), the order number in header field `SP4509`.
const MRN: KindProfile = KindProfile {
    kind: "3H8",
    item: "SP4533",
    unit: "SP4537",
    quantity: "SP4535",
    price: "SP4545",
    amount: "SP4542",
    counterparty: "SP4509",
};

const PROFILES: &[KindProfile] = &[STANDARD, MRN];

pub fn profile_for(kind: &str) -> Option<&'static KindProfile> {
    PROFILES.iter().find(|p| p.kind == kind)
}

/// Header field carrying the counterparty code for `kind`.
pub fn counterparty_field(kind: &str) -> &'static str {
    profile_for(kind).map_or(STANDARD.counterparty, |p| p.counterparty)
}

fn mapping_from(profile: &KindProfile, fields: &[String]) -> FieldMapping {
    let present = |name: &'static str| fields.iter().any(|f| f == name).then(|| name.to_string());
    FieldMapping {
        item: present(profile.item),
        unit: present(profile.unit),
        quantity: present(profile.quantity),
        price: present(profile.price),
        amount: present(profile.amount),
    }
}

pub(super) fn by_kind(sample: &Sample<'_>) -> FieldMapping {
    profile_for(sample.kind)
        .map(|p| mapping_from(p, sample.fields))
        .unwrap_or_default()
}

/// The standard line-table names show up in most configurations, whatever
/// the kind code.
pub(super) fn well_known(sample: &Sample<'_>) -> FieldMapping {
    mapping_from(&STANDARD, sample.fields)
}
