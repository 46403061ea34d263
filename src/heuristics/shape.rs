// src/heuristics/shape.rs

use super::{FieldMapping, Sample};
use crate::dbf::Value;

/// Key columns present in every line table; never candidates for a role.
const SKIPPED_FIELDS: &[&str] = &["IDDOC", "LINENO"];

/// Code values in 1C 7.7 catalogs are short base-36 ids.
const CODE_LEN: std::ops::RangeInclusive<usize> = 1..=5;

/// Classify fields by what the sampled value looks like.
///
/// Short text values are catalog codes: the first is the item, the second the
/// unit. Among positive numbers (at least three needed) sorted ascending, the
/// smallest is skipped as it is usually a unit coefficient equal to 1, the
/// second-smallest is the quantity, the largest the amount, and the price is
/// whichever remaining value is closest to amount / quantity.
pub(super) fn by_value_shape(sample: &Sample<'_>) -> FieldMapping {
    let mut codes: Vec<&str> = Vec::new();
    let mut numbers: Vec<(usize, &str, f64)> = Vec::new();

    for (index, field) in sample.fields.iter().enumerate() {
        if SKIPPED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        match sample.record.get(field) {
            Some(Value::Text(text)) if CODE_LEN.contains(&text.trim().chars().count()) => {
                codes.push(field.as_str());
            }
            Some(Value::Number(n)) if *n > 0.0 => numbers.push((index, field.as_str(), *n)),
            _ => {}
        }
    }

    let mut mapping = FieldMapping {
        item: codes.first().map(|f| f.to_string()),
        unit: codes.get(1).map(|f| f.to_string()),
        ..FieldMapping::default()
    };

    if numbers.len() >= 3 {
        // stable: equal values keep declaration order
        numbers.sort_by(|a, b| a.2.total_cmp(&b.2));

        let (_, quantity_field, quantity) = numbers[1];
        let (_, amount_field, amount) = numbers[numbers.len() - 1];
        let expected_price = if quantity > 0.0 { amount / quantity } else { 0.0 };

        // ties on distance go to the earliest declared field
        let mut candidates = numbers[1..numbers.len() - 1].to_vec();
        candidates.sort_by_key(|&(index, _, _)| index);

        let mut best: Option<(&str, f64)> = None;
        for (_, field, value) in candidates {
            let diff = (value - expected_price).abs();
            if best.is_none_or(|(_, best_diff)| diff < best_diff) {
                best = Some((field, diff));
            }
        }

        mapping.quantity = Some(quantity_field.to_string());
        mapping.amount = Some(amount_field.to_string());
        mapping.price = Some(best.map_or(quantity_field, |(f, _)| f).to_string());
    }

    mapping
}

/// Last resort: the 3rd to 7th declared fields, in role order.
pub(super) fn positional(sample: &Sample<'_>) -> FieldMapping {
    let at = |i: usize| sample.fields.get(i).cloned();
    FieldMapping {
        item: at(2),
        unit: at(3),
        quantity: at(4),
        price: at(5),
        amount: at(6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbf::Record;

    fn sample_mapping(pairs: Vec<(&str, Value)>) -> FieldMapping {
        let fields: Vec<String> = pairs.iter().map(|(f, _)| f.to_string()).collect();
        let record = Record::from_pairs(pairs);
        by_value_shape(&Sample {
            kind: "ZZ",
            fields: &fields,
            record: &record,
        })
    }

    #[test]
    fn test_price_closest_to_ratio() {
        let mapping = sample_mapping(vec![
            ("SP1034", Value::Number(1.0)),
            ("SP1033", Value::Number(4.0)),
            ("SP1036", Value::Number(20.83)),
            ("SP4505", Value::Number(25.0)),
            ("SP1040", Value::Number(100.0)),
        ]);
        assert_eq!(mapping.quantity.as_deref(), Some("SP1033"));
        assert_eq!(mapping.price.as_deref(), Some("SP4505"));
        assert_eq!(mapping.amount.as_deref(), Some("SP1040"));
    }

    #[test]
    fn test_price_tie_goes_to_first_declared_field() {
        // amount / quantity = 10; SP3 (12) and SP4 (8) are both 2 away.
        let mapping = sample_mapping(vec![
            ("SP1", Value::Number(1.0)),
            ("SP2", Value::Number(5.0)),
            ("SP3", Value::Number(12.0)),
            ("SP4", Value::Number(8.0)),
            ("SP5", Value::Number(50.0)),
        ]);
        assert_eq!(mapping.quantity.as_deref(), Some("SP2"));
        assert_eq!(mapping.amount.as_deref(), Some("SP5"));
        assert_eq!(mapping.price.as_deref(), Some("SP3"));
    }

    #[test]
    fn test_equal_values_keep_field_order() {
        let mapping = sample_mapping(vec![
            ("Q", Value::Number(1.0)),
            ("P", Value::Number(1.0)),
            ("A", Value::Number(1.0)),
        ]);
        assert_eq!(mapping.quantity.as_deref(), Some("P"));
        assert_eq!(mapping.amount.as_deref(), Some("A"));
        assert_eq!(mapping.price.as_deref(), Some("P"));
    }

    #[test]
    fn test_two_numbers_leave_numeric_roles_open() {
        let mapping = sample_mapping(vec![
            ("ITEM", Value::Text("  12".into())),
            ("QTY", Value::Number(3.0)),
            ("SUM", Value::Number(30.0)),
        ]);
        assert_eq!(mapping.item.as_deref(), Some("ITEM"));
        assert!(mapping.unit.is_none());
        assert!(mapping.quantity.is_none());
        assert!(mapping.amount.is_none());
    }

    #[test]
    fn test_blank_and_long_text_are_not_codes() {
        let mapping = sample_mapping(vec![
            ("BLANK", Value::Text("     ".into())),
            ("NAME", Value::Text("Цемент М500".into())),
            ("CODE", Value::Text("  A1".into())),
        ]);
        assert_eq!(mapping.item.as_deref(), Some("CODE"));
    }
}
