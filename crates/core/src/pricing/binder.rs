//! Parameter binder: resolves each declared parameter to a number for the
//! formula engine. Binding never fails; anything missing or unparsable
//! resolves to zero so one bad field cannot take down a calculation.

use std::collections::BTreeMap;

use crate::domain::price_status::BoundParameter;
use crate::domain::quote::{FieldValue, Quote};
use crate::domain::settings::{ParameterDef, ParameterSource};

/// Resolves every parameter against the quote, in declaration order.
pub fn bind(parameters: &[ParameterDef], quote: &Quote) -> Vec<BoundParameter> {
    parameters
        .iter()
        .map(|parameter| BoundParameter {
            id: parameter.id.clone(),
            name: parameter.name.clone(),
            source: match &parameter.source {
                ParameterSource::Fixed { .. } => "fixed".to_string(),
                ParameterSource::Form { field, .. } => format!("form:{field}"),
            },
            value: resolve(parameter, quote),
        })
        .collect()
}

pub fn resolve(parameter: &ParameterDef, quote: &Quote) -> f64 {
    match &parameter.source {
        ParameterSource::Fixed { value } => parse_number(value).unwrap_or(0.0),
        ParameterSource::Form { field, lookup } => resolve_form_field(field, lookup.as_ref(), quote),
    }
}

fn resolve_form_field(
    field: &str,
    lookup: Option<&BTreeMap<String, f64>>,
    quote: &Quote,
) -> f64 {
    match field {
        "qty" => quote.numeric_field("qty").unwrap_or(0.0),
        "thickness" => quote.numeric_field("thickness").unwrap_or(0.0),
        "dimensions" => dimensions(quote),
        _ => quote
            .field(field)
            .map(|value| contribution(value, lookup))
            .unwrap_or(0.0),
    }
}

/// Synthetic length × width field: prefers the numeric companion fields,
/// then a free-text "L x W" pattern in the `dimensions` extension field.
fn dimensions(quote: &Quote) -> f64 {
    if let (Some(length), Some(width)) = (
        quote.numeric_field("length"),
        quote.numeric_field("width"),
    ) {
        return length * width;
    }
    quote
        .field("dimensions")
        .and_then(FieldValue::as_text)
        .and_then(parse_dimensions_text)
        .unwrap_or(0.0)
}

fn parse_dimensions_text(text: &str) -> Option<f64> {
    let parts: Vec<&str> =
        text.split(['x', 'X', '*']).map(str::trim).filter(|part| !part.is_empty()).collect();
    if parts.len() != 2 {
        return None;
    }
    Some(parse_number(parts[0])? * parse_number(parts[1])?)
}

/// A field value's numeric contribution. Lists sum per-element contributions
/// so multi-select options each add their lookup amount.
fn contribution(value: &FieldValue, lookup: Option<&BTreeMap<String, f64>>) -> f64 {
    match value {
        FieldValue::List(elements) => {
            elements.iter().map(|element| contribution(element, lookup)).sum()
        }
        scalar => {
            if let Some(table) = lookup {
                let key = match scalar {
                    FieldValue::Text(text) => text.clone(),
                    other => other.as_number().map(|n| format!("{n}")).unwrap_or_default(),
                };
                if let Some(mapped) = table.get(key.trim()) {
                    return *mapped;
                }
            }
            scalar.as_number().unwrap_or(0.0)
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse().ok()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::domain::quote::{FieldValue, Quote};
    use crate::domain::settings::ParameterDef;

    use super::{bind, resolve};

    fn quote() -> Quote {
        Quote::new("Q-100", 1, None)
    }

    #[test]
    fn fixed_value_parses_as_float() {
        assert_eq!(resolve(&ParameterDef::fixed("unit_cost", "Unit cost", "45"), &quote()), 45.0);
        assert_eq!(resolve(&ParameterDef::fixed("margin", "Margin", "1,25"), &quote()), 1.25);
        assert_eq!(resolve(&ParameterDef::fixed("bad", "Bad", "n/a"), &quote()), 0.0);
    }

    #[test]
    fn qty_reads_the_dedicated_field() {
        let mut quote = quote();
        quote.qty = Some(50.0);
        assert_eq!(resolve(&ParameterDef::form("qty", "Quantity", "qty"), &quote), 50.0);
    }

    #[test]
    fn qty_falls_back_to_the_custom_fields_map() {
        let mut quote = quote();
        quote.custom_fields.insert("qty".to_string(), FieldValue::Text("12".to_string()));
        assert_eq!(resolve(&ParameterDef::form("qty", "Quantity", "qty"), &quote), 12.0);
    }

    #[test]
    fn dimensions_multiplies_numeric_companions() {
        let mut quote = quote();
        quote.length = Some(120.0);
        quote.width = Some(45.0);
        let parameter = ParameterDef::form("area", "Area", "dimensions");
        assert_eq!(resolve(&parameter, &quote), 5400.0);
    }

    #[test]
    fn dimensions_parses_free_text_patterns() {
        let parameter = ParameterDef::form("area", "Area", "dimensions");
        for (text, expected) in
            [("100 x 200", 20000.0), ("3X4", 12.0), ("2,5 * 4", 10.0), ("garbage", 0.0)]
        {
            let mut quote = quote();
            quote.custom_fields.insert("dimensions".to_string(), FieldValue::from(text));
            assert_eq!(resolve(&parameter, &quote), expected, "pattern {text:?}");
        }
    }

    #[test]
    fn scalar_lookup_maps_option_text_to_number() {
        let mut quote = quote();
        quote.custom_fields.insert("material".to_string(), FieldValue::from("Paslanmaz"));
        let parameter = ParameterDef::form_with_lookup(
            "material",
            "Material",
            "material",
            BTreeMap::from([("Alüminyum".to_string(), 10.0), ("Paslanmaz".to_string(), 15.0)]),
        );
        assert_eq!(resolve(&parameter, &quote), 15.0);
    }

    #[test]
    fn list_lookup_sums_each_element() {
        let mut quote = quote();
        quote.custom_fields.insert(
            "material".to_string(),
            FieldValue::List(vec![FieldValue::from("Alüminyum"), FieldValue::from("Paslanmaz")]),
        );
        let parameter = ParameterDef::form_with_lookup(
            "material",
            "Material",
            "material",
            BTreeMap::from([("Alüminyum".to_string(), 10.0), ("Paslanmaz".to_string(), 15.0)]),
        );
        assert_eq!(resolve(&parameter, &quote), 25.0);
    }

    #[test]
    fn lookup_miss_falls_back_to_numeric_parse_then_zero() {
        let table = BTreeMap::from([("Steel".to_string(), 12.0)]);
        let parameter = ParameterDef::form_with_lookup("m", "M", "material", table);

        let mut quote_with_number = quote();
        quote_with_number
            .custom_fields
            .insert("material".to_string(), FieldValue::Number(7.5));
        assert_eq!(resolve(&parameter, &quote_with_number), 7.5);

        let mut quote_with_unknown = quote();
        quote_with_unknown
            .custom_fields
            .insert("material".to_string(), FieldValue::from("Titanium"));
        assert_eq!(resolve(&parameter, &quote_with_unknown), 0.0);
    }

    #[test]
    fn raw_numeric_parse_without_lookup_table() {
        let mut quote = quote();
        quote.fields.insert("coating".to_string(), FieldValue::from("3,5"));
        assert_eq!(resolve(&ParameterDef::form("coating", "Coating", "coating"), &quote), 3.5);
    }

    #[test]
    fn missing_field_resolves_to_zero_and_never_panics() {
        assert_eq!(resolve(&ParameterDef::form("ghost", "Ghost", "ghost"), &quote()), 0.0);
    }

    #[test]
    fn bind_preserves_declaration_order_and_sources() {
        let mut quote = quote();
        quote.qty = Some(50.0);
        let bound = bind(
            &[
                ParameterDef::form("qty", "Quantity", "qty"),
                ParameterDef::fixed("unit_cost", "Unit cost", "45"),
            ],
            &quote,
        );

        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].source, "form:qty");
        assert_eq!(bound[0].value, 50.0);
        assert_eq!(bound[1].source, "fixed");
        assert_eq!(bound[1].value, 45.0);
    }
}
