//! End-to-end tests of the formula pipeline: edit validation, SQL
//! compilation, dependent refresh, and broken-formula recovery.

use gridbase::prelude::*;
use pretty_assertions::assert_eq;

/// Orders table with Price/Quantity and a link to an Items table
fn workspace() -> (FormulaWorkspace, TableId, TableId) {
    let mut ws = FormulaWorkspace::new();
    let orders = ws.add_table();
    let items = ws.add_table();
    ws.add_data_field(orders, "Price", FormulaType::number(2))
        .unwrap();
    ws.add_data_field(orders, "Quantity", FormulaType::integer())
        .unwrap();
    ws.add_link_field(orders, "Items", items).unwrap();
    ws.add_data_field(items, "Amount", FormulaType::number(2))
        .unwrap();
    (ws, orders, items)
}

#[test]
fn test_valid_edit_produces_type_and_sql() {
    let (mut ws, orders, _) = workspace();

    let total = ws
        .create_formula_field(orders, "Total", "field('Price') * field('Quantity')")
        .unwrap();

    let record = ws.formula(total).unwrap();
    assert_eq!(record.state, FormulaState::Valid);
    assert_eq!(record.resolved_type, Some(FormulaType::number(2)));

    let price = ws.catalog().field_by_name(orders, "Price").unwrap().id;
    let quantity = ws.catalog().field_by_name(orders, "Quantity").unwrap().id;
    assert_eq!(
        record.compiled.as_deref().unwrap(),
        format!("((\"{price}\") * (\"{quantity}\"))")
    );
}

#[test]
fn test_edit_time_errors_reject_the_edit() {
    let (mut ws, orders, _) = workspace();

    // Unknown field
    let err = ws
        .create_formula_field(orders, "Bad", "field('Nope') + 1")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "references the deleted or unknown field 'Nope'"
    );

    // Unknown function
    assert!(ws
        .create_formula_field(orders, "Bad", "frobnicate(1)")
        .is_err());

    // Type mismatch
    assert!(ws
        .create_formula_field(orders, "Bad", "field('Price') + 'text'")
        .is_err());

    // Syntax error
    assert!(ws.create_formula_field(orders, "Bad", "1 +").is_err());

    // None of the rejected edits left a field behind
    assert!(ws.catalog().field_by_name(orders, "Bad").is_none());
}

#[test]
fn test_deleting_a_field_breaks_dependents_locally() {
    let (mut ws, orders, _) = workspace();
    let price = ws.catalog().field_by_name(orders, "Price").unwrap().id;

    let total = ws
        .create_formula_field(orders, "Total", "field('Price') * 2")
        .unwrap();
    let doubled = ws
        .create_formula_field(orders, "Doubled", "field('Total') + field('Total')")
        .unwrap();

    let stats = ws.delete_field(price).unwrap();
    assert_eq!(stats.broken, 2);
    assert_eq!(stats.refreshed, 0);

    // The direct dependent carries the root-cause message
    let total_record = ws.formula(total).unwrap();
    assert_eq!(total_record.state, FormulaState::Broken);
    assert_eq!(
        total_record.error.as_deref().unwrap(),
        "references the deleted or unknown field 'Price'"
    );
    assert_eq!(total_record.resolved_type, None);
    assert!(total_record.compiled.is_none());

    // The transitive dependent names the broken field, not the deleted one
    let doubled_record = ws.formula(doubled).unwrap();
    assert_eq!(doubled_record.state, FormulaState::Broken);
    assert_eq!(
        doubled_record.error.as_deref().unwrap(),
        "references the broken field 'Total'"
    );
}

#[test]
fn test_broken_formulas_recover_when_the_field_returns() {
    let (mut ws, orders, _) = workspace();
    let price = ws.catalog().field_by_name(orders, "Price").unwrap().id;
    let total = ws
        .create_formula_field(orders, "Total", "field('Price') * 2")
        .unwrap();

    ws.delete_field(price).unwrap();
    assert_eq!(ws.formula(total).unwrap().state, FormulaState::Broken);

    // A new field under the old name satisfies the stored reference
    ws.add_data_field(orders, "Price", FormulaType::number(4))
        .unwrap();
    let stats = ws.refresh_broken();
    assert_eq!(stats.refreshed, 1);
    assert_eq!(stats.broken, 0);

    let record = ws.formula(total).unwrap();
    assert_eq!(record.state, FormulaState::Valid);
    assert_eq!(record.resolved_type, Some(FormulaType::number(4)));
    assert!(record.compiled.is_some());
}

#[test]
fn test_aggregated_lookup_compiles_to_scalar_subquery() {
    let (mut ws, orders, _) = workspace();

    let total = ws
        .create_formula_field(orders, "ItemTotal", "sum(lookup('Items', 'Amount'))")
        .unwrap();

    let record = ws.formula(total).unwrap();
    assert_eq!(record.resolved_type, Some(FormulaType::number(2)));

    let sql = record.compiled.as_deref().unwrap();
    assert!(sql.starts_with("COALESCE((SELECT sum(r.\"field_"));
    assert!(sql.contains("JOIN \"jt_field_"));
    assert!(!sql.contains("ARRAY"));
}

#[test]
fn test_cycles_are_rejected_at_edit_time() {
    let (mut ws, orders, _) = workspace();

    let a = ws
        .create_formula_field(orders, "A", "field('Price') + 1")
        .unwrap();
    ws.create_formula_field(orders, "B", "field('A') + 1")
        .unwrap();
    ws.create_formula_field(orders, "C", "field('B') + 1")
        .unwrap();

    let err = ws.update_formula(a, "field('C') + 1").unwrap_err();
    assert!(matches!(
        err,
        gridbase::Error::Formula(FormulaError::CircularReference)
    ));

    // Everything stays valid with its previous formula
    for name in ["A", "B", "C"] {
        let id = ws.catalog().field_by_name(orders, name).unwrap().id;
        assert_eq!(ws.formula(id).unwrap().state, FormulaState::Valid);
    }
}

#[test]
fn test_rename_rewrites_referencing_formulas() {
    let (mut ws, orders, items) = workspace();
    let price = ws.catalog().field_by_name(orders, "Price").unwrap().id;
    let amount = ws.catalog().field_by_name(items, "Amount").unwrap().id;

    let total = ws
        .create_formula_field(orders, "Total", "field('Price') * 2")
        .unwrap();
    let item_total = ws
        .create_formula_field(orders, "ItemTotal", "sum(lookup('Items', 'Amount'))")
        .unwrap();

    ws.rename_field(price, "Unit Price").unwrap();
    assert_eq!(
        ws.formula(total).unwrap().raw_text,
        "field('Unit Price') * 2"
    );
    assert_eq!(ws.formula(total).unwrap().state, FormulaState::Valid);

    // Lookup targets resolve in the linked table
    ws.rename_field(amount, "Cost").unwrap();
    assert_eq!(
        ws.formula(item_total).unwrap().raw_text,
        "sum(lookup('Items', 'Cost'))"
    );
}

#[test]
fn test_retyping_a_field_refreshes_dependents() {
    let (mut ws, orders, _) = workspace();
    let quantity = ws.catalog().field_by_name(orders, "Quantity").unwrap().id;

    let total = ws
        .create_formula_field(orders, "Total", "field('Quantity') * 2")
        .unwrap();
    assert_eq!(
        ws.formula(total).unwrap().resolved_type,
        Some(FormulaType::integer())
    );

    // Widening the precision flows into the dependent
    let stats = ws.set_field_type(quantity, FormulaType::number(3)).unwrap();
    assert_eq!(stats.refreshed, 1);
    assert_eq!(
        ws.formula(total).unwrap().resolved_type,
        Some(FormulaType::number(3))
    );

    // An incompatible type breaks the dependent instead of failing the retype
    let stats = ws.set_field_type(quantity, FormulaType::Text).unwrap();
    assert_eq!(stats.broken, 1);
    assert_eq!(ws.formula(total).unwrap().state, FormulaState::Broken);
}

#[test]
fn test_update_formula_refreshes_downstream_types() {
    let (mut ws, orders, _) = workspace();

    let a = ws
        .create_formula_field(orders, "A", "field('Quantity') + 1")
        .unwrap();
    let b = ws.create_formula_field(orders, "B", "field('A') * 2").unwrap();
    assert_eq!(
        ws.formula(b).unwrap().resolved_type,
        Some(FormulaType::integer())
    );

    let stats = ws.update_formula(a, "field('Price') + 0.125").unwrap();
    assert_eq!(stats.refreshed, 1);
    assert_eq!(
        ws.formula(b).unwrap().resolved_type,
        Some(FormulaType::number(3))
    );
}

#[test]
fn test_valid_state_always_has_sql_and_broken_never_does() {
    let (mut ws, orders, _) = workspace();
    let price = ws.catalog().field_by_name(orders, "Price").unwrap().id;

    let ids = [
        ws.create_formula_field(orders, "A", "field('Price') + 1")
            .unwrap(),
        ws.create_formula_field(orders, "B", "field('A') * field('A')")
            .unwrap(),
        ws.create_formula_field(orders, "C", "totext(field('B'))")
            .unwrap(),
    ];

    ws.delete_field(price).unwrap();

    for id in ids {
        let record = ws.formula(id).unwrap();
        match record.state {
            FormulaState::Valid => {
                assert!(record.resolved_type.is_some());
                assert!(record.compiled.is_some());
                assert!(record.error.is_none());
            }
            FormulaState::Broken => {
                assert!(record.resolved_type.is_none());
                assert!(record.compiled.is_none());
                assert!(record.error.is_some());
            }
            FormulaState::Unvalidated => panic!("refresh left {id} unvalidated"),
        }
    }
}
