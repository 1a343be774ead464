//! FILENAME: formula/src/tests.rs
//! PURPOSE: Consolidated unit tests for the formula crate.

use crate::classify::{classify, FormulaKind};
use crate::dependency_graph::DependencyGraph;
use crate::lexer::Lexer;
use crate::token::Token;
use crate::validate::{check_structure, extract_dependencies, InvalidReason};
use std::collections::HashSet;

fn aggregates() -> Vec<String> {
    ["SUM", "AVG", "COUNT", "MIN", "MAX", "COUNTD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn table_calcs() -> Vec<String> {
    [
        "WINDOW_SUM",
        "WINDOW_AVG",
        "RUNNING_SUM",
        "RUNNING_AVG",
        "RANK",
        "INDEX",
        "LOOKUP",
        "TOTAL",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn kind_of(text: &str) -> FormulaKind {
    classify(text, &aggregates(), &table_calcs())
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn test_field_ref_token() {
    let mut lexer = Lexer::new("SUM([Sales])");
    assert_eq!(lexer.next_token(), Token::Identifier("SUM".to_string()));
    assert_eq!(lexer.next_token(), Token::LParen);
    assert_eq!(lexer.next_token(), Token::FieldRef("Sales".to_string()));
    assert_eq!(lexer.next_token(), Token::RParen);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn test_field_ref_preserves_case_and_spaces() {
    let mut lexer = Lexer::new("[Order Date]");
    assert_eq!(lexer.next_token(), Token::FieldRef("Order Date".to_string()));
}

#[test]
fn test_identifier_uppercased() {
    let mut lexer = Lexer::new("window_sum([Sales])");
    assert_eq!(
        lexer.next_token(),
        Token::Identifier("WINDOW_SUM".to_string())
    );
}

#[test]
fn test_lod_braces_and_colon() {
    let tokens = Lexer::tokenize("{ FIXED [Region] : SUM([Sales]) }");
    assert_eq!(tokens[0], Token::LBrace);
    assert_eq!(tokens[1], Token::Identifier("FIXED".to_string()));
    assert_eq!(tokens[2], Token::FieldRef("Region".to_string()));
    assert_eq!(tokens[3], Token::Colon);
    assert_eq!(tokens[tokens.len() - 2], Token::RBrace);
    assert_eq!(tokens[tokens.len() - 1], Token::EOF);
}

#[test]
fn test_string_literals_both_quote_styles() {
    let mut lexer = Lexer::new("\"North\" 'South'");
    assert_eq!(lexer.next_token(), Token::String("North".to_string()));
    assert_eq!(lexer.next_token(), Token::String("South".to_string()));
}

#[test]
fn test_comparison_operators() {
    let tokens = Lexer::tokenize("[Profit] >= 0");
    assert_eq!(tokens[1], Token::GreaterEqual);
    let tokens = Lexer::tokenize("[A] <> [B]");
    assert_eq!(tokens[1], Token::NotEqual);
}

#[test]
fn test_number_parsing() {
    let mut lexer = Lexer::new("3.14 * 100");
    assert_eq!(lexer.next_token(), Token::Number(3.14));
    assert_eq!(lexer.next_token(), Token::Asterisk);
    assert_eq!(lexer.next_token(), Token::Number(100.0));
}

// ========================================
// CLASSIFIER TESTS
// ========================================

#[test]
fn test_classify_direct_aggregate() {
    assert_eq!(kind_of("SUM([Sales])"), FormulaKind::Aggregate);
    assert_eq!(kind_of("countd([Customer ID])"), FormulaKind::Aggregate);
    assert_eq!(kind_of("  MIN([Price])  "), FormulaKind::Aggregate);
}

#[test]
fn test_classify_table_calculation() {
    assert_eq!(kind_of("WINDOW_SUM([Sales])"), FormulaKind::TableCalculation);
    assert_eq!(kind_of("RUNNING_AVG([Sales])"), FormulaKind::TableCalculation);
    assert_eq!(
        kind_of("RANK(SUM([Sales]))"),
        FormulaKind::TableCalculation
    );
}

#[test]
fn test_classify_lod() {
    assert_eq!(
        kind_of("{ FIXED [Region] : SUM([Sales]) }"),
        FormulaKind::Lod
    );
    assert_eq!(
        kind_of("{INCLUDE [Category] : AVG([Profit])}"),
        FormulaKind::Lod
    );
    assert_eq!(
        kind_of("{ EXCLUDE [Region] : SUM([Sales]) }"),
        FormulaKind::Lod
    );
}

#[test]
fn test_classify_lod_wins_over_inner_aggregate() {
    // The block contains SUM, but the braces + keyword decide the kind.
    assert_eq!(kind_of("{FIXED [Region]:SUM([Sales])}"), FormulaKind::Lod);
}

#[test]
fn test_classify_table_calc_wins_over_inner_aggregate() {
    assert_eq!(
        kind_of("WINDOW_SUM(SUM([Sales]))"),
        FormulaKind::TableCalculation
    );
}

#[test]
fn test_classify_custom() {
    assert_eq!(kind_of("[Profit] / [Sales]"), FormulaKind::Custom);
    assert_eq!(
        kind_of("IF [Profit] > 0 THEN 'gain' ELSE 'loss' END"),
        FormulaKind::Custom
    );
    // A brace block without a scoping keyword is not an LOD.
    assert_eq!(kind_of("{ SUM([Sales]) }"), FormulaKind::Custom);
    // Aggregate around an expression is not a *direct* aggregate.
    assert_eq!(kind_of("SUM([Sales]) / 2"), FormulaKind::Custom);
}

// ========================================
// STRUCTURE CHECKS
// ========================================

#[test]
fn test_empty_formula_rejected() {
    assert_eq!(
        check_structure("", FormulaKind::Custom),
        Err(InvalidReason::Empty)
    );
    assert_eq!(
        check_structure("   \t ", FormulaKind::Custom),
        Err(InvalidReason::Empty)
    );
}

#[test]
fn test_unbalanced_delimiters_rejected() {
    assert_eq!(
        check_structure("SUM([Sales)", FormulaKind::Custom),
        Err(InvalidReason::UnbalancedDelimiters)
    );
    assert_eq!(
        check_structure("SUM((1 + 2)", FormulaKind::Custom),
        Err(InvalidReason::UnbalancedDelimiters)
    );
    assert_eq!(
        check_structure("{FIXED [Region]:SUM([Sales])", FormulaKind::Custom),
        Err(InvalidReason::UnbalancedDelimiters)
    );
    assert_eq!(
        check_structure("1 + 2)", FormulaKind::Custom),
        Err(InvalidReason::UnbalancedDelimiters)
    );
}

#[test]
fn test_brackets_in_strings_ignored() {
    assert!(check_structure("\"[not a ref\" + [Sales]", FormulaKind::Custom).is_ok());
    assert!(check_structure("'curly { inside'", FormulaKind::Custom).is_ok());
}

#[test]
fn test_lod_missing_separator_rejected() {
    assert_eq!(
        check_structure("{ FIXED [Region] SUM([Sales]) }", FormulaKind::Lod),
        Err(InvalidReason::MissingLodSeparator)
    );
    assert!(check_structure("{ FIXED [Region] : SUM([Sales]) }", FormulaKind::Lod).is_ok());
}

#[test]
fn test_lod_separator_inside_nested_block_does_not_count() {
    // The ':' sits at depth 2, not in the outer block.
    assert_eq!(
        check_structure(
            "{ FIXED [Region] { INCLUDE [C] : AVG([P]) } }",
            FormulaKind::Lod
        ),
        Err(InvalidReason::MissingLodSeparator)
    );
}

#[test]
fn test_extract_dependencies_ordered_and_unique() {
    let deps = extract_dependencies("[Profit] / [Sales] + [Profit]");
    assert_eq!(deps, vec!["Profit".to_string(), "Sales".to_string()]);
}

#[test]
fn test_extract_dependencies_from_lod() {
    let deps = extract_dependencies("{ FIXED [Region] : SUM([Sales]) }");
    assert_eq!(deps, vec!["Region".to_string(), "Sales".to_string()]);
}

#[test]
fn test_extract_dependencies_skips_quoted_text() {
    let deps = extract_dependencies("\"[Sales]\" + [Profit]");
    assert_eq!(deps, vec!["Profit".to_string()]);
}

// ========================================
// DEPENDENCY GRAPH TESTS
// ========================================

fn set_of(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_set_and_get_dependencies() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("Margin", set_of(&["Revenue", "Cost"]));

    let precs = graph.get_precedents("Margin").unwrap();
    assert!(precs.contains("Revenue"));
    assert!(precs.contains("Cost"));

    let deps = graph.get_dependents("Revenue").unwrap();
    assert!(deps.contains("Margin"));
}

#[test]
fn test_update_dependencies_replaces_old() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("A", set_of(&["B"]));
    graph.set_dependencies("A", set_of(&["C"]));

    assert!(graph.get_dependents("B").is_none());
    assert!(graph.get_dependents("C").unwrap().contains("A"));
}

#[test]
fn test_no_cycles_in_chain() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("A", set_of(&[]));
    graph.set_dependencies("B", set_of(&["A"]));
    graph.set_dependencies("C", set_of(&["B"]));

    assert!(graph.cycle_members().is_empty());
}

#[test]
fn test_two_node_cycle_detected() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("CalcA", set_of(&["CalcB"]));
    graph.set_dependencies("CalcB", set_of(&["CalcA"]));

    let members = graph.cycle_members();
    assert_eq!(members.len(), 2);
    assert!(members.contains("CalcA"));
    assert!(members.contains("CalcB"));
}

#[test]
fn test_self_reference_is_a_cycle() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("Loop", set_of(&["Loop"]));

    assert!(graph.cycle_members().contains("Loop"));
}

#[test]
fn test_downstream_of_cycle_not_reported_as_member() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("A", set_of(&["B"]));
    graph.set_dependencies("B", set_of(&["A"]));
    // C depends on the cycle but is not on it.
    graph.set_dependencies("C", set_of(&["A"]));

    let members = graph.cycle_members();
    assert_eq!(members.len(), 2);
    assert!(!members.contains("C"));
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("Base", set_of(&[]));
    graph.set_dependencies("Left", set_of(&["Base"]));
    graph.set_dependencies("Right", set_of(&["Base"]));
    graph.set_dependencies("Top", set_of(&["Left", "Right"]));

    assert!(graph.cycle_members().is_empty());
}

#[test]
fn test_counts() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies("A", set_of(&[]));
    graph.set_dependencies("B", set_of(&["A"]));
    graph.set_dependencies("C", set_of(&["A", "B"]));

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.dependency_count(), 3);
}

// ========================================
// LITERAL SYNTAX FROM THE PRODUCT CONTRACT
// ========================================

#[test]
fn test_contract_formulas_classify_correctly() {
    assert_eq!(kind_of("SUM([Sales])"), FormulaKind::Aggregate);
    assert_eq!(kind_of("WINDOW_SUM([Sales])"), FormulaKind::TableCalculation);
    assert_eq!(kind_of("RUNNING_AVG([Sales])"), FormulaKind::TableCalculation);
    assert_eq!(kind_of("{ FIXED [Region] : SUM([Sales]) }"), FormulaKind::Lod);
    assert_eq!(
        kind_of("{ INCLUDE [Category] : AVG([Profit]) }"),
        FormulaKind::Lod
    );
    assert_eq!(
        kind_of("{ EXCLUDE [Region] : SUM([Sales]) }"),
        FormulaKind::Lod
    );
}
