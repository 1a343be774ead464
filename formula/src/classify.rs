//! FILENAME: formula/src/classify.rs
//! PURPOSE: Best-effort structural classification of calculation text.
//! CONTEXT: The workbook generator treats the four calculation kinds
//! differently (only the kind is recorded in the document; the formula
//! text itself is passed through untouched), so classification is
//! structural, not semantic. Priority order, first match wins:
//!
//! 1. LOD             - a brace block containing FIXED/INCLUDE/EXCLUDE
//! 2. TableCalculation - invokes a whitelisted window/ranking function
//! 3. Aggregate       - a direct AGG([Field]) call and nothing else
//! 4. Custom          - anything else
//!
//! The function whitelists come from the caller so deployments can extend
//! them without touching this crate. The LOD keywords are part of the
//! calculation language itself and are fixed here.

use crate::lexer::Lexer;
use crate::token::Token;

/// The structural kind of a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaKind {
    Aggregate,
    TableCalculation,
    Lod,
    Custom,
}

/// Scoping keywords that open a level-of-detail expression.
pub const LOD_KEYWORDS: [&str; 3] = ["FIXED", "INCLUDE", "EXCLUDE"];

/// Classifies a calculation string.
///
/// # Arguments
/// * `text` - The raw formula text.
/// * `aggregates` - Direct aggregate function names (SUM, AVG, ...).
/// * `table_calcs` - Window/ranking function names (WINDOW_SUM, RANK, ...).
///
/// Empty or whitespace-only text classifies as Custom; the structure
/// check is responsible for rejecting it.
pub fn classify(text: &str, aggregates: &[String], table_calcs: &[String]) -> FormulaKind {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return FormulaKind::Custom;
    }

    let tokens = Lexer::tokenize(trimmed);

    if is_lod(trimmed, &tokens) {
        return FormulaKind::Lod;
    }
    if invokes_any(&tokens, table_calcs) {
        return FormulaKind::TableCalculation;
    }
    if is_direct_aggregate(&tokens, aggregates) {
        return FormulaKind::Aggregate;
    }
    FormulaKind::Custom
}

/// An LOD expression opens with '{', closes with '}', and contains one of
/// the scoping keywords. Whether the block also carries the mandatory ':'
/// separator is left to the structure check.
fn is_lod(trimmed: &str, tokens: &[Token]) -> bool {
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return false;
    }
    tokens.iter().any(|t| match t {
        Token::Identifier(name) => LOD_KEYWORDS.contains(&name.as_str()),
        _ => false,
    })
}

/// True when any whitelisted function name is invoked (identifier
/// immediately followed by an opening parenthesis).
fn invokes_any(tokens: &[Token], names: &[String]) -> bool {
    tokens.windows(2).any(|pair| match pair {
        [Token::Identifier(name), Token::LParen] => {
            names.iter().any(|n| n.eq_ignore_ascii_case(name))
        }
        _ => false,
    })
}

/// A direct aggregate is exactly AGG([Field]) with nothing before or after.
fn is_direct_aggregate(tokens: &[Token], aggregates: &[String]) -> bool {
    match tokens {
        [
            Token::Identifier(name),
            Token::LParen,
            Token::FieldRef(_),
            Token::RParen,
            Token::EOF,
        ] => aggregates.iter().any(|n| n.eq_ignore_ascii_case(name)),
        _ => false,
    }
}
