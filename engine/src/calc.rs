//! FILENAME: engine/src/calc.rs
//! PURPOSE: Builds validated calculated fields from formula suggestions.
//! CONTEXT: Suggestions (from analysis or user edits) and KPI calculations
//! run through the same pipeline: classify, check structure, extract and
//! resolve dependencies, then a whole-set cycle sweep. Invalid calculations
//! are kept in the result with their reason so the report can explain the
//! exclusion, but only valid ones reach the document.

use crate::analysis::{CalculationSuggestion, KpiDefinition};
use crate::config::EngineConfig;
use crate::field::{FieldDefinition, FieldRole};
use crate::report::{GenerationReport, Stage};
use formula::{
    check_structure, classify, extract_dependencies, DependencyGraph, FormulaKind, InvalidReason,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The structural kind of a calculation, as recorded in the document.
/// Mirrors `formula::FormulaKind` with serde support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationKind {
    Aggregate,
    TableCalculation,
    Lod,
    Custom,
}

impl From<FormulaKind> for CalculationKind {
    fn from(kind: FormulaKind) -> Self {
        match kind {
            FormulaKind::Aggregate => CalculationKind::Aggregate,
            FormulaKind::TableCalculation => CalculationKind::TableCalculation,
            FormulaKind::Lod => CalculationKind::Lod,
            FormulaKind::Custom => CalculationKind::Custom,
        }
    }
}

/// A calculated field after classification and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedField {
    pub name: String,
    pub formula: String,
    pub kind: CalculationKind,
    /// Field/calculation names this formula references, in first-appearance
    /// order.
    pub dependencies: Vec<String>,
    pub role: FieldRole,
    pub valid: bool,
    /// Why the field was excluded; None when valid.
    pub invalid_reason: Option<String>,
}

impl CalculatedField {
    fn invalid(name: &str, formula: &str, kind: CalculationKind, reason: String) -> Self {
        CalculatedField {
            name: name.to_string(),
            formula: formula.to_string(),
            kind,
            dependencies: Vec::new(),
            role: FieldRole::Measure,
            valid: false,
            invalid_reason: Some(reason),
        }
    }
}

/// Builds the full calculated-field set for one datasource.
///
/// KPI calculations are appended after the plain suggestions so a KPI can
/// reference a suggested calculation by name. Every exclusion produces a
/// warning; none of them is fatal.
pub fn build_calculated_fields(
    suggestions: &[CalculationSuggestion],
    kpis: &[KpiDefinition],
    fields: &[FieldDefinition],
    config: &EngineConfig,
    report: &mut GenerationReport,
) -> Vec<CalculatedField> {
    let mut proposed: Vec<(String, String)> = Vec::new();
    for suggestion in suggestions {
        proposed.push((suggestion.name.clone(), suggestion.formula.clone()));
    }
    for kpi in kpis {
        proposed.push((kpi.name.clone(), kpi.calculation.clone()));
    }

    let field_names: HashSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    // Forward references between calculations are allowed, so the
    // resolution namespace contains every proposed calculation name.
    let calc_names: HashSet<&str> = proposed.iter().map(|(name, _)| name.as_str()).collect();

    let mut calcs: Vec<CalculatedField> = Vec::with_capacity(proposed.len());
    let mut seen: HashSet<String> = HashSet::new();

    for (name, text) in &proposed {
        let kind: CalculationKind =
            classify(text, &config.aggregate_functions, &config.table_calc_functions).into();

        // Name collisions: against fields and against earlier calculations.
        if field_names.contains(name.as_str()) || seen.contains(name) {
            let reason = InvalidReason::NameCollision(name.clone()).to_string();
            report.warn(
                Stage::Calculations,
                format!("calculated field '{}' excluded: {}", name, reason),
            );
            calcs.push(CalculatedField::invalid(name, text, kind, reason));
            continue;
        }
        seen.insert(name.clone());

        let formula_kind = match kind {
            CalculationKind::Aggregate => FormulaKind::Aggregate,
            CalculationKind::TableCalculation => FormulaKind::TableCalculation,
            CalculationKind::Lod => FormulaKind::Lod,
            CalculationKind::Custom => FormulaKind::Custom,
        };
        if let Err(reason) = check_structure(text, formula_kind) {
            report.warn(
                Stage::Calculations,
                format!("calculated field '{}' excluded: {}", name, reason),
            );
            calcs.push(CalculatedField::invalid(name, text, kind, reason.to_string()));
            continue;
        }

        let dependencies = extract_dependencies(text);
        let unresolved = dependencies.iter().find(|dep| {
            !field_names.contains(dep.as_str()) && !calc_names.contains(dep.as_str())
        });
        if let Some(first) = unresolved {
            let reason = InvalidReason::UnresolvedDependency(first.clone()).to_string();
            report.warn(
                Stage::Calculations,
                format!("calculated field '{}' excluded: {}", name, reason),
            );
            calcs.push(CalculatedField::invalid(name, text, kind, reason));
            continue;
        }

        calcs.push(CalculatedField {
            name: name.clone(),
            formula: text.clone(),
            kind,
            dependencies,
            role: FieldRole::Measure,
            valid: true,
            invalid_reason: None,
        });
    }

    exclude_cycles(&mut calcs, report);
    exclude_orphaned(&mut calcs, report);

    tracing::debug!(
        total = calcs.len(),
        valid = calcs.iter().filter(|c| c.valid).count(),
        "calculated fields built"
    );

    calcs
}

/// Marks every calculation on a dependency cycle invalid.
fn exclude_cycles(calcs: &mut [CalculatedField], report: &mut GenerationReport) {
    let mut graph = DependencyGraph::new();
    let valid_names: HashSet<String> = calcs
        .iter()
        .filter(|c| c.valid)
        .map(|c| c.name.clone())
        .collect();

    for calc in calcs.iter().filter(|c| c.valid) {
        let precedents: HashSet<String> = calc
            .dependencies
            .iter()
            .filter(|dep| valid_names.contains(dep.as_str()))
            .cloned()
            .collect();
        graph.set_dependencies(&calc.name, precedents);
    }

    let members = graph.cycle_members();
    if members.is_empty() {
        return;
    }

    // Warn in build order so the report stays deterministic.
    for calc in calcs.iter_mut() {
        if calc.valid && members.contains(&calc.name) {
            let reason = InvalidReason::CircularDependency.to_string();
            report.warn(
                Stage::Calculations,
                format!("calculated field '{}' excluded: {}", calc.name, reason),
            );
            calc.valid = false;
            calc.invalid_reason = Some(reason);
        }
    }
}

/// Excludes calculations left referencing something that was itself
/// excluded. Runs to a fixpoint: exclusions can cascade down chains.
fn exclude_orphaned(calcs: &mut [CalculatedField], report: &mut GenerationReport) {
    loop {
        let valid_names: HashSet<String> = calcs
            .iter()
            .filter(|c| c.valid)
            .map(|c| c.name.clone())
            .collect();
        let excluded_names: HashSet<String> = calcs
            .iter()
            .filter(|c| !c.valid)
            .map(|c| c.name.clone())
            .collect();

        let mut changed = false;
        for calc in calcs.iter_mut() {
            if !calc.valid {
                continue;
            }
            let broken = calc.dependencies.iter().find(|dep| {
                excluded_names.contains(dep.as_str()) && !valid_names.contains(dep.as_str())
            });
            if let Some(dep) = broken {
                let reason = format!("references excluded calculation [{}]", dep);
                report.warn(
                    Stage::Calculations,
                    format!("calculated field '{}' excluded: {}", calc.name, reason),
                );
                calc.invalid_reason = Some(reason);
                calc.valid = false;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
}
