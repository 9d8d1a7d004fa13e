//! The compilation pipeline
//!
//! [compile] runs the phases of the compiler in order over a program.
//! Checking and padding may record fatal diagnostics; the pipeline stops before
//!     code generation if they did.
//! Nothing is returned for a program with fatal diagnostics, not even the passes that
//!     compiled fine.

use crate::classes::ReplacementClasses;
use crate::code::{self, CodeError, RuleCode, RuleContext};
use crate::diag::{Diagnostic, DiagnosticKind, Diagnostics, Location};
use crate::fsm::{self, FsmError, Machine};
use crate::index::SlotIndex;
use crate::rule::{Pass, Renderer, Rule, Table, TableKind};
use crate::xlb::{self, XlbContext};
use crate::{check, index, precontext, Version};
use font::Font;
use std::collections::HashMap;

/// Compilation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// The engine version to generate code for.
    pub version: Version,
    /// If true, a program that needs a later version is an error.
    /// Otherwise the version is raised with a warning.
    pub pin_version: bool,
    /// Maximum number of rule firings per pass when running the result with
    ///     [crate::engine::Engine].
    pub loop_limit: usize,
}

impl Options {
    pub const DEFAULT_LOOP_LIMIT: usize = 1000;
}

impl Default for Options {
    fn default() -> Self {
        Options {
            version: Version::default(),
            pin_version: false,
            loop_limit: Options::DEFAULT_LOOP_LIMIT,
        }
    }
}

/// A compiled rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    /// Index of the rule in its pass.
    pub index: usize,
    pub code: RuleCode,
    pub sort_key: usize,
    /// Number of leading unmodified items, not counting padding.
    pub pre_context: usize,
    /// Number of glyphs the rule matches, padding included.
    pub input_len: usize,
}

/// A compiled pass.
///
/// Rule numbers in the machine's rule lists are positions in [CompiledPass::rules].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPass {
    pub table: TableKind,
    /// Index of the pass in its table.
    pub index: usize,
    pub global_id: u16,
    pub machine: Machine,
    pub rules: Vec<CompiledRule>,
    pub max_rule_context: usize,
    pub max_rule_loop: u8,
    /// Largest number of slots a rule moves scanning back by.
    pub max_backup: usize,
}

/// Output of the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    /// The negotiated engine version.
    pub version: Version,
    /// Passes with at least one usable rule, in pipeline order.
    pub passes: Vec<CompiledPass>,
    pub classes: ReplacementClasses,
    pub xlb: XlbContext,
    pub warnings: Vec<Diagnostic>,
}

/// An invariant of the compiler was broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    MissingGlobalId {
        table: TableKind,
        pass: usize,
    },
    DeadState {
        table: TableKind,
        pass: usize,
        state: usize,
    },
    MissingStartState {
        table: TableKind,
        pass: usize,
        phantoms: usize,
    },
    Code {
        table: TableKind,
        pass: usize,
        rule: usize,
        error: CodeError,
    },
}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InternalError::MissingGlobalId { table, pass } => {
                write!(f, "{table} pass {} has usable rules but no ID", pass + 1)
            }
            InternalError::DeadState { table, pass, state } => write!(
                f,
                "{table} pass {}: state {state} neither transitions nor succeeds",
                pass + 1
            ),
            InternalError::MissingStartState {
                table,
                pass,
                phantoms,
            } => write!(
                f,
                "{table} pass {}: no start state after {phantoms} phantom glyphs",
                pass + 1
            ),
            InternalError::Code {
                table,
                pass,
                rule,
                error,
            } => write!(f, "{table} pass {} rule {}: {error}", pass + 1, rule + 1),
        }
    }
}

impl std::error::Error for InternalError {}

/// Why compilation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The program has at least one fatal diagnostic.
    Diagnostics(Diagnostics),
    Internal(InternalError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Diagnostics(diagnostics) => {
                let n = diagnostics.fatal().count();
                write!(f, "{n} error{}", if n == 1 { "" } else { "s" })?;
                for diagnostic in diagnostics.fatal() {
                    write!(f, "\n{diagnostic}")?;
                }
                Ok(())
            }
            Failure::Internal(error) => write!(f, "internal compiler error: {error}"),
        }
    }
}

impl std::error::Error for Failure {}

impl From<InternalError> for Failure {
    fn from(value: InternalError) -> Self {
        Failure::Internal(value)
    }
}

fn stop_if_fatal(diagnostics: &mut Diagnostics) -> Result<(), Failure> {
    if diagnostics.has_fatal() {
        return Err(Failure::Diagnostics(std::mem::take(diagnostics)));
    }
    Ok(())
}

fn passes_mut(renderer: &mut Renderer) -> impl Iterator<Item = (TableKind, usize, &mut Pass)> {
    renderer
        .tables
        .iter_mut()
        .filter(|t| !t.bad)
        .flat_map(|t| {
            let kind = t.kind;
            t.passes
                .iter_mut()
                .enumerate()
                .map(move |(i, pass)| (kind, i, pass))
        })
}

/// Compiles a program.
///
/// The program is annotated in place: tables are sorted, rules padded and resolved,
///     bad scopes marked.
pub fn compile(
    renderer: &mut Renderer,
    font: &dyn Font,
    options: &Options,
) -> Result<Compiled, Failure> {
    let _span = tracing::info_span!("compile").entered();
    let mut diagnostics = Diagnostics::default();
    check::check(renderer, font, &mut diagnostics);

    {
        let _span = tracing::info_span!("precontext").entered();
        for (kind, p, pass) in passes_mut(renderer) {
            precontext::normalize(pass);
            for (r, rule) in pass.rules.iter_mut().enumerate() {
                if rule.is_usable() && rule.items.len() > crate::MAX_SLOTS_PER_RULE {
                    diagnostics.push(
                        DiagnosticKind::TooManySlots {
                            count: rule.items.len(),
                        },
                        Location::rule(kind, p, r, rule.line),
                    );
                    rule.bad = true;
                }
            }
        }
    }
    stop_if_fatal(&mut diagnostics)?;

    let classes = {
        let _span = tracing::info_span!("classes").entered();
        ReplacementClasses::assign(renderer, &mut diagnostics)
    };
    stop_if_fatal(&mut diagnostics)?;

    for (_, _, pass) in passes_mut(renderer) {
        for rule in pass.rules.iter_mut().filter(|r| r.is_usable()) {
            index::resolve(rule);
        }
    }

    let version = negotiate_version(renderer, &classes, options, &mut diagnostics);
    stop_if_fatal(&mut diagnostics)?;

    let mut next_id = 0_u16;
    for (_, _, pass) in passes_mut(renderer) {
        pass.global_id = if pass.has_usable_rules() {
            next_id += 1;
            Some(next_id - 1)
        } else {
            None
        };
    }

    let ctx = RuleContext {
        version,
        units_per_em: font.units_per_em(),
        classes: &classes,
    };
    let mut passes = vec![];
    for table in renderer.tables.iter().filter(|t| !t.bad) {
        for (p, pass) in table.passes.iter().enumerate() {
            if !pass.has_usable_rules() {
                continue;
            }
            let _span = tracing::info_span!("pass", table = %table.kind, pass = p).entered();
            if let Some(compiled) = compile_pass(renderer, font, &ctx, table, p, &mut diagnostics)? {
                passes.push(compiled);
            }
        }
    }
    stop_if_fatal(&mut diagnostics)?;

    let xlb = {
        let _span = tracing::info_span!("xlb").entered();
        xlb::analyze(renderer)
    };
    tracing::debug!(passes = passes.len(), %version, "compiled program");
    Ok(Compiled {
        version,
        passes,
        classes,
        xlb,
        warnings: diagnostics.into_vec(),
    })
}

fn negotiate_version(
    renderer: &Renderer,
    classes: &ReplacementClasses,
    options: &Options,
    diagnostics: &mut Diagnostics,
) -> Version {
    let required = renderer
        .tables
        .iter()
        .filter(|t| !t.bad)
        .flat_map(|t| t.passes.iter())
        .flat_map(|p| p.usable_rules())
        .map(|(_, rule)| code::min_version(rule, classes))
        .max()
        .unwrap_or(Version::V1_0);
    let requested = options.version;
    tracing::debug!(%requested, %required, "negotiating version");
    if required <= requested {
        return requested;
    }
    if options.pin_version {
        diagnostics.push(
            DiagnosticKind::VersionTooLow {
                requested,
                required,
            },
            Location::default(),
        );
        requested
    } else {
        diagnostics.push(
            DiagnosticKind::VersionBumped {
                requested,
                required,
            },
            Location::default(),
        );
        required
    }
}

/// Builds the machine and code of one pass.
///
/// Returns [None] if a problem with the program was found; it is recorded in `diagnostics`.
fn compile_pass(
    renderer: &Renderer,
    font: &dyn Font,
    ctx: &RuleContext,
    table: &Table,
    p: usize,
    diagnostics: &mut Diagnostics,
) -> Result<Option<CompiledPass>, InternalError> {
    let pass = &table.passes[p];
    let table = table.kind;
    let global_id = pass
        .global_id
        .ok_or(InternalError::MissingGlobalId { table, pass: p })?;
    let location = Location::pass(table, p);
    let mut machine = match fsm::build(pass, renderer, font) {
        Ok(Some(machine)) => machine,
        Ok(None) => return Ok(None),
        Err(FsmError::TooManyStates(count)) => {
            diagnostics.push(DiagnosticKind::TooManyStates { count }, location);
            return Ok(None);
        }
        Err(FsmError::TooManyColumns(count)) => {
            diagnostics.push(DiagnosticKind::TooManyColumns { count }, location);
            return Ok(None);
        }
        Err(FsmError::DeadState(state)) => {
            return Err(InternalError::DeadState {
                table,
                pass: p,
                state,
            })
        }
        Err(FsmError::MissingStartState(phantoms)) => {
            return Err(InternalError::MissingStartState {
                table,
                pass: p,
                phantoms,
            })
        }
    };

    let mut rules = vec![];
    let mut ok = true;
    for (r, rule) in pass.usable_rules() {
        let location = Location::rule(table, p, r, rule.line);
        let code = match code::compile_rule(rule, ctx) {
            Ok(code) => code,
            Err(error) => {
                let kind = match error {
                    CodeError::ConstraintTooLong(len) => DiagnosticKind::ConstraintTooLong { len },
                    CodeError::SlotOffsetOutOfRange(offset) => {
                        DiagnosticKind::SlotOffsetOutOfRange { offset }
                    }
                    CodeError::StringInExpression => DiagnosticKind::StringInExpression,
                    CodeError::TooManyAssociations(count) => {
                        DiagnosticKind::TooManyAssociations { count }
                    }
                    error => {
                        return Err(InternalError::Code {
                            table,
                            pass: p,
                            rule: r,
                            error,
                        })
                    }
                };
                diagnostics.push(kind, location);
                ok = false;
                continue;
            }
        };
        rules.push(CompiledRule {
            index: r,
            code,
            sort_key: rule.sort_key(),
            pre_context: rule.pre_context,
            input_len: rule.input_len(),
        });
    }
    if !ok {
        return Ok(None);
    }

    let positions: HashMap<usize, u16> = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| (rule.index, i as u16))
        .collect();
    for list in machine.success_rules.iter_mut() {
        for rule in list.iter_mut() {
            *rule = positions.get(&(*rule as usize)).copied().unwrap_or(*rule);
        }
    }
    let max_backup = pass
        .usable_rules()
        .map(|(_, rule)| backup(rule))
        .max()
        .unwrap_or(0);
    tracing::debug!(
        global_id,
        rules = rules.len(),
        states = machine.num_states,
        "compiled pass"
    );
    Ok(Some(CompiledPass {
        table,
        index: p,
        global_id,
        machine,
        rules,
        max_rule_context: pass.max_rule_context(),
        max_rule_loop: pass.max_rule_loop,
        max_backup,
    }))
}

/// How far before the default position a rule resumes scanning.
fn backup(rule: &Rule) -> usize {
    let (Some(advance), Some(last)) = (rule.output_advance, rule.last_modified()) else {
        return 0;
    };
    if rule.caret.is_none() {
        return 0;
    }
    let default = match rule.items[last].output_index {
        Some(SlotIndex::Real(n)) => n as usize + 1,
        Some(index) => index.position() as usize,
        None => return 0,
    };
    default.saturating_sub(advance as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::SlotAttr;
    use crate::expr::Expr;
    use crate::rule::{ItemKind, Output, Substitution};
    use crate::testing::*;

    fn program(tables: Vec<Table>) -> Renderer {
        renderer(vec![vec![1, 2], vec![3, 4], vec![5], vec![]], tables)
    }

    #[test]
    fn single_substitution() {
        let mut r = program(vec![table(
            TableKind::Substitution,
            vec![vec![rule(vec![subst(0, Output::Class(1))])]],
        )]);
        let compiled = compile(&mut r, &font(10), &Options::default()).unwrap();
        assert_eq!(compiled.version, Version::V2_0);
        assert!(compiled.warnings.is_empty());
        assert_eq!(compiled.passes.len(), 1);
        let pass = &compiled.passes[0];
        assert_eq!(pass.global_id, 0);
        assert_eq!(pass.max_rule_context, 1);
        assert_eq!(pass.rules[0].code.actions, vec![56, 0, 0, 1, 0, 0, 25, 49]);
        assert_eq!(compiled.classes.len(), 2);
    }

    #[test]
    fn fatal_diagnostics_stop_the_pipeline() {
        let mut r = program(vec![table(
            TableKind::Substitution,
            vec![vec![
                rule(vec![subst(0, Output::Class(1))]),
                rule(vec![context(0), context(1)]),
            ]],
        )]);
        let Err(Failure::Diagnostics(diagnostics)) =
            compile(&mut r, &font(10), &Options::default())
        else {
            panic!("expected diagnostics");
        };
        assert_eq!(diagnostics.codes(), vec![2018]);
    }

    fn measurement_program() -> Renderer {
        program(vec![table(
            TableKind::Positioning,
            vec![vec![rule(vec![with_settings(
                0,
                vec![set(SlotAttr::ShiftX, Expr::Number(0))],
            )])]],
        )])
    }

    #[test]
    fn version_is_bumped() {
        let options = Options {
            version: Version::V1_0,
            ..Default::default()
        };
        let compiled = compile(&mut measurement_program(), &font(10), &options).unwrap();
        assert_eq!(compiled.version, Version::V2_0);
        let codes: Vec<u16> = compiled.warnings.iter().map(|w| w.kind.code()).collect();
        assert_eq!(codes, vec![1008]);
    }

    #[test]
    fn bumped_version_selects_the_newer_opcodes() {
        let mut r = program(vec![table(
            TableKind::Justification,
            vec![vec![rule(vec![with_kind(
                0,
                ItemKind::Substitution(Substitution {
                    settings: vec![set(
                        SlotAttr::MeasureSol,
                        Expr::Measure {
                            value: 10,
                            scale: 1000,
                        },
                    )],
                    ..substitution(Output::Class(1))
                }),
            )])]],
        )]);
        let options = Options {
            version: Version::V1_0,
            ..Default::default()
        };
        let compiled = compile(&mut r, &font(10), &options).unwrap();
        assert_eq!(compiled.version, Version::V2_0);
        let codes: Vec<u16> = compiled.warnings.iter().map(|w| w.kind.code()).collect();
        assert!(codes.contains(&1008));
        // PutSubs rather than the 1.x PutSubsV1_2.
        assert_eq!(
            compiled.passes[0].rules[0].code.actions,
            vec![56, 0, 0, 1, 0, 0, 1, 10, 35, 23, 25, 49]
        );
    }

    #[test]
    fn pinned_version_is_an_error() {
        let options = Options {
            version: Version::V1_0,
            pin_version: true,
            ..Default::default()
        };
        let Err(Failure::Diagnostics(diagnostics)) =
            compile(&mut measurement_program(), &font(10), &options)
        else {
            panic!("expected diagnostics");
        };
        assert_eq!(diagnostics.codes(), vec![2020]);
    }

    #[test]
    fn global_ids_skip_passes_without_usable_rules() {
        let mut r = program(vec![table(
            TableKind::Substitution,
            vec![
                vec![rule(vec![subst(0, Output::Class(1))])],
                vec![rule(vec![subst(3, Output::Class(2))])],
                vec![rule(vec![subst(1, Output::Class(0))])],
            ],
        )]);
        let compiled = compile(&mut r, &font(10), &Options::default()).unwrap();
        let ids: Vec<(usize, u16)> = compiled
            .passes
            .iter()
            .map(|p| (p.index, p.global_id))
            .collect();
        assert_eq!(ids, vec![(0, 0), (2, 1)]);
        assert_eq!(r.tables[0].passes[1].global_id, None);
        let codes: Vec<u16> = compiled.warnings.iter().map(|w| w.kind.code()).collect();
        assert_eq!(codes, vec![1009]);
    }

    #[test]
    fn rule_numbers_are_dense() {
        let mut r = program(vec![table(
            TableKind::Substitution,
            vec![vec![
                rule(vec![subst(3, Output::Class(2))]),
                rule(vec![subst(0, Output::Class(1))]),
            ]],
        )]);
        let compiled = compile(&mut r, &font(10), &Options::default()).unwrap();
        let pass = &compiled.passes[0];
        assert_eq!(pass.rules.len(), 1);
        assert_eq!(pass.rules[0].index, 1);
        assert_eq!(pass.machine.success_rules, vec![vec![0]]);
    }

    #[test]
    fn max_backup_follows_caret() {
        let mut reprocess = rule(vec![context(2), subst(0, Output::Class(1)), context(2)]);
        reprocess.caret = Some(0);
        let mut r = program(vec![table(TableKind::Substitution, vec![vec![reprocess]])]);
        let compiled = compile(&mut r, &font(10), &Options::default()).unwrap();
        assert_eq!(compiled.passes[0].max_backup, 2);
    }

    #[test]
    fn failure_display() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(DiagnosticKind::NoInputItems, Location::default());
        let failure = Failure::Diagnostics(diagnostics);
        assert!(failure.to_string().starts_with("1 error\nerror[2019]"));
    }
}
