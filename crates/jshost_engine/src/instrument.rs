//! Source instrumentation for debug locations.
//!
//! Scripts are parsed with `deno_ast` and rewritten at statement spans:
//!
//! - every statement in a statement list is preceded by a report of its
//!   position (`op_debug_statement`),
//! - every `debugger` statement is replaced by a report that stops whenever a
//!   client is attached (`op_debug_break`),
//! - single-statement `if` and loop bodies are braced so they can carry a
//!   report of their own.
//!
//! Each report is a block holding a single lexical declaration, which leaves
//! the completion value of the script untouched. A script that does not parse
//! is handed back as is so the engine raises its own `SyntaxError`.

use deno_ast::{
    MediaType, ModuleSpecifier, ParseParams, ParsedSource, ProgramRef, SourceRangedForSpanned,
    StartSourcePos,
    swc::{
        ast::{
            BlockStmt, DebuggerStmt, DoWhileStmt, Expr, ExprStmt, ForInStmt, ForOfStmt, ForStmt,
            IfStmt, Lit, Script, Stmt, SwitchCase, WhileStmt,
        },
        ecma_visit::{Visit, VisitWith},
    },
};
use jshost_debugger::{BreakKind, SourceContext};
use tracing::debug;

/// Binding that holds the (ignored) result of a report
const REPORT_BINDING: &str = "__jshost_break";

/// Parser specifier; scripts are registered with the debugger under their real path
const SCRIPT_SPECIFIER: &str = "file:///jshost/script.js";

/// A 1-based position in the original script text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    pub line: u32,
    /// Counted in characters
    pub column: u32,
}

/// A location the instrumented code reports to the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakSite {
    pub location: Location,
    pub kind: BreakKind,
}

#[derive(Debug, Clone)]
pub struct Instrumented {
    pub code: String,
    /// Reported locations, in source order
    pub sites: Vec<BreakSite>,
}

impl Instrumented {
    fn unchanged(source: &str) -> Self {
        Self {
            code: source.to_string(),
            sites: Vec::new(),
        }
    }

    /// The first reported location, where a script armed to break on entry
    /// stops.
    pub fn entry(&self) -> Option<Location> {
        self.sites.first().map(|site| site.location)
    }

    pub fn debugger_statements(&self) -> usize {
        self.sites
            .iter()
            .filter(|site| site.kind == BreakKind::DebuggerStatement)
            .count()
    }
}

#[derive(Debug, thiserror::Error)]
enum InstrumentError {
    #[error("Invalid script specifier: {0}")]
    InvalidSpecifier(String),

    #[error("Failed to parse script: {0}")]
    Parse(String),
}

/// Rewrites `source` so it reports its statements under `context`.
pub fn instrument(source: &str, context: SourceContext) -> Instrumented {
    let parsed = match parse(source) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(context = %context, "Leaving script uninstrumented: {e}");
            return Instrumented::unchanged(source);
        }
    };

    let mut collector = Collector {
        context,
        lines: LineIndex::new(source),
        edits: Vec::new(),
        sites: Vec::new(),
    };
    match parsed.program_ref() {
        ProgramRef::Script(script) => script.visit_with(&mut collector),
        ProgramRef::Module(module) => module.visit_with(&mut collector),
    }

    let Collector {
        edits, mut sites, ..
    } = collector;
    let Some(code) = apply(source, edits) else {
        debug!(context = %context, "Statement spans out of range, leaving script uninstrumented");
        return Instrumented::unchanged(source);
    };
    sites.sort_by_key(|site| site.location);
    Instrumented { code, sites }
}

fn parse(source: &str) -> Result<ParsedSource, InstrumentError> {
    let specifier = ModuleSpecifier::parse(SCRIPT_SPECIFIER)
        .map_err(|e| InstrumentError::InvalidSpecifier(e.to_string()))?;

    let parsed = deno_ast::parse_script(ParseParams {
        specifier,
        text: source.into(),
        media_type: MediaType::JavaScript,
        capture_tokens: false,
        scope_analysis: false,
        maybe_syntax: None,
    })
    .map_err(|e| InstrumentError::Parse(e.to_string()))?;

    if let Some(diagnostic) = parsed.diagnostics().first() {
        return Err(InstrumentError::Parse(diagnostic.to_string()));
    }
    Ok(parsed)
}

/// The call a report expands to.
fn report_call(context: SourceContext, site: BreakSite) -> String {
    let op = match site.kind {
        BreakKind::Statement => "op_debug_statement",
        BreakKind::DebuggerStatement => "op_debug_break",
    };
    format!(
        "{{ let {REPORT_BINDING} = Deno.core.ops.{op}({}, {}, {}); }}",
        context.as_u32(),
        site.location.line,
        site.location.column,
    )
}

/// Order of edits that share a start offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EditOrder {
    /// Closing brace of a wrapped body that ends where the next statement starts
    Close,
    Replace,
    Open,
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    order: EditOrder,
    text: String,
}

impl Edit {
    fn insert(at: usize, order: EditOrder, text: String) -> Self {
        Self {
            start: at,
            end: at,
            order,
            text,
        }
    }
}

fn apply(source: &str, mut edits: Vec<Edit>) -> Option<String> {
    edits.sort_by_key(|edit| (edit.start, edit.order));

    let extra: usize = edits.iter().map(|edit| edit.text.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut cursor = 0;
    for edit in edits {
        out.push_str(source.get(cursor..edit.start)?);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(source.get(cursor..)?);
    Some(out)
}

struct LineIndex<'a> {
    text: &'a str,
    /// Byte offset of each line start
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        let mut chars = text.char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            match c {
                '\r' if chars.peek().is_some_and(|&(_, next)| next == '\n') => {}
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => starts.push(offset + c.len_utf8()),
                _ => {}
            }
        }
        Self { text, starts }
    }

    fn location(&self, offset: usize) -> Location {
        let line = self.starts.partition_point(|&start| start <= offset).max(1);
        let start = self.starts[line - 1];
        let column = self
            .text
            .get(start..offset)
            .map_or(0, |prefix| prefix.chars().count());
        Location {
            line: u32::try_from(line).unwrap_or(u32::MAX),
            column: u32::try_from(column + 1).unwrap_or(u32::MAX),
        }
    }
}

fn byte_range(node: &impl SourceRangedForSpanned) -> (usize, usize) {
    (
        node.start().as_byte_index(StartSourcePos::START_SOURCE_POS),
        node.end().as_byte_index(StartSourcePos::START_SOURCE_POS),
    )
}

/// A string literal expression statement, as found in a directive prologue
fn is_directive(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(ExprStmt { expr, .. }) if matches!(&**expr, Expr::Lit(Lit::Str(_))))
}

struct Collector<'a> {
    context: SourceContext,
    lines: LineIndex<'a>,
    edits: Vec<Edit>,
    sites: Vec<BreakSite>,
}

impl Collector<'_> {
    fn report(&mut self, offset: usize, kind: BreakKind) -> String {
        let site = BreakSite {
            location: self.lines.location(offset),
            kind,
        };
        self.sites.push(site);
        report_call(self.context, site)
    }

    fn statement_list(&mut self, stmts: &[Stmt]) {
        let body = stmts.iter().skip_while(|stmt| is_directive(stmt));
        for stmt in body {
            if matches!(stmt, Stmt::Debugger(_) | Stmt::Empty(_)) {
                continue;
            }
            let (start, _) = byte_range(stmt);
            let report = self.report(start, BreakKind::Statement);
            self.edits
                .push(Edit::insert(start, EditOrder::Open, format!("{report} ")));
        }
    }

    /// Braces a single-statement body so it can carry a report.
    fn statement_body(&mut self, body: &Stmt) {
        if matches!(
            body,
            Stmt::Block(_) | Stmt::Debugger(_) | Stmt::Empty(_) | Stmt::Decl(_)
        ) {
            return;
        }
        let (start, end) = byte_range(body);
        let report = self.report(start, BreakKind::Statement);
        self.edits
            .push(Edit::insert(start, EditOrder::Open, format!("{{ {report} ")));
        self.edits
            .push(Edit::insert(end, EditOrder::Close, " }".to_string()));
    }
}

impl Visit for Collector<'_> {
    fn visit_script(&mut self, node: &Script) {
        self.statement_list(&node.body);
        node.visit_children_with(self);
    }

    fn visit_block_stmt(&mut self, node: &BlockStmt) {
        self.statement_list(&node.stmts);
        node.visit_children_with(self);
    }

    fn visit_switch_case(&mut self, node: &SwitchCase) {
        self.statement_list(&node.cons);
        node.visit_children_with(self);
    }

    fn visit_if_stmt(&mut self, node: &IfStmt) {
        self.statement_body(&node.cons);
        if let Some(alt) = &node.alt {
            self.statement_body(alt);
        }
        node.visit_children_with(self);
    }

    fn visit_while_stmt(&mut self, node: &WhileStmt) {
        self.statement_body(&node.body);
        node.visit_children_with(self);
    }

    fn visit_do_while_stmt(&mut self, node: &DoWhileStmt) {
        self.statement_body(&node.body);
        node.visit_children_with(self);
    }

    fn visit_for_stmt(&mut self, node: &ForStmt) {
        self.statement_body(&node.body);
        node.visit_children_with(self);
    }

    fn visit_for_in_stmt(&mut self, node: &ForInStmt) {
        self.statement_body(&node.body);
        node.visit_children_with(self);
    }

    fn visit_for_of_stmt(&mut self, node: &ForOfStmt) {
        self.statement_body(&node.body);
        node.visit_children_with(self);
    }

    fn visit_debugger_stmt(&mut self, node: &DebuggerStmt) {
        let (start, end) = byte_range(node);
        let report = self.report(start, BreakKind::DebuggerStatement);
        self.edits.push(Edit {
            start,
            end,
            order: EditOrder::Replace,
            text: report,
        });
    }
}
