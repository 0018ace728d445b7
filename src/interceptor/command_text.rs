use std::sync::Arc;

use super::traits::CommandInterceptor;
use crate::database::command::{CommandParam, SqlCommand, SqlValue, TENANT_PARAM};
use crate::tenant::{ScopeRegistry, TenantContext};

/// Clauses that may follow a WHERE condition at the same nesting level
const TRAILING_KEYWORDS: &[&str] = &[
    "GROUP", "HAVING", "WINDOW", "ORDER", "LIMIT", "OFFSET", "FETCH", "FOR", "RETURNING",
];

/// Keywords that end one statement level and start the next
const SET_OPERATORS: &[&str] = &["UNION", "INTERSECT", "EXCEPT"];

/// Words that can never be a table name or alias
const RESERVED: &[&str] = &[
    "WHERE", "SET", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "ON", "USING", "GROUP",
    "ORDER", "LIMIT", "OFFSET", "FETCH", "FOR", "RETURNING", "HAVING", "WINDOW", "UNION", "INTERSECT", "EXCEPT",
    "SELECT", "FROM", "AS", "ONLY", "LATERAL", "TABLESAMPLE", "VALUES",
];

/// Last-resort tenant enforcement on raw command text.
///
/// Commands built by the structured query layer already carry a named
/// `tenant_id` parameter; for those only the bound value is refreshed.
/// Anything else that reads or updates a scoped table gets a tenant
/// predicate spliced into its WHERE clause.
pub struct TenantCommandInterceptor {
    registry: Arc<ScopeRegistry>,
    log_rewrites: bool,
}

/// Outcome of inspecting one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Not addressed to a scoped table
    Untouched,
    /// An existing tenant parameter received the current tenant
    ParameterRefreshed,
    /// A tenant predicate literal is already present without a bound parameter
    PredicatePresent,
    /// Predicate injected into the command text
    Injected,
}

impl TenantCommandInterceptor {
    pub fn new(registry: Arc<ScopeRegistry>) -> Self {
        Self {
            registry,
            log_rewrites: true,
        }
    }

    pub fn with_logging(mut self, log_rewrites: bool) -> Self {
        self.log_rewrites = log_rewrites;
        self
    }

    pub fn rewrite(&self, command: &mut SqlCommand, ctx: &TenantContext) -> Rewrite {
        if let Some(param) = command.param_mut(TENANT_PARAM) {
            param.value = SqlValue::tenant(ctx);
            return Rewrite::ParameterRefreshed;
        }

        let placeholder = command.next_placeholder();
        let tokens = tokenize(&command.text);
        let mut edits = Vec::new();
        let mut scoped_tables = Vec::new();
        let mut predicate_present = false;

        for segment in segments(&tokens, command.text.len()) {
            let refs = table_refs(&command.text, &tokens, &segment.tokens, &self.registry);
            scoped_tables.extend(refs.iter().filter(|r| r.column.is_some()).map(|r| r.name));
            match scope_segment(&command.text, &tokens, &segment, &refs, &placeholder) {
                Scoping::NotScoped => {}
                Scoping::Present => predicate_present = true,
                Scoping::Edits(segment_edits) => edits.extend(segment_edits),
            }
        }

        if edits.is_empty() {
            if predicate_present {
                tracing::warn!(
                    "Command on scoped table(s) {:?} has a literal tenant predicate and no bound tenant parameter; left unchanged",
                    scoped_tables
                );
                return Rewrite::PredicatePresent;
            }
            return Rewrite::Untouched;
        }

        let scoped_tables = scoped_tables.join(", ");
        let mut text = command.text.clone();
        // Inner edits sit at higher offsets than the outer ones wrapping them
        edits.sort_by(|a, b| b.0.cmp(&a.0));
        for (at, insert) in edits {
            text.insert_str(at, &insert);
        }
        if self.log_rewrites {
            tracing::debug!("Tenant predicate injected into command on {}: {}", scoped_tables, text);
        }
        command.text = text;
        command
            .params
            .push(CommandParam::named(TENANT_PARAM, SqlValue::tenant(ctx)));
        Rewrite::Injected
    }
}

impl CommandInterceptor for TenantCommandInterceptor {
    fn name(&self) -> &'static str {
        "TenantCommandInterceptor"
    }

    fn command_executing(&self, command: &mut SqlCommand, ctx: &TenantContext) {
        self.rewrite(command, ctx);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    QuotedIdent,
    Symbol,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    start: usize,
    end: usize,
}

impl<'a> Token<'a> {
    fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    fn ident(&self) -> Option<&'a str> {
        match self.kind {
            TokenKind::QuotedIdent | TokenKind::Word => Some(self.text),
            TokenKind::Symbol => None,
        }
    }

    /// Identifier usable as a table name or alias
    fn is_name(&self) -> bool {
        match self.kind {
            TokenKind::QuotedIdent => true,
            TokenKind::Word => {
                !self.text.starts_with(|c: char| c.is_ascii_digit() || c == '$')
                    && !RESERVED.iter().any(|k| self.is_keyword(k))
            }
            TokenKind::Symbol => false,
        }
    }
}

/// Minimal lexer: words, quoted identifiers and single-character symbols,
/// with string literals and comments skipped.
fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b if b.is_ascii_whitespace() => i += 1,
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            b'\'' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        if bytes.get(i + 1) == Some(&b'\'') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
            }
            b'"' => {
                let start = i;
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'"' {
                        if bytes.get(i + 1) == Some(&b'"') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                let inner_end = i.min(bytes.len());
                i = (i + 1).min(bytes.len());
                tokens.push(Token {
                    kind: TokenKind::QuotedIdent,
                    text: &sql[start + 1..inner_end],
                    start,
                    end: i,
                });
            }
            b if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'$') || bytes[i] >= 0x80)
                {
                    i += 1;
                }
                tokens.push(Token { kind: TokenKind::Word, text: &sql[start..i], start, end: i });
            }
            _ => {
                let start = i;
                i += 1;
                // Keep multi-byte characters whole
                while i < bytes.len() && !sql.is_char_boundary(i) {
                    i += 1;
                }
                tokens.push(Token { kind: TokenKind::Symbol, text: &sql[start..i], start, end: i });
            }
        }
    }
    tokens
}

/// One statement level: a subquery body, one leg of a set operation, or one
/// `;`-separated statement.
#[derive(Debug)]
struct Segment {
    /// Indices of the tokens at this level, including the parentheses that
    /// open and close nested levels
    tokens: Vec<usize>,
    /// Byte offset where the level ends
    end: usize,
}

fn segments(tokens: &[Token<'_>], text_len: usize) -> Vec<Segment> {
    let mut segments = vec![Segment { tokens: Vec::new(), end: text_len }];
    // Stack of open levels, innermost last
    let mut open = vec![0usize];

    for (i, token) in tokens.iter().enumerate() {
        let current = open.last().copied().unwrap_or(0);
        if token.is_symbol("(") {
            segments[current].tokens.push(i);
            segments.push(Segment { tokens: Vec::new(), end: text_len });
            open.push(segments.len() - 1);
        } else if token.is_symbol(")") {
            if open.len() > 1 {
                open.pop();
                segments[current].end = token.start;
            }
            let outer = open.last().copied().unwrap_or(0);
            segments[outer].tokens.push(i);
        } else if token.is_symbol(";") || SET_OPERATORS.iter().any(|k| token.is_keyword(k)) {
            segments[current].end = token.start;
            segments.push(Segment { tokens: Vec::new(), end: text_len });
            if let Some(top) = open.last_mut() {
                *top = segments.len() - 1;
            }
        } else {
            segments[current].tokens.push(i);
        }
    }
    segments
}

/// A table named in a FROM list, JOIN, USING list or UPDATE target
#[derive(Debug)]
struct TableRef<'a> {
    /// Unqualified table name
    name: &'a str,
    /// Alias, or the name as written (schema included), for qualifying columns
    qualifier: &'a str,
    /// What a qualified column reference uses to name this table
    qualifier_ident: &'a str,
    /// Tenant column when the table is scoped
    column: Option<&'static str>,
    /// Position in the level of the last token belonging to the reference
    last: usize,
}

fn table_refs<'a>(text: &'a str, tokens: &[Token<'a>], level: &[usize], registry: &ScopeRegistry) -> Vec<TableRef<'a>> {
    let mut refs = Vec::new();
    let mut p = 0;
    while p < level.len() {
        let token = &tokens[level[p]];
        let is_list = token.is_keyword("FROM") || token.is_keyword("USING");
        // FOR UPDATE, FOR NO KEY UPDATE and DO UPDATE are not targets
        let is_update_target = token.is_keyword("UPDATE")
            && !(p > 0 && ["FOR", "KEY", "DO"].iter().any(|k| tokens[level[p - 1]].is_keyword(k)));
        if !(is_list || is_update_target || token.is_keyword("JOIN")) {
            p += 1;
            continue;
        }

        let mut q = p + 1;
        loop {
            let (table, next) = table_ref(text, tokens, level, q, registry);
            refs.extend(table);
            q = next;
            if is_list && level.get(q).is_some_and(|&i| tokens[i].is_symbol(",")) {
                q += 1;
                continue;
            }
            break;
        }
        p = q.max(p + 1);
    }
    refs
}

/// Parse one table reference starting at level position `q`. Returns the
/// reference (`None` for derived tables and function calls) and the position
/// after it.
fn table_ref<'a>(
    text: &'a str,
    tokens: &[Token<'a>],
    level: &[usize],
    mut q: usize,
    registry: &ScopeRegistry,
) -> (Option<TableRef<'a>>, usize) {
    let at = |p: usize| level.get(p).map(|&i| tokens[i]);

    while at(q).is_some_and(|t| t.is_keyword("ONLY") || t.is_keyword("LATERAL")) {
        q += 1;
    }

    let Some(first) = at(q) else {
        return (None, q);
    };
    if first.is_symbol("(") {
        let after = skip_group(tokens, level, q);
        return (None, alias(text, tokens, level, after).1);
    }
    if !first.is_name() {
        return (None, q);
    }

    // schema-qualified: "public"."products"
    while at(q + 1).is_some_and(|t| t.is_symbol(".")) && at(q + 2).is_some_and(|t| t.is_name()) {
        q += 2;
    }
    let Some(name_token) = at(q) else {
        return (None, q);
    };
    let Some(name) = name_token.ident() else {
        return (None, q + 1);
    };
    q += 1;

    // Set-returning function, not a table
    if at(q).is_some_and(|t| t.is_symbol("(")) {
        let after = skip_group(tokens, level, q);
        return (None, alias(text, tokens, level, after).1);
    }

    let (alias_name, next) = alias(text, tokens, level, q);
    let (qualifier, qualifier_ident) = alias_name.unwrap_or((&text[first.start..name_token.end], name));
    (
        Some(TableRef {
            name,
            qualifier,
            qualifier_ident,
            column: registry.scoped_table(name),
            last: next - 1,
        }),
        next,
    )
}

/// Optional `[AS] alias` at level position `q`: the alias as written and its
/// identifier, plus the position after it
fn alias<'a>(text: &'a str, tokens: &[Token<'a>], level: &[usize], mut q: usize) -> (Option<(&'a str, &'a str)>, usize) {
    let at = |p: usize| level.get(p).map(|&i| tokens[i]);
    if at(q).is_some_and(|t| t.is_keyword("AS")) {
        q += 1;
    }
    match at(q) {
        Some(t) if t.is_name() => match t.ident() {
            Some(ident) => (Some((&text[t.start..t.end], ident)), q + 1),
            None => (None, q),
        },
        _ => (None, q),
    }
}

/// Position after the `)` closing the group opened at level position `q`.
/// Nested tokens live in their own level, so the next `)` here closes it.
fn skip_group(tokens: &[Token<'_>], level: &[usize], q: usize) -> usize {
    level
        .iter()
        .enumerate()
        .skip(q + 1)
        .find(|(_, i)| tokens[**i].is_symbol(")"))
        .map(|(p, _)| p + 1)
        .unwrap_or(level.len())
}

enum Scoping {
    NotScoped,
    /// Every scoped table already has a tenant predicate
    Present,
    /// Text insertions as `(byte offset, text)`
    Edits(Vec<(usize, String)>),
}

/// Tenant predicates for one statement level. Columns are qualified when the
/// level reads from more than one table.
fn scope_segment(
    text: &str,
    tokens: &[Token<'_>],
    segment: &Segment,
    refs: &[TableRef<'_>],
    placeholder: &str,
) -> Scoping {
    let scoped: Vec<(&TableRef<'_>, &'static str)> =
        refs.iter().filter_map(|r| r.column.map(|column| (r, column))).collect();
    let Some(last_ref) = refs.iter().map(|r| r.last).max() else {
        return Scoping::NotScoped;
    };
    if scoped.is_empty() {
        return Scoping::NotScoped;
    }
    let qualify = refs.len() > 1;
    let level = &segment.tokens;

    let where_pos = level.iter().position(|&i| tokens[i].is_keyword("WHERE"));
    let search_from = where_pos.unwrap_or(last_ref);
    let tail_pos = level
        .iter()
        .enumerate()
        .skip(search_from + 1)
        .find(|(_, i)| TRAILING_KEYWORDS.iter().any(|k| tokens[**i].is_keyword(k)))
        .map(|(p, _)| p);
    let tail = tail_pos.map(|p| tokens[level[p]].start).unwrap_or(segment.end);

    let condition: &[usize] = match where_pos {
        Some(w) => &level[w + 1..tail_pos.unwrap_or(level.len())],
        None => &[],
    };
    let missing: Vec<String> = scoped
        .iter()
        .filter(|(table, column)| !has_predicate(tokens, condition, table, column, qualify))
        .map(|(table, column)| {
            if qualify {
                format!("{}.\"{}\" = {}", table.qualifier, column, placeholder)
            } else {
                format!("\"{}\" = {}", column, placeholder)
            }
        })
        .collect();
    if missing.is_empty() {
        return Scoping::Present;
    }
    let predicate = missing.join(" AND ");

    let edits = match where_pos {
        None => vec![(text[..tail].trim_end().len(), format!(" WHERE {}", predicate))],
        Some(w) => {
            let where_end = tokens[level[w]].end;
            let existing = &text[where_end..tail];
            let condition_start = where_end + (existing.len() - existing.trim_start().len());
            let condition_end = where_end + existing.trim_end().len();
            if condition_start >= condition_end {
                vec![(where_end, format!(" {}", predicate))]
            } else {
                vec![
                    (condition_start, format!("{} AND (", predicate)),
                    (condition_end, ")".to_string()),
                ]
            }
        }
    };
    Scoping::Edits(edits)
}

/// `column =` (or `qualifier.column =` when qualified) somewhere in the
/// level's own WHERE tokens
fn has_predicate(tokens: &[Token<'_>], condition: &[usize], table: &TableRef<'_>, column: &str, qualify: bool) -> bool {
    let named = |t: &Token<'_>, name: &str| t.ident().is_some_and(|ident| ident.eq_ignore_ascii_case(name));
    (0..condition.len().saturating_sub(1)).any(|k| {
        let names_column = named(&tokens[condition[k]], column) && tokens[condition[k + 1]].is_symbol("=");
        let qualified = k >= 2
            && tokens[condition[k - 1]].is_symbol(".")
            && named(&tokens[condition[k - 2]], table.qualifier_ident);
        names_column && (!qualify || qualified)
    })
}
