//! Declared schema parsing and drift planning

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::DeployError;

/// Words that open a table constraint rather than a column definition
const CONSTRAINT_KEYWORDS: &[&str] = &["CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "CHECK"];

/// Statement heads that accept `IF NOT EXISTS`
const IDEMPOTENT_HEADS: &[&[&str]] = &[
    &["CREATE", "TABLE"],
    &["CREATE", "UNIQUE", "INDEX"],
    &["CREATE", "INDEX"],
    &["CREATE", "VIEW"],
    &["CREATE", "TRIGGER"],
];

/// Live tables and their columns, as introspected
pub type LiveSchema = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredTable {
    pub name: String,
    pub columns: Vec<String>,
}

/// Tables and statements of a schema file
#[derive(Debug, Clone, Default)]
pub struct DeclaredSchema {
    pub tables: Vec<DeclaredTable>,
    statements: Vec<String>,
}

/// How a declared table differs from the live one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    Missing,
    MissingColumns(Vec<String>),
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDrift {
    pub table: String,
    pub drift: Drift,
}

impl DeclaredSchema {
    pub fn parse(sql: &str) -> Result<Self, DeployError> {
        let statements = split_statements(&strip_comments(sql));
        let mut tables = Vec::new();

        for statement in &statements {
            if let Some(table) = parse_create_table(statement)? {
                tables.push(table);
            }
        }

        Ok(Self { tables, statements })
    }

    pub fn table(&self, name: &str) -> Option<&DeclaredTable> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Compare every declared table against the live database
    pub fn plan(&self, live: &LiveSchema) -> Vec<TableDrift> {
        let live: BTreeMap<String, BTreeSet<String>> = live
            .iter()
            .map(|(table, columns)| {
                (
                    table.to_lowercase(),
                    columns.iter().map(|c| c.to_lowercase()).collect(),
                )
            })
            .collect();

        self.tables
            .iter()
            .map(|table| {
                let drift = match live.get(&table.name.to_lowercase()) {
                    None => Drift::Missing,
                    Some(columns) => {
                        let missing: Vec<String> = table
                            .columns
                            .iter()
                            .filter(|c| !columns.contains(&c.to_lowercase()))
                            .cloned()
                            .collect();
                        if missing.is_empty() {
                            Drift::UpToDate
                        } else {
                            Drift::MissingColumns(missing)
                        }
                    }
                };
                TableDrift {
                    table: table.name.clone(),
                    drift,
                }
            })
            .collect()
    }

    /// The schema rewritten so it can be applied to a populated database
    pub fn idempotent_sql(&self) -> String {
        let mut sql = String::new();
        for statement in &self.statements {
            sql.push_str(&with_if_not_exists(statement));
            sql.push_str(";\n");
        }
        sql
    }
}

/// Quote an identifier for SQL text
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('\'', _) => {
                in_string = true;
                out.push(c);
            }
            ('-', Some('-')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Split on top-level semicolons, keeping trigger bodies whole
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;

    for c in sql.chars() {
        if c == '\'' {
            in_string = !in_string;
        }
        if c == ';' && !in_string && !inside_trigger_body(&current) {
            push_statement(&mut statements, &current);
            current.clear();
        } else {
            current.push(c);
        }
    }
    push_statement(&mut statements, &current);
    statements
}

fn inside_trigger_body(current: &str) -> bool {
    match_keywords(current, &["CREATE", "TRIGGER"]).is_some()
        && !current.trim_end().to_ascii_uppercase().ends_with("END")
}

fn push_statement(statements: &mut Vec<String>, statement: &str) {
    let statement = statement.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
}

/// Byte offset just past `keywords` at the start of `text`, matched
/// case-insensitively across any whitespace
fn match_keywords(text: &str, keywords: &[&str]) -> Option<usize> {
    let mut offset = 0;
    for keyword in keywords {
        let rest = &text[offset..];
        let trimmed = rest.trim_start();
        offset += rest.len() - trimmed.len();

        let word_len = trimmed
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        if word_len == 0 || !trimmed[..word_len].eq_ignore_ascii_case(keyword) {
            return None;
        }
        offset += word_len;
    }
    Some(offset)
}

fn with_if_not_exists(statement: &str) -> String {
    for head in IDEMPOTENT_HEADS {
        if let Some(end) = match_keywords(statement, head) {
            if match_keywords(&statement[end..], &["IF", "NOT", "EXISTS"]).is_some() {
                return statement.to_string();
            }
            return format!("{} IF NOT EXISTS{}", &statement[..end], &statement[end..]);
        }
    }
    statement.to_string()
}

fn parse_create_table(statement: &str) -> Result<Option<DeclaredTable>, DeployError> {
    let Some(mut offset) = match_keywords(statement, &["CREATE", "TABLE"]) else {
        return Ok(None);
    };
    if let Some(extra) = match_keywords(&statement[offset..], &["IF", "NOT", "EXISTS"]) {
        offset += extra;
    }

    let rest = statement[offset..].trim_start();
    let (name, rest) = read_identifier(rest)
        .ok_or_else(|| DeployError::SchemaError(format!("table name missing in `{}`", head_of(statement))))?;

    let (Some(open), Some(close)) = (rest.find('('), rest.rfind(')')) else {
        return Err(DeployError::SchemaError(format!(
            "column list missing for table {}",
            name
        )));
    };
    if close < open {
        return Err(DeployError::SchemaError(format!("unbalanced parentheses in table {}", name)));
    }

    let columns = split_top_level(&rest[open + 1..close])
        .into_iter()
        .filter_map(|definition| {
            let first = definition.split_whitespace().next()?;
            if CONSTRAINT_KEYWORDS.iter().any(|k| first.eq_ignore_ascii_case(k)) {
                return None;
            }
            read_identifier(first).map(|(ident, _)| ident)
        })
        .collect::<Vec<_>>();

    if columns.is_empty() {
        return Err(DeployError::SchemaError(format!("table {} declares no columns", name)));
    }

    Ok(Some(DeclaredTable { name, columns }))
}

/// Read a possibly quoted identifier, dropping any schema qualifier
fn read_identifier(text: &str) -> Option<(String, &str)> {
    let (ident, rest) = match text.chars().next()? {
        open @ ('"' | '`' | '[') => {
            let close = if open == '[' { ']' } else { open };
            let end = text[1..].find(close)? + 1;
            (&text[1..end], &text[end + 1..])
        }
        _ => {
            let end = text
                .find(|c: char| c.is_whitespace() || c == '(' || c == ',')
                .unwrap_or(text.len());
            (&text[..end], &text[end..])
        }
    };

    let ident = ident.rsplit('.').next().unwrap_or(ident);
    (!ident.is_empty()).then(|| (ident.to_string(), rest))
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn head_of(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}
