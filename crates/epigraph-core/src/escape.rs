//! Reserved-identifier escaping for replayed statements.
//!
//! Files occasionally declare schema elements named after query-language
//! reserved words (a tag literally called `TAG`). Before execution every
//! token-boundary occurrence of such an identifier is wrapped in
//! backticks. This is a textual rewrite, not a parser: everything else in
//! the statement is preserved byte for byte, and re-escaping an already
//! escaped statement changes nothing.

/// Reserved words of the graph query language that files have been seen
/// to collide with.
pub const RESERVED_WORDS: &[&str] = &[
    "GO", "AS", "TO", "USE", "SET", "FROM", "WHERE", "MATCH", "INSERT", "YIELD", "RETURN",
    "CREATE", "DESCRIBE", "DROP", "REMOVE", "REBUILD", "INDEX", "TAG", "EDGE", "VERTEX", "EDGES",
    "UPDATE", "UPSERT", "WHEN", "DELETE", "FIND", "PATH", "LOOKUP", "SHOW", "FETCH", "PROP",
    "DISTINCT", "ORDER", "BY", "GROUP", "LIMIT", "OFFSET", "OVER", "STRING", "INT", "DOUBLE",
    "BOOL", "TIMESTAMP", "DATE", "TIME", "DATETIME", "NULL", "TRUE", "FALSE", "NOT", "EXISTS",
    "IF", "ON", "SPACE",
];

/// Whether `ident` collides with a reserved word (case-insensitive).
#[must_use]
pub fn is_reserved(ident: &str) -> bool {
    RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(ident))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn strip_arg_list(token: &str) -> &str {
    token
        .split_once('(')
        .map_or(token, |(name, _)| name)
        .trim_end_matches(';')
}

/// The schema-element name a `CREATE TAG` / `CREATE EDGE` statement
/// declares, or the `ON` target of a `CREATE ... INDEX` statement. `None`
/// for anything else.
#[must_use]
pub fn declared_identifier(stmt: &str) -> Option<&str> {
    let tokens: Vec<&str> = stmt.split_whitespace().collect();
    let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();

    let create = upper.iter().position(|t| t == "CREATE")?;
    let kind = tokens.get(create + 1)?;
    if !kind.eq_ignore_ascii_case("TAG") && !kind.eq_ignore_ascii_case("EDGE") {
        return None;
    }

    // CREATE TAG INDEX ... ON <target>(fields)
    if tokens
        .get(create + 2)
        .is_some_and(|t| t.eq_ignore_ascii_case("INDEX"))
    {
        let on = upper.iter().position(|t| t == "ON")?;
        return tokens.get(on + 1).map(|t| strip_arg_list(t));
    }

    // CREATE TAG [IF NOT EXISTS] <name>(fields)
    let mut at = create + 2;
    if tokens.get(at).is_some_and(|t| t.eq_ignore_ascii_case("IF")) {
        at += 3; // IF NOT EXISTS
    }
    tokens.get(at).map(|t| strip_arg_list(t))
}

/// The reserved identifier a schema statement declares, if any.
#[must_use]
pub fn reserved_in_statement(stmt: &str) -> Option<&str> {
    declared_identifier(stmt).filter(|ident| is_reserved(ident))
}

/// Wrap every token-boundary occurrence of `ident` in backticks.
///
/// A boundary is the start of the statement, whitespace, or a quote
/// character before the occurrence, with the occurrence not continuing
/// into a longer identifier. Occurrences already adjacent to a backtick
/// are left alone, which makes the rewrite idempotent.
#[must_use]
pub fn escape_identifier(stmt: &str, ident: &str) -> String {
    if ident.is_empty() {
        return stmt.to_string();
    }

    let mut out = String::with_capacity(stmt.len() + 8);
    let bytes = stmt.as_bytes();
    let ident_len = ident.len();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &stmt[i..];
        if rest.starts_with(ident) {
            let prev = stmt[..i].chars().next_back();
            let next = rest[ident_len..].chars().next();

            let boundary_before =
                prev.is_none_or(|c| c.is_whitespace() || c == '\'' || c == '"');
            let boundary_after = next.is_none_or(|c| !is_ident_char(c));
            let already_escaped = prev == Some('`') || next == Some('`');

            if boundary_before && boundary_after && !already_escaped {
                out.push('`');
                out.push_str(ident);
                out.push('`');
                i += ident_len;
                continue;
            }
        }
        let c = rest.chars().next().expect("in-bounds char");
        out.push(c);
        i += c.len_utf8();
    }
    out
}
