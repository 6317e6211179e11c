//! Search normalisation
//!
//! Turns a caller's [`SearchRequest`] into the query string and pagination
//! a store or the terminology server expects. Normalising a request whose
//! query is already the output of a previous normalisation yields the same
//! query string.

use termgate_core::{EntityKind, NormalizedQuery, PaginationSpec, SearchRequest};

/// Default filter applied to searches restricted to active records
pub const ACTIVE_CLAUSE: &str = "active:true";

const OPERATORS: &[&str] = &["AND", "OR", "NOT", "TO", "&&", "||", "!"];

/// Characters that mark a term as qualified, wildcarded or otherwise using
/// query syntax the expander must not touch
const QUERY_SYNTAX: &[char] = &[
    ':', '*', '?', '[', ']', '{', '}', '~', '^', '\\', '/',
];

/// Normalise a search request for the given entity kind
///
/// - The query starts from the caller's text, trimmed, or empty.
/// - Bare terms are expanded to prefix wildcards over the kind's
///   [`wildcard_fields`](EntityKind::wildcard_fields).
/// - With `active_only`, `AND active:true` is appended unless the query
///   already ends with that conjunction. A query with a top-level `OR` is
///   grouped first so the filter applies to every alternative.
/// - Offset and limit pass through unset; sort is descending unless the
///   caller asks otherwise.
pub fn normalize(request: &SearchRequest, kind: EntityKind) -> NormalizedQuery {
    let query = request.query.as_deref().map(str::trim).unwrap_or_default();
    let mut query_string = expand_wildcards(query, kind.wildcard_fields());

    if request.active_only == Some(true) && !ends_with_active_clause(&query_string) {
        query_string = if query_string.is_empty() {
            ACTIVE_CLAUSE.to_string()
        } else if has_top_level_or(&query_string) {
            format!("({}) AND {}", query_string, ACTIVE_CLAUSE)
        } else {
            format!("{} AND {}", query_string, ACTIVE_CLAUSE)
        };
    }

    NormalizedQuery {
        query_string,
        pagination: PaginationSpec {
            offset: request.offset,
            limit: request.limit,
            sort_field: request.sort_field.clone(),
            ascending: request.ascending.unwrap_or(false),
        },
    }
}

/// Expand every bare term in `query` into a prefix match over `fields`
///
/// Everything except the expanded terms is copied through unchanged,
/// whitespace and parentheses included.
pub fn expand_wildcards(query: &str, fields: &[&str]) -> String {
    if fields.is_empty() || query.is_empty() {
        return query.to_string();
    }

    let mut expanded = String::with_capacity(query.len() * (fields.len() + 1));
    let mut copied_up_to = 0;

    for token in tokenize(query) {
        if token.kind != TokenKind::Term {
            continue;
        }
        let term = &query[token.start..token.end];
        if !is_bare_term(term) {
            continue;
        }

        expanded.push_str(&query[copied_up_to..token.start]);
        expanded.push_str(&expand_term(term, fields));
        copied_up_to = token.end;
    }

    expanded.push_str(&query[copied_up_to..]);
    expanded
}

fn expand_term(term: &str, fields: &[&str]) -> String {
    match fields {
        [field] => format!("{}:{}*", field, term),
        _ => {
            let alternatives: Vec<String> = fields
                .iter()
                .map(|field| format!("{}:{}*", field, term))
                .collect();
            format!("({})", alternatives.join(" OR "))
        }
    }
}

fn is_bare_term(term: &str) -> bool {
    !OPERATORS.contains(&term)
        && !term.starts_with(['-', '+', '!'])
        && !term.contains(QUERY_SYNTAX)
}

/// Items outside any group, in order; a whole group or phrase is `None`
fn top_level_items(query: &str) -> Vec<Option<&str>> {
    let mut depth = 0usize;
    let mut items = Vec::new();

    for token in tokenize(query) {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    items.push(None);
                }
            }
            TokenKind::Phrase if depth == 0 => items.push(None),
            TokenKind::Term if depth == 0 => items.push(Some(&query[token.start..token.end])),
            _ => {}
        }
    }

    items
}

fn has_top_level_or(query: &str) -> bool {
    top_level_items(query)
        .iter()
        .any(|item| matches!(item, Some("OR" | "||")))
}

/// Whether the query is `active:true` alone or a conjunction ending in
/// `AND active:true` with no top-level `OR`
fn ends_with_active_clause(query: &str) -> bool {
    if has_top_level_or(query) {
        return false;
    }

    match top_level_items(query).as_slice() {
        [Some(only)] => *only == ACTIVE_CLAUSE,
        [.., Some("AND" | "&&"), Some(last)] => *last == ACTIVE_CLAUSE,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Open,
    Close,
    Phrase,
    Term,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

/// Split a query into parentheses, quoted phrases and whitespace-separated terms
fn tokenize(query: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = query.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' => {
                chars.next();
                tokens.push(Token {
                    kind: if c == '(' {
                        TokenKind::Open
                    } else {
                        TokenKind::Close
                    },
                    start,
                    end: start + 1,
                });
            }
            '"' => {
                chars.next();
                // An unterminated phrase runs to the end of the query
                let mut end = query.len();
                for (i, c) in chars.by_ref() {
                    if c == '"' {
                        end = i + 1;
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Phrase,
                    start,
                    end,
                });
            }
            _ => {
                let mut end = query.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '"') {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Term,
                    start,
                    end,
                });
            }
        }
    }

    tokens
}
