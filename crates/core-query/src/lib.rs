//! SQL text generation for the syslog record store.
//!
//! A [`Filter`] captures the user's level/facility/host/program selection and
//! renders range queries over the `logs` table. Host and program filters are
//! whitespace-separated token expressions: a leading `!` negates a token, `*`
//! is a wildcard (mapped to SQL `LIKE` with `%`), positive tokens are
//! OR-combined and parenthesized, negative tokens are AND-combined, and a
//! mixed expression ANDs the positive group with the negative conjuncts.
//!
//! SQLite does not accept placeholders everywhere these clauses go (and the
//! anchor/limit values are internally generated integers), so operands are
//! interpolated with single quotes doubled.

use chrono::NaiveDateTime;

const SELECT_COLUMNS: &str =
    "SELECT id, facility_num, level_num, host, datetime, program, pid, message FROM logs";

/// Filter configuration for the record store. `None` means "no restriction";
/// `level` is an inclusive ceiling on `level_num` (severities at or above
/// that urgency pass).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub level: Option<u8>,
    pub facility: Option<u8>,
    pub host: Option<String>,
    pub program: Option<String>,
}

impl Filter {
    /// Range query in either direction from an anchor id. `anchor == None`
    /// starts from the newest record (callers pass `descending = true`).
    pub fn select(&self, anchor: Option<u64>, descending: bool, limit: usize) -> String {
        let mut predicates = Vec::new();
        if let Some(anchor) = anchor {
            if descending {
                predicates.push(format!("id < {anchor}"));
            } else {
                predicates.push(format!("id > {anchor}"));
            }
        }
        self.push_predicates(&mut predicates);
        render(
            &predicates,
            if descending { "DESC" } else { "ASC" },
            limit,
        )
    }

    /// Anchorless descending query bounded inclusively by `origin`; used
    /// after a timestamp jump so "newest" becomes "newest at or before the
    /// jump target".
    pub fn select_from_origin(&self, origin: u64, limit: usize) -> String {
        let mut predicates = vec![format!("id <= {origin}")];
        self.push_predicates(&mut predicates);
        render(&predicates, "DESC", limit)
    }

    /// Resolves a timestamp to the newest matching record id at or before it.
    pub fn newest_id_at(&self, timestamp: NaiveDateTime) -> String {
        let mut predicates = vec![format!(
            "datetime <= '{}'",
            timestamp.format("%Y-%m-%d %H:%M:%S")
        )];
        self.push_predicates(&mut predicates);
        format!(
            "SELECT id FROM logs WHERE {} ORDER BY id DESC LIMIT 1",
            predicates.join(" AND ")
        )
    }

    /// In-memory mirror of the SQL predicates, for sources that are not SQL
    /// backed. Same semantics: level ceiling, facility equality, token
    /// expressions with wildcard and negation.
    pub fn matches(&self, record: &core_record::Record) -> bool {
        if let Some(level) = self.level
            && record.level.code() > level
        {
            return false;
        }
        if let Some(facility) = self.facility
            && record.facility.code() != facility
        {
            return false;
        }
        if let Some(tokens) = self.program.as_deref()
            && !tokens_match(tokens, &record.program)
        {
            return false;
        }
        if let Some(tokens) = self.host.as_deref()
            && !tokens_match(tokens, &record.host)
        {
            return false;
        }
        true
    }

    fn push_predicates(&self, predicates: &mut Vec<String>) {
        if let Some(level) = self.level {
            predicates.push(format!("level_num <= {level}"));
        }
        if let Some(facility) = self.facility {
            predicates.push(format!("facility_num = {facility}"));
        }
        if let Some(clause) = self
            .program
            .as_deref()
            .and_then(|tokens| token_predicates("program", tokens))
        {
            predicates.push(clause);
        }
        if let Some(clause) = self
            .host
            .as_deref()
            .and_then(|tokens| token_predicates("host", tokens))
        {
            predicates.push(clause);
        }
    }
}

fn render(predicates: &[String], order: &str, limit: usize) -> String {
    if predicates.is_empty() {
        format!("{SELECT_COLUMNS} ORDER BY id {order} LIMIT {limit}")
    } else {
        format!(
            "{SELECT_COLUMNS} WHERE {} ORDER BY id {order} LIMIT {limit}",
            predicates.join(" AND ")
        )
    }
}

/// One WHERE conjunct for a token expression over `column`, or `None` when
/// the expression is empty.
fn token_predicates(column: &str, tokens: &str) -> Option<String> {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for token in tokens.split_whitespace() {
        let (negated, operand) = match token.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if operand.is_empty() {
            continue;
        }
        let escaped = operand.replace('\'', "''");
        let comparison = if escaped.contains('*') {
            let pattern = escaped.replace('*', "%");
            if negated {
                format!("{column} NOT LIKE '{pattern}'")
            } else {
                format!("{column} LIKE '{pattern}'")
            }
        } else if negated {
            format!("{column} <> '{escaped}'")
        } else {
            format!("{column} = '{escaped}'")
        };
        if negated {
            negative.push(comparison);
        } else {
            positive.push(comparison);
        }
    }

    let mut parts = Vec::new();
    if !positive.is_empty() {
        parts.push(format!("({})", positive.join(" OR ")));
    }
    parts.extend(negative);
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

/// Token-expression evaluation against a concrete value: positives
/// OR-combined, negatives AND-combined, `*` wildcard. An expression with no
/// positive tokens only excludes.
fn tokens_match(tokens: &str, value: &str) -> bool {
    let mut has_positive = false;
    let mut positive_hit = false;
    for token in tokens.split_whitespace() {
        let (negated, operand) = match token.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if operand.is_empty() {
            continue;
        }
        if negated {
            if glob_match(operand, value) {
                return false;
            }
        } else {
            has_positive = true;
            if glob_match(operand, value) {
                positive_hit = true;
            }
        }
    }
    !has_positive || positive_hit
}

/// Minimal `*`-only glob over byte strings (the same class SQL `LIKE` with
/// `%` covers here).
fn glob_match(pattern: &str, value: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == value;
    }
    let mut rest = value;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(at) => rest = &rest[at + segment.len()..],
                None => return false,
            }
        }
    }
    true
}
