//! Clause-shape detection on dry-run SQL.
//!
//! The base query is rendered without executing it and scanned for UNION,
//! DISTINCT, GROUP BY and HAVING. Quoted literals and identifiers are masked
//! before matching so keywords inside values do not count, and field text is
//! sliced from the original SQL so quoted identifiers keep their case.

use tracing::debug;

use crate::config::{Config, ShapeDetection};

/// Clause shapes found in a rendered query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryShape {
    pub union: bool,
    pub distinct: bool,
    pub group_by: Vec<String>,
    pub having: Vec<String>,
}

impl QueryShape {
    /// Fold this shape into `config` according to `config.shape_detection`.
    ///
    /// `Authoritative` overwrites every shape that was detected. `Fallback`
    /// only fills flags and lists the caller left unset. Shapes that were not
    /// detected never clear declared ones.
    pub fn apply_to(self, config: &mut Config) {
        let authoritative = match config.shape_detection {
            ShapeDetection::Off => return,
            ShapeDetection::Authoritative => true,
            ShapeDetection::Fallback => false,
        };

        config.union |= self.union;
        config.distinct |= self.distinct;
        if !self.group_by.is_empty() && (authoritative || config.group_by.is_empty()) {
            config.group_by = self.group_by;
        }
        if !self.having.is_empty() && (authoritative || config.having.is_empty()) {
            config.having = self.having;
        }
    }
}

/// Scan rendered SQL for complex clauses.
pub fn detect_shape(sql: &str) -> QueryShape {
    let masked = mask_quoted(sql).to_ascii_uppercase();

    let mut shape = QueryShape {
        union: find_keyword(&masked, "UNION", 0).is_some(),
        distinct: find_keyword(&masked, "DISTINCT", 0).is_some(),
        ..QueryShape::default()
    };

    if let Some((_, start)) = find_keyword(&masked, "GROUP BY", 0) {
        let end = clause_end(&masked, start, &["HAVING", "ORDER BY", "LIMIT", "OFFSET", "UNION"]);
        shape.group_by = extract_fields(&sql[start..end]);
    }

    if let Some((_, start)) = find_keyword(&masked, "HAVING", 0) {
        let end = clause_end(&masked, start, &["ORDER BY", "LIMIT", "OFFSET", "UNION"]);
        shape.having = extract_fields(&sql[start..end]);
    }

    debug!(?shape, "detected query shape");
    shape
}

/// Split a clause body on top-level commas into trimmed field expressions,
/// dropping balanced outer parentheses from each.
pub fn extract_fields(clause: &str) -> Vec<String> {
    split_top_level(clause)
        .into_iter()
        .map(|field| strip_outer_parens(field.trim()).trim().to_string())
        .filter(|field| !field.is_empty())
        .collect()
}

/// Split on commas outside parentheses and quotes.
pub(crate) fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn strip_outer_parens(mut text: &str) -> &str {
    while text.starts_with('(') && text.ends_with(')') && closes_at_end(text) {
        text = text[1..text.len() - 1].trim();
    }
    text
}

/// Whether the opening parenthesis at index 0 is closed by the last byte.
fn closes_at_end(text: &str) -> bool {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Replace the contents of quoted literals and identifiers with spaces,
/// keeping every byte offset intact.
fn mask_quoted(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;

    while i < bytes.len() {
        let quote = bytes[i];
        if !matches!(quote, b'\'' | b'"' | b'`') {
            i += 1;
            continue;
        }
        // E'...' strings escape with backslashes.
        let backslash = quote == b'\'' && i > 0 && matches!(bytes[i - 1], b'E' | b'e');
        i += 1;
        while i < bytes.len() {
            let b = bytes[i];
            if backslash && b == b'\\' && i + 1 < bytes.len() {
                out[i] = b' ';
                out[i + 1] = b' ';
                i += 2;
                continue;
            }
            if b == quote {
                // Doubled quote is an escaped quote.
                if bytes.get(i + 1) == Some(&quote) {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 2;
                    continue;
                }
                break;
            }
            out[i] = b' ';
            i += 1;
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Find `keyword` (words separated by any whitespace) at word boundaries in
/// upper-cased `haystack`, starting at `from`. Returns `(start, end)`.
fn find_keyword(haystack: &str, keyword: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = haystack.as_bytes();
    let words: Vec<&str> = keyword.split_whitespace().collect();
    let first = words.first()?.as_bytes();

    let mut i = from;
    while i + first.len() <= bytes.len() {
        if bytes[i..].starts_with(first) && (i == 0 || !is_word_byte(bytes[i - 1])) {
            if let Some(end) = match_rest(bytes, i + first.len(), &words[1..]) {
                if end == bytes.len() || !is_word_byte(bytes[end]) {
                    return Some((i, end));
                }
            }
        }
        i += 1;
    }
    None
}

fn match_rest(bytes: &[u8], mut pos: usize, words: &[&str]) -> Option<usize> {
    for word in words {
        let gap_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos == gap_start || !bytes[pos..].starts_with(word.as_bytes()) {
            return None;
        }
        pos += word.len();
    }
    Some(pos)
}

/// End of a clause body starting at `start`: the first terminator keyword,
/// an unmatched closing parenthesis, or the end of the text.
fn clause_end(masked: &str, start: usize, terminators: &[&str]) -> usize {
    let mut end = masked.len();
    for terminator in terminators {
        if let Some((at, _)) = find_keyword(masked, terminator, start) {
            end = end.min(at);
        }
    }

    let mut depth = 0i32;
    for (offset, b) in masked.as_bytes()[start..end].iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return start + offset;
                }
            }
            _ => {}
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_query_has_no_shape() {
        assert_eq!(detect_shape(r#"SELECT * FROM "users""#), QueryShape::default());
    }

    #[test]
    fn group_by_and_having_are_extracted() {
        let shape = detect_shape(
            r#"SELECT "age", COUNT(*) FROM "users" GROUP BY "age", "team" HAVING COUNT(*) > 1 ORDER BY "age" ASC"#,
        );
        assert_eq!(shape.group_by, vec![r#""age""#, r#""team""#]);
        assert_eq!(shape.having, vec!["COUNT(*) > 1"]);
        assert!(!shape.union);
    }

    #[test]
    fn keywords_inside_literals_are_ignored() {
        let shape = detect_shape(
            r#"SELECT * FROM "users" WHERE "bio" LIKE '%union of distinct group by%'"#,
        );
        assert_eq!(shape, QueryShape::default());

        let escaped = detect_shape(r#"SELECT * FROM "t" WHERE "x" = E'it\'s a UNION'"#);
        assert!(!escaped.union);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let shape = detect_shape("select distinct name from users group   by lower(name) union select 'x'");
        assert!(shape.union);
        assert!(shape.distinct);
        assert_eq!(shape.group_by, vec!["lower(name)"]);
    }

    #[test]
    fn identifiers_containing_keywords_do_not_match() {
        let shape = detect_shape(r#"SELECT "reunion", distinctive FROM groups"#);
        assert_eq!(shape, QueryShape::default());
    }

    #[test]
    fn group_by_inside_subquery_ends_at_its_parenthesis() {
        let shape = detect_shape(
            r#"SELECT * FROM (SELECT "team" FROM "users" GROUP BY "team") AS "t" WHERE "team" <> 'x'"#,
        );
        assert_eq!(shape.group_by, vec![r#""team""#]);
    }

    #[test]
    fn fields_split_on_top_level_commas_only() {
        assert_eq!(
            extract_fields(" COALESCE(a, b), (c) , ((d)) "),
            vec!["COALESCE(a, b)", "c", "d"]
        );
        assert_eq!(extract_fields("(a) + (b)"), vec!["(a) + (b)"]);
        assert!(extract_fields("   ").is_empty());
    }

    #[test]
    fn authoritative_overwrites_detected_shapes() {
        let mut config = Config {
            group_by: vec!["declared".into()],
            having: vec!["COUNT(*) > 5".into()],
            ..Config::default()
        };
        QueryShape {
            group_by: vec!["detected".into()],
            ..QueryShape::default()
        }
        .apply_to(&mut config);

        assert_eq!(config.group_by, vec!["detected"]);
        assert_eq!(config.having, vec!["COUNT(*) > 5"]);
    }

    #[test]
    fn fallback_keeps_declared_shapes() {
        let mut config = Config {
            group_by: vec!["declared".into()],
            shape_detection: ShapeDetection::Fallback,
            ..Config::default()
        };
        QueryShape {
            union: true,
            group_by: vec!["detected".into()],
            having: vec!["COUNT(*) > 1".into()],
            ..QueryShape::default()
        }
        .apply_to(&mut config);

        assert!(config.union);
        assert_eq!(config.group_by, vec!["declared"]);
        assert_eq!(config.having, vec!["COUNT(*) > 1"]);
    }

    #[test]
    fn off_ignores_detection() {
        let mut config = Config {
            shape_detection: ShapeDetection::Off,
            ..Config::default()
        };
        QueryShape {
            union: true,
            distinct: true,
            ..QueryShape::default()
        }
        .apply_to(&mut config);

        assert!(!config.union);
        assert!(!config.distinct);
    }
}
