//! Search term handling for the post full-text index.
//!
//! User input never reaches the FTS5 MATCH expression verbatim: every term is
//! quoted unless it is a plain prefix wildcard, `OR` and `NOT` are only kept where
//! FTS5 accepts them, and `after:`/`before:` tokens are lifted out into date
//! bounds on the topic's creation time.

use chrono::NaiveDate;

/// A user search term split into an FTS5 expression and date bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTerm {
    /// The FTS5 expression for the MATCH clause; empty when only dates were given.
    pub fts_query: String,
    /// Only topics created on or after this date.
    pub created_after: Option<NaiveDate>,
    /// Only topics created before this date.
    pub created_before: Option<NaiveDate>,
}

impl SearchTerm {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fts_query.is_empty() && self.created_after.is_none() && self.created_before.is_none()
    }

    #[must_use]
    pub fn has_fts_query(&self) -> bool {
        !self.fts_query.is_empty()
    }
}

/// Parse a user search string.
///
/// # Supported syntax
///
/// - Multiple keywords: `rust web` (implicit AND)
/// - Quoted phrases: `"exact phrase"`
/// - `OR` between terms
/// - Exclusion: `-beginner` or `NOT beginner`
/// - Prefix wildcards: `rust*`
/// - Date bounds: `after:2024-01-01`, `before:2024-06` or `before:2024`
///
/// # Examples
///
/// ```
/// use discourse_topic_query::db::parse_search_term;
///
/// let term = parse_search_term("after:2024-01-01 pinned topics");
/// assert_eq!(term.fts_query, "\"pinned\" \"topics\"");
/// assert!(term.created_after.is_some());
/// ```
#[must_use]
pub fn parse_search_term(input: &str) -> SearchTerm {
    let mut result = SearchTerm::default();
    let tokens = tokenize(input.trim());
    let mut expr = MatchBuilder::default();

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        i += 1;

        if let Some(date) = token.strip_prefix("after:") {
            result.created_after = parse_date(date).or(result.created_after);
            continue;
        }
        if let Some(date) = token.strip_prefix("before:") {
            result.created_before = parse_date(date).or(result.created_before);
            continue;
        }

        if token.eq_ignore_ascii_case("OR") {
            expr.or();
            continue;
        }

        if token.eq_ignore_ascii_case("NOT") {
            if let Some(next) = tokens.get(i) {
                expr.exclude(quote_term(next));
                i += 1;
            }
            continue;
        }

        match token.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => expr.exclude(quote_term(rest)),
            _ => expr.term(quote_term(token)),
        }
    }

    result.fts_query = expr.finish();
    result
}

/// Assembles MATCH parts so that `OR` only ever joins two searchable terms and
/// `NOT` always has a term on its left.
#[derive(Debug, Default)]
struct MatchBuilder {
    parts: Vec<String>,
    pending_or: bool,
    /// Exclusions seen before the first term.
    held: Vec<String>,
}

impl MatchBuilder {
    fn or(&mut self) {
        self.pending_or = !self.parts.is_empty();
    }

    fn term(&mut self, term: String) {
        if std::mem::take(&mut self.pending_or) {
            self.parts.push("OR".to_string());
        }
        self.parts.push(term);
        for held in self.held.drain(..) {
            self.parts.push(format!("NOT {held}"));
        }
    }

    fn exclude(&mut self, term: String) {
        // FTS5 has no `a OR NOT b`; the exclusion is dropped and the OR waits for a term
        if self.pending_or {
            return;
        }
        if self.parts.is_empty() {
            self.held.push(term);
        } else {
            self.parts.push(format!("NOT {term}"));
        }
    }

    /// The expression; empty when nothing searchable was given.
    fn finish(self) -> String {
        self.parts.join(" ")
    }
}

/// Split on whitespace, keeping quoted phrases together and closing an unterminated quote.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' if in_quotes => {
                current.push('"');
                tokens.push(std::mem::take(&mut current));
                in_quotes = false;
            }
            '"' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                current.push('"');
                in_quotes = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        if in_quotes {
            current.push('"');
        }
        tokens.push(current);
    }
    tokens
}

fn quote_term(term: &str) -> String {
    if term.len() > 1 && term.starts_with('"') && term.ends_with('"') {
        let inner = &term[1..term.len() - 1];
        return format!("\"{}\"", inner.replace('"', "\"\""));
    }

    if let Some(prefix) = term.strip_suffix('*') {
        if !prefix.is_empty() && prefix.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return term.to_string();
        }
    }

    format!("\"{}\"", term.replace('"', "\"\""))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01-01"), "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let term = parse_search_term("   ");
        assert!(term.is_empty());
        assert!(!term.has_fts_query());
    }

    #[test]
    fn test_words_are_quoted() {
        let term = parse_search_term("rust web");
        assert_eq!(term.fts_query, "\"rust\" \"web\"");
    }

    #[test]
    fn test_phrase_kept_together() {
        let term = parse_search_term("rust \"error handling\"");
        assert_eq!(term.fts_query, "\"rust\" \"error handling\"");
    }

    #[test]
    fn test_unterminated_quote_closed() {
        let term = parse_search_term("\"half open");
        assert_eq!(term.fts_query, "\"half open\"");
    }

    #[test]
    fn test_or_and_not() {
        assert_eq!(
            parse_search_term("rust OR python").fts_query,
            "\"rust\" OR \"python\""
        );
        assert_eq!(
            parse_search_term("rust -beginner").fts_query,
            "\"rust\" NOT \"beginner\""
        );
        assert_eq!(
            parse_search_term("rust NOT beginner").fts_query,
            "\"rust\" NOT \"beginner\""
        );
    }

    #[test]
    fn test_dangling_or_dropped() {
        assert_eq!(parse_search_term("OR rust OR").fts_query, "\"rust\"");
    }

    #[test]
    fn test_leading_not_yields_no_query() {
        assert!(!parse_search_term("-spam").has_fts_query());
        assert!(!parse_search_term("NOT spam").has_fts_query());
    }

    #[test]
    fn test_leading_exclusion_attaches_to_first_term() {
        assert_eq!(
            parse_search_term("-spam rust").fts_query,
            "\"rust\" NOT \"spam\""
        );
    }

    #[test]
    fn test_exclusion_after_or_is_dropped() {
        assert_eq!(parse_search_term("rust OR -spam").fts_query, "\"rust\"");
        assert_eq!(parse_search_term("rust OR NOT spam").fts_query, "\"rust\"");
        assert_eq!(
            parse_search_term("rust OR -spam python").fts_query,
            "\"rust\" OR \"python\""
        );
    }

    #[test]
    fn test_repeated_or_collapses() {
        assert_eq!(
            parse_search_term("rust OR OR pinned").fts_query,
            "\"rust\" OR \"pinned\""
        );
        assert_eq!(
            parse_search_term("rust or Or pinned").fts_query,
            "\"rust\" OR \"pinned\""
        );
    }

    #[test]
    fn test_or_before_date_token_is_dropped() {
        let term = parse_search_term("rust OR after:2024-01-01");
        assert_eq!(term.fts_query, "\"rust\"");
        assert_eq!(term.created_after, NaiveDate::from_ymd_opt(2024, 1, 1));

        let term = parse_search_term("rust OR before:2024 go");
        assert_eq!(term.fts_query, "\"rust\" OR \"go\"");
    }

    #[test]
    fn test_wildcard_left_unquoted() {
        assert_eq!(parse_search_term("topic*").fts_query, "topic*");
        assert_eq!(parse_search_term("a-b*").fts_query, "\"a-b*\"");
    }

    #[test]
    fn test_injection_attempt_is_quoted() {
        let term = parse_search_term("x\" OR 1=1");
        assert!(term.fts_query.starts_with('"'));
        assert!(!term.fts_query.contains("x\" OR"));
    }

    #[test]
    fn test_date_bounds() {
        let term = parse_search_term("after:2024-01-15 before:2024-06 pins");
        assert_eq!(term.created_after, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(term.created_before, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(term.fts_query, "\"pins\"");
    }

    #[test]
    fn test_invalid_date_ignored() {
        let term = parse_search_term("after:soon pins");
        assert!(term.created_after.is_none());
        assert_eq!(term.fts_query, "\"pins\"");
    }
}
