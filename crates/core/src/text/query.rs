//! Full-text query parsing and evaluation.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! query   := seq EOF
//! seq     := or_expr+                      implicit AND
//! or_expr := and_expr ("OR" and_expr)*
//! and_expr:= unary ("AND" unary)*
//! unary   := "NOT" unary | primary
//! primary := WORD | WORD"*" | "\"" phrase "\"" | "(" seq ")"
//! ```
//!
//! Operators are recognised only in upper case; `and` is an ordinary term.
//! Words are run through the same tokenizer as documents: a word yielding
//! several tokens (`e-mail`) becomes a phrase, a punctuation-only word is
//! dropped.

use crate::config;
use crate::error::QueryError;
use crate::text::inverted_index::{InvertedIndex, Postings};
use crate::text::tokenizer::tokenize;
use std::collections::{BTreeSet, HashSet};

/// Parsed query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Exact token.
    Term(String),
    /// Any token starting with the given prefix.
    Prefix(String),
    /// Tokens at consecutive positions.
    Phrase(Vec<String>),
    /// Every child must match.
    And(Vec<QueryNode>),
    /// At least one child must match.
    Or(Vec<QueryNode>),
    /// Child must not match.
    Not(Box<QueryNode>),
}

/// A validated full-text query, ready to run against an [`InvertedIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextQuery {
    root: QueryNode,
}

impl TextQuery {
    /// Parses a query string. Never returns a partially parsed query.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        if input.len() > config::MAX_QUERY_LEN {
            return Err(QueryError::new(
                config::MAX_QUERY_LEN,
                format!("query exceeds {} bytes", config::MAX_QUERY_LEN),
            ));
        }
        let lexemes = lex(input)?;
        let mut parser = Parser {
            lexemes,
            cursor: 0,
            end: input.len(),
        };
        let root = parser.parse_seq()?;
        if let Some(extra) = parser.peek() {
            return Err(QueryError::new(extra.position, "unbalanced parenthesis"));
        }
        Ok(Self { root })
    }

    /// Returns the root of the parsed tree.
    pub fn root(&self) -> &QueryNode {
        &self.root
    }

    /// Evaluates the query. `universe` is the set of every live doc key and is
    /// only consulted for negations.
    pub fn evaluate(&self, index: &InvertedIndex, universe: &HashSet<u32>) -> HashSet<u32> {
        eval(&self.root, index, universe)
    }

    /// Returns `true` if the tree contains a `NOT`, i.e. evaluation needs the universe.
    pub fn has_negation(&self) -> bool {
        fn walk(node: &QueryNode) -> bool {
            match node {
                QueryNode::Not(_) => true,
                QueryNode::And(children) | QueryNode::Or(children) => children.iter().any(walk),
                _ => false,
            }
        }
        walk(&self.root)
    }

    /// Index terms that contribute to relevance: every non-negated term,
    /// phrase token and prefix expansion.
    pub fn scoring_terms(&self, index: &InvertedIndex) -> Vec<String> {
        let mut terms = BTreeSet::new();
        collect_terms(&self.root, index, &mut terms);
        terms.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LexemeKind {
    Word(String),
    Quoted(String),
    And,
    Or,
    Not,
    Open,
    Close,
}

#[derive(Debug, Clone)]
struct Lexeme {
    kind: LexemeKind,
    position: usize,
}

fn lex(input: &str) -> Result<Vec<Lexeme>, QueryError> {
    let mut out = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' | ')' => {
                chars.next();
                let kind = if c == '(' {
                    LexemeKind::Open
                } else {
                    LexemeKind::Close
                };
                out.push(Lexeme {
                    kind,
                    position: start,
                });
            }
            '"' => {
                chars.next();
                let body_start = start + 1;
                let close = input[body_start..]
                    .find('"')
                    .ok_or_else(|| QueryError::new(start, "unterminated quote"))?;
                let body = &input[body_start..body_start + close];
                out.push(Lexeme {
                    kind: LexemeKind::Quoted(body.to_string()),
                    position: start,
                });
                while chars.peek().is_some_and(|&(i, _)| i <= body_start + close) {
                    chars.next();
                }
            }
            _ => {
                let mut end = input.len();
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '"') {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                let word = &input[start..end];
                let kind = match word {
                    "AND" => LexemeKind::And,
                    "OR" => LexemeKind::Or,
                    "NOT" => LexemeKind::Not,
                    _ => LexemeKind::Word(word.to_string()),
                };
                out.push(Lexeme {
                    kind,
                    position: start,
                });
            }
        }
    }

    // Drop words with nothing searchable in them ("&", "--") before parsing.
    out.retain(|l| match &l.kind {
        LexemeKind::Word(w) => w.contains('*') || !tokenize(w).is_empty(),
        _ => true,
    });
    Ok(out)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.cursor)
    }

    fn peek_kind(&self) -> Option<&LexemeKind> {
        self.peek().map(|l| &l.kind)
    }

    fn position(&self) -> usize {
        self.peek().map(|l| l.position).unwrap_or(self.end)
    }

    fn parse_seq(&mut self) -> Result<QueryNode, QueryError> {
        let mut items = Vec::new();
        while !matches!(self.peek_kind(), None | Some(LexemeKind::Close)) {
            items.push(self.parse_or()?);
        }
        match items.len() {
            0 => Err(QueryError::new(
                self.position(),
                "query contains no searchable terms",
            )),
            1 => Ok(items.remove(0)),
            _ => Ok(QueryNode::And(items)),
        }
    }

    fn parse_or(&mut self) -> Result<QueryNode, QueryError> {
        let mut items = vec![self.parse_and()?];
        while self.peek_kind() == Some(&LexemeKind::Or) {
            self.cursor += 1;
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            QueryNode::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<QueryNode, QueryError> {
        let mut items = vec![self.parse_unary()?];
        while self.peek_kind() == Some(&LexemeKind::And) {
            self.cursor += 1;
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            QueryNode::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<QueryNode, QueryError> {
        if self.peek_kind() == Some(&LexemeKind::Not) {
            self.cursor += 1;
            return Ok(QueryNode::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode, QueryError> {
        let position = self.position();
        let Some(lexeme) = self.peek().cloned() else {
            return Err(QueryError::new(position, "expected a search term"));
        };
        match lexeme.kind {
            LexemeKind::Word(word) => {
                self.cursor += 1;
                word_node(&word, position)
            }
            LexemeKind::Quoted(text) => {
                self.cursor += 1;
                let tokens = tokenize(&text).to_vec();
                match tokens.len() {
                    0 => Err(QueryError::new(position, "empty phrase")),
                    1 => Ok(QueryNode::Term(tokens.into_iter().next().unwrap_or_default())),
                    _ => Ok(QueryNode::Phrase(tokens)),
                }
            }
            LexemeKind::Open => {
                self.cursor += 1;
                let inner = self.parse_seq()?;
                if self.peek_kind() != Some(&LexemeKind::Close) {
                    return Err(QueryError::new(position, "unbalanced parenthesis"));
                }
                self.cursor += 1;
                Ok(inner)
            }
            LexemeKind::Close | LexemeKind::And | LexemeKind::Or | LexemeKind::Not => {
                Err(QueryError::new(position, "expected a search term"))
            }
        }
    }
}

fn word_node(word: &str, position: usize) -> Result<QueryNode, QueryError> {
    if let Some(stem) = word.strip_suffix('*') {
        let tokens = tokenize(stem).to_vec();
        if stem.contains('*') || tokens.len() != 1 {
            return Err(QueryError::new(
                position,
                "prefix query must be a single term followed by '*'",
            ));
        }
        return Ok(QueryNode::Prefix(tokens.into_iter().next().unwrap_or_default()));
    }
    let mut tokens = tokenize(word).to_vec();
    match tokens.len() {
        0 => Err(QueryError::new(position, "expected a search term")),
        1 => Ok(QueryNode::Term(tokens.remove(0))),
        _ => Ok(QueryNode::Phrase(tokens)),
    }
}

fn eval(node: &QueryNode, index: &InvertedIndex, universe: &HashSet<u32>) -> HashSet<u32> {
    match node {
        QueryNode::Term(term) => keys(index.postings(term)),
        QueryNode::Prefix(prefix) => index
            .prefix_postings(prefix)
            .flat_map(|(_, postings)| postings.keys().copied())
            .collect(),
        QueryNode::Phrase(tokens) => phrase_matches(index, tokens),
        QueryNode::Or(children) => children
            .iter()
            .flat_map(|c| eval(c, index, universe))
            .collect(),
        QueryNode::Not(inner) => {
            let excluded = eval(inner, index, universe);
            universe.difference(&excluded).copied().collect()
        }
        QueryNode::And(children) => {
            let mut positives: Vec<HashSet<u32>> = Vec::new();
            let mut excluded: HashSet<u32> = HashSet::new();
            for child in children {
                match child {
                    QueryNode::Not(inner) => excluded.extend(eval(inner, index, universe)),
                    other => positives.push(eval(other, index, universe)),
                }
            }
            let mut result = if positives.is_empty() {
                universe.clone()
            } else {
                positives.sort_unstable_by_key(|s| s.len());
                let mut iter = positives.into_iter();
                let first = iter.next().unwrap_or_default();
                iter.fold(first, |acc, set| acc.intersection(&set).copied().collect())
            };
            result.retain(|k| !excluded.contains(k));
            result
        }
    }
}

fn keys(postings: Option<&Postings>) -> HashSet<u32> {
    postings
        .map(|p| p.keys().copied().collect())
        .unwrap_or_default()
}

fn phrase_matches(index: &InvertedIndex, tokens: &[String]) -> HashSet<u32> {
    let lists: Option<Vec<&Postings>> = tokens.iter().map(|t| index.postings(t)).collect();
    let Some(lists) = lists else {
        return HashSet::new();
    };
    let Some((first, rest)) = lists.split_first() else {
        return HashSet::new();
    };

    first
        .iter()
        .filter(|(key, starts)| {
            let Some(following): Option<Vec<&Vec<u32>>> =
                rest.iter().map(|p| p.get(*key)).collect()
            else {
                return false;
            };
            starts.iter().any(|&start| {
                following
                    .iter()
                    .enumerate()
                    .all(|(i, positions)| positions.binary_search(&(start + i as u32 + 1)).is_ok())
            })
        })
        .map(|(key, _)| *key)
        .collect()
}

fn collect_terms(node: &QueryNode, index: &InvertedIndex, out: &mut BTreeSet<String>) {
    match node {
        QueryNode::Term(term) => {
            out.insert(term.clone());
        }
        QueryNode::Prefix(prefix) => {
            out.extend(index.prefix_postings(prefix).map(|(t, _)| t.to_string()));
        }
        QueryNode::Phrase(tokens) => out.extend(tokens.iter().cloned()),
        QueryNode::And(children) | QueryNode::Or(children) => {
            for child in children {
                collect_terms(child, index, out);
            }
        }
        QueryNode::Not(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> (InvertedIndex, HashSet<u32>) {
        let mut idx = InvertedIndex::new();
        idx.add_document(0, "Apple", "apple banana");
        idx.add_document(1, "Banana", "banana carrot");
        idx.add_document(2, "Hello", "Hello world, hello e-mail");
        idx.add_document(3, "world", "new york city");
        (idx, [0, 1, 2, 3].into_iter().collect())
    }

    fn run(q: &str) -> BTreeSet<u32> {
        let (idx, universe) = corpus();
        TextQuery::parse(q)
            .unwrap()
            .evaluate(&idx, &universe)
            .into_iter()
            .collect()
    }

    fn set(keys: &[u32]) -> BTreeSet<u32> {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_single_term_case_insensitive() {
        assert_eq!(run("hello"), set(&[2]));
        assert_eq!(run("HELLO"), set(&[2]));
    }

    #[test]
    fn test_implicit_and() {
        assert_eq!(run("banana"), set(&[0, 1]));
        assert_eq!(run("banana carrot"), set(&[1]));
        assert_eq!(run("apple carrot"), set(&[]));
    }

    #[test]
    fn test_explicit_operators() {
        assert_eq!(run("apple OR carrot"), set(&[0, 1]));
        assert_eq!(run("banana AND NOT apple"), set(&[1]));
        assert_eq!(run("banana NOT apple"), set(&[1]));
        assert_eq!(run("NOT banana"), set(&[2, 3]));
    }

    #[test]
    fn test_explicit_operators_bind_tighter_than_juxtaposition() {
        // banana AND (apple OR world)
        assert_eq!(run("banana apple OR world"), set(&[0]));
        // (apple AND banana) OR world
        assert_eq!(run("apple AND banana OR world"), set(&[0, 2, 3]));
    }

    #[test]
    fn test_lowercase_operator_is_a_term() {
        assert_eq!(run("apple and banana"), set(&[]));
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(run("(apple OR hello) NOT banana"), set(&[2]));
    }

    #[test]
    fn test_phrase_requires_adjacency() {
        assert_eq!(run("\"hello world\""), set(&[2]));
        assert_eq!(run("\"world hello\""), set(&[2]));
        assert_eq!(run("\"banana apple\""), set(&[]));
        assert_eq!(run("\"york city\""), set(&[3]));
    }

    #[test]
    fn test_phrase_does_not_span_title_and_body() {
        // doc 3: title "world", body starts with "new"
        assert_eq!(run("\"world new\""), set(&[]));
    }

    #[test]
    fn test_hyphenated_word_is_phrase() {
        assert_eq!(run("e-mail"), set(&[2]));
        assert_eq!(
            TextQuery::parse("e-mail").unwrap().root(),
            &QueryNode::Phrase(vec!["e".into(), "mail".into()])
        );
    }

    #[test]
    fn test_prefix() {
        assert_eq!(run("ban*"), set(&[0, 1]));
        assert_eq!(run("zz*"), set(&[]));
    }

    #[test]
    fn test_punctuation_words_are_dropped() {
        assert_eq!(run("apple & banana"), set(&[0]));
    }

    #[test]
    fn test_malformed_queries() {
        for q in [
            "\"unterminated",
            "(apple",
            "apple)",
            "apple AND",
            "OR apple",
            "NOT",
            "\"\"",
            "!!!",
            "*",
            "()",
        ] {
            assert!(TextQuery::parse(q).is_err(), "expected error for {q:?}");
        }
    }

    #[test]
    fn test_error_position() {
        let err = TextQuery::parse("apple \"open").unwrap_err();
        assert_eq!(err.position, 6);
    }

    #[test]
    fn test_scoring_terms_skip_negations() {
        let (idx, _) = corpus();
        let q = TextQuery::parse("ban* \"hello world\" NOT apple").unwrap();
        assert_eq!(q.scoring_terms(&idx), vec!["banana", "hello", "world"]);
    }

    #[test]
    fn test_has_negation() {
        assert!(!TextQuery::parse("apple OR banana").unwrap().has_negation());
        assert!(TextQuery::parse("apple (banana NOT carrot)").unwrap().has_negation());
    }
}
