//! Parser and evaluator for the expression subset the adapter emits.
//!
//! Filters are conjunctions of comparisons, `IN` lists and the
//! `attribute_exists`, `attribute_not_exists`, `contains` and `begins_with`
//! functions. Updates are `SET path = operand, ...` and `REMOVE path, ...`
//! clauses. Operands are `#name` aliases, `:value` placeholders or bare
//! attribute names.

use std::collections::BTreeMap;

use serde_json::Value;

use authkv_core::storage::{Item, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Placeholder(String),
    Ident(String),
    Compare(Comparator),
    LParen,
    RParen,
    Comma,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, StoreError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Compare(Comparator::Eq));
            }
            '<' => {
                chars.next();
                let op = match chars.peek() {
                    Some(&'>') => Comparator::Ne,
                    Some(&'=') => Comparator::Le,
                    _ => Comparator::Lt,
                };
                if op != Comparator::Lt {
                    chars.next();
                }
                tokens.push(Token::Compare(op));
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Compare(Comparator::Ge));
                } else {
                    tokens.push(Token::Compare(Comparator::Gt));
                }
            }
            '#' | ':' => {
                chars.next();
                let mut word = c.to_string();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if word.len() == 1 {
                    return Err(invalid(format!("dangling '{c}' in expression")));
                }
                tokens.push(if c == '#' {
                    Token::Name(word)
                } else {
                    Token::Placeholder(word)
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(word));
            }
            other => return Err(invalid(format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::Validation(message.into())
}

/// An operand resolved against the expression's name and value bindings.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(String),
    Literal(Value),
}

impl Operand {
    fn resolve<'a>(&'a self, item: &'a Item) -> Option<&'a Value> {
        match self {
            Operand::Path(path) => item.get(path),
            Operand::Literal(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Compare(Operand, Comparator, Operand),
    In(Operand, Vec<Operand>),
    Exists(String),
    NotExists(String),
    Contains(Operand, Operand),
    BeginsWith(Operand, Operand),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a BTreeMap<String, String>,
    values: &'a BTreeMap<String, Value>,
}

impl<'a> Parser<'a> {
    fn new(
        expression: &str,
        names: &'a BTreeMap<String, String>,
        values: &'a BTreeMap<String, Value>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            tokens: tokenize(expression)?,
            pos: 0,
            names,
            values,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn expect(&mut self, expected: Token) -> Result<(), StoreError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(invalid(format!("expected {expected:?}, found {token:?}"))),
            None => Err(invalid(format!("expected {expected:?}, found end of expression"))),
        }
    }

    fn operand(&mut self) -> Result<Operand, StoreError> {
        match self.next() {
            Some(Token::Name(alias)) => self
                .names
                .get(&alias)
                .map(|name| Operand::Path(name.clone()))
                .ok_or_else(|| invalid(format!("unbound attribute name {alias}"))),
            Some(Token::Placeholder(placeholder)) => self
                .values
                .get(&placeholder)
                .map(|value| Operand::Literal(value.clone()))
                .ok_or_else(|| invalid(format!("unbound attribute value {placeholder}"))),
            Some(Token::Ident(name)) => Ok(Operand::Path(name)),
            Some(token) => Err(invalid(format!("expected an operand, found {token:?}"))),
            None => Err(invalid("expected an operand, found end of expression")),
        }
    }

    fn path(&mut self) -> Result<String, StoreError> {
        match self.operand()? {
            Operand::Path(path) => Ok(path),
            Operand::Literal(_) => Err(invalid("expected an attribute path")),
        }
    }

    fn term(&mut self) -> Result<Term, StoreError> {
        let function = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Ident(name)), Some(Token::LParen)) => Some(name.clone()),
            _ => None,
        };

        if let Some(function) = function {
            self.pos += 2;
            let term = match function.as_str() {
                "attribute_exists" => Term::Exists(self.path()?),
                "attribute_not_exists" => Term::NotExists(self.path()?),
                "contains" | "begins_with" => {
                    let target = self.operand()?;
                    self.expect(Token::Comma)?;
                    let operand = self.operand()?;
                    if function == "contains" {
                        Term::Contains(target, operand)
                    } else {
                        Term::BeginsWith(target, operand)
                    }
                }
                other => return Err(invalid(format!("unsupported function {other}"))),
            };
            self.expect(Token::RParen)?;
            return Ok(term);
        }

        let lhs = self.operand()?;
        if self.peek_keyword("IN") {
            self.pos += 1;
            self.expect(Token::LParen)?;
            let mut candidates = vec![self.operand()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                candidates.push(self.operand()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Term::In(lhs, candidates));
        }

        match self.next() {
            Some(Token::Compare(op)) => Ok(Term::Compare(lhs, op, self.operand()?)),
            Some(token) => Err(invalid(format!("expected a comparator, found {token:?}"))),
            None => Err(invalid("expected a comparator, found end of expression")),
        }
    }
}

/// A parsed filter or condition expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterExpression {
    terms: Vec<Term>,
}

impl FilterExpression {
    pub(crate) fn parse(
        expression: &str,
        names: &BTreeMap<String, String>,
        values: &BTreeMap<String, Value>,
    ) -> Result<Self, StoreError> {
        let mut parser = Parser::new(expression, names, values)?;
        let mut terms = vec![parser.term()?];

        while !parser.at_end() {
            if !parser.peek_keyword("AND") {
                return Err(invalid(format!(
                    "expected AND, found {:?}",
                    parser.peek()
                )));
            }
            parser.pos += 1;
            terms.push(parser.term()?);
        }

        Ok(Self { terms })
    }

    pub(crate) fn matches(&self, item: &Item) -> bool {
        self.terms.iter().all(|term| evaluate(term, item))
    }
}

fn evaluate(term: &Term, item: &Item) -> bool {
    match term {
        Term::Exists(path) => item.contains_key(path),
        Term::NotExists(path) => !item.contains_key(path),
        Term::Compare(lhs, op, rhs) => compare(lhs.resolve(item), *op, rhs.resolve(item)),
        Term::In(lhs, candidates) => match lhs.resolve(item) {
            Some(value) => candidates
                .iter()
                .filter_map(|c| c.resolve(item))
                .any(|candidate| values_equal(value, candidate)),
            None => false,
        },
        Term::Contains(target, operand) => match (target.resolve(item), operand.resolve(item)) {
            (Some(Value::String(haystack)), Some(Value::String(needle))) => {
                haystack.contains(needle.as_str())
            }
            (Some(Value::Array(elements)), Some(needle)) => {
                elements.iter().any(|e| values_equal(e, needle))
            }
            _ => false,
        },
        Term::BeginsWith(target, operand) => match (target.resolve(item), operand.resolve(item)) {
            (Some(Value::String(value)), Some(Value::String(prefix))) => {
                value.starts_with(prefix.as_str())
            }
            _ => false,
        },
    }
}

/// Numbers compare by value regardless of integer or float representation.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

fn compare(lhs: Option<&Value>, op: Comparator, rhs: Option<&Value>) -> bool {
    let (lhs, rhs) = match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => (lhs, rhs),
        // A missing attribute is unequal to everything and ordered against nothing.
        _ => return op == Comparator::Ne,
    };

    match op {
        Comparator::Eq => values_equal(lhs, rhs),
        Comparator::Ne => !values_equal(lhs, rhs),
        _ => {
            let ordering = match (lhs, rhs) {
                (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            match ordering {
                Some(ordering) => match op {
                    Comparator::Lt => ordering.is_lt(),
                    Comparator::Le => ordering.is_le(),
                    Comparator::Gt => ordering.is_gt(),
                    Comparator::Ge => ordering.is_ge(),
                    Comparator::Eq | Comparator::Ne => false,
                },
                None => false,
            }
        }
    }
}

/// A parsed update expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UpdateExpression {
    set: Vec<(String, Operand)>,
    remove: Vec<String>,
}

impl UpdateExpression {
    pub(crate) fn parse(
        expression: &str,
        names: &BTreeMap<String, String>,
        values: &BTreeMap<String, Value>,
    ) -> Result<Self, StoreError> {
        let mut parser = Parser::new(expression, names, values)?;
        let mut update = Self {
            set: Vec::new(),
            remove: Vec::new(),
        };

        while !parser.at_end() {
            let clause = match parser.next() {
                Some(Token::Ident(word)) => word.to_ascii_uppercase(),
                other => return Err(invalid(format!("expected SET or REMOVE, found {other:?}"))),
            };

            loop {
                let path = parser.path()?;
                match clause.as_str() {
                    "SET" => {
                        parser.expect(Token::Compare(Comparator::Eq))?;
                        let value = parser.operand()?;
                        update.set.push((path, value));
                    }
                    "REMOVE" => update.remove.push(path),
                    other => return Err(invalid(format!("unsupported update clause {other}"))),
                }
                if parser.peek() == Some(&Token::Comma) {
                    parser.pos += 1;
                } else {
                    break;
                }
            }
        }

        if update.set.is_empty() && update.remove.is_empty() {
            return Err(invalid("empty update expression"));
        }
        Ok(update)
    }

    /// Applies the update. Operands read the item as it was before the update.
    pub(crate) fn apply(&self, item: &mut Item) -> Result<(), StoreError> {
        let before = item.clone();
        for (path, operand) in &self.set {
            let value = operand
                .resolve(&before)
                .cloned()
                .ok_or_else(|| invalid(format!("attribute {path} copies a missing value")))?;
            item.insert(path.clone(), value);
        }
        for path in &self.remove {
            item.remove(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use authkv_core::condition::{Condition, Predicate};
    use authkv_core::expression::{compile_filter, compile_update};
    use serde_json::json;

    use super::*;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn filter(expression: &str, values: Value) -> FilterExpression {
        let values: BTreeMap<String, Value> = item(values).into_iter().collect();
        FilterExpression::parse(expression, &BTreeMap::new(), &values).unwrap()
    }

    #[test]
    fn test_tokenize_comparators() {
        let tokens = tokenize("a <> :b AND c <= :d AND e >= :f AND g < :h").unwrap();
        let comparators: Vec<_> = tokens
            .into_iter()
            .filter_map(|t| match t {
                Token::Compare(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(
            comparators,
            vec![Comparator::Ne, Comparator::Le, Comparator::Ge, Comparator::Lt]
        );
    }

    #[test]
    fn test_bare_attribute_condition() {
        let exists = filter("attribute_exists(PK)", json!({}));
        assert!(exists.matches(&item(json!({"PK": "USER#1"}))));
        assert!(!exists.matches(&item(json!({"id": "1"}))));
    }

    #[test]
    fn test_missing_attribute_semantics() {
        let row = item(json!({"name": "Jane"}));
        assert!(!filter("age = :v", json!({":v": 1})).matches(&row));
        assert!(filter("age <> :v", json!({":v": 1})).matches(&row));
        assert!(!filter("age < :v", json!({":v": 1})).matches(&row));
        assert!(!filter("age IN (:v)", json!({":v": 1})).matches(&row));
    }

    #[test]
    fn test_mixed_type_comparisons_are_false() {
        let row = item(json!({"age": 30}));
        assert!(!filter("age > :v", json!({":v": "10"})).matches(&row));
        assert!(!filter("age = :v", json!({":v": "30"})).matches(&row));
        assert!(filter("age = :v", json!({":v": 30.0})).matches(&row));
    }

    #[test]
    fn test_contains_on_strings_and_lists() {
        let row = item(json!({"email": "jane@example.com", "roles": ["admin", "user"]}));
        assert!(filter("contains(email, :v)", json!({":v": "@example"})).matches(&row));
        assert!(filter("contains(roles, :v)", json!({":v": "admin"})).matches(&row));
        assert!(!filter("contains(roles, :v)", json!({":v": "owner"})).matches(&row));
    }

    #[test]
    fn test_unbound_placeholder_is_rejected() {
        let err = FilterExpression::parse("#a = :val0", &BTreeMap::new(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let values: BTreeMap<String, Value> = [(":v".to_string(), json!(1))].into();
        for expression in ["a = :v OR b = :v", "a = :v b", "a = ", "a ! :v"] {
            assert!(
                FilterExpression::parse(expression, &BTreeMap::new(), &values).is_err(),
                "{expression} should not parse"
            );
        }
    }

    #[test]
    fn test_compiled_update_applies_set_and_remove() {
        let compiled = compile_update(
            &item(json!({"name": "Janet", "image": null})),
            &["id"],
            "2024-02-01T00:00:00.000Z",
        )
        .unwrap();
        let update =
            UpdateExpression::parse(&compiled.expression, &compiled.names, &compiled.values)
                .unwrap();

        let mut row = item(json!({"id": "u1", "name": "Jane", "image": "a.png"}));
        update.apply(&mut row).unwrap();

        assert_eq!(
            row,
            item(json!({
                "id": "u1",
                "name": "Janet",
                "updatedAt": "2024-02-01T00:00:00.000Z"
            }))
        );
    }

    #[test]
    fn test_update_requires_a_clause() {
        assert!(UpdateExpression::parse("", &BTreeMap::new(), &BTreeMap::new()).is_err());
        assert!(UpdateExpression::parse("ADD a :v", &BTreeMap::new(), &BTreeMap::new()).is_err());
    }

    fn ordered(actual: Option<&Value>, expected: &Value, accept: fn(Ordering) -> bool) -> bool {
        match (actual, expected) {
            (Some(Value::Number(a)), Value::Number(b)) => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b))
                .is_some_and(accept),
            (Some(Value::String(a)), Value::String(b)) => accept(a.cmp(b)),
            _ => false,
        }
    }

    // Evaluates a typed condition directly, without going through expression text.
    fn direct_match(condition: &Condition, row: &Item) -> bool {
        let actual = row.get(&condition.field).filter(|v| !v.is_null());

        match &condition.predicate {
            Predicate::Eq(Value::Null) | Predicate::IsNull => actual.is_none(),
            Predicate::Ne(Value::Null) => actual.is_some(),
            Predicate::Eq(expected) => actual.is_some_and(|a| values_equal(a, expected)),
            Predicate::Ne(expected) => !actual.is_some_and(|a| values_equal(a, expected)),
            Predicate::Gt(expected) => ordered(actual, expected, Ordering::is_gt),
            Predicate::Gte(expected) => ordered(actual, expected, Ordering::is_ge),
            Predicate::Lt(expected) => ordered(actual, expected, Ordering::is_lt),
            Predicate::Lte(expected) => ordered(actual, expected, Ordering::is_le),
            Predicate::In(candidates) => {
                actual.is_some_and(|a| candidates.iter().any(|c| values_equal(a, c)))
            }
            Predicate::Contains(needle) => match (actual, needle) {
                (Some(Value::String(s)), Value::String(n)) => s.contains(n.as_str()),
                (Some(Value::Array(elements)), needle) => {
                    elements.iter().any(|e| values_equal(e, needle))
                }
                _ => false,
            },
            Predicate::StartsWith(prefix) => {
                matches!(actual, Some(Value::String(s)) if s.starts_with(prefix.as_str()))
            }
        }
    }

    fn fixture() -> Vec<Item> {
        vec![
            item(json!({"id": "u1", "name": "Ada", "age": 36, "role": "admin", "tags": ["a", "b"]})),
            item(json!({"id": "u2", "name": "Alan", "age": 41, "role": "user"})),
            item(json!({"id": "u3", "name": "Grace", "age": 85.5, "verified": true})),
            item(json!({"id": "u4", "name": "Linus", "role": "user", "tags": ["b"]})),
            item(json!({"id": "u5", "age": "unknown", "verified": false})),
        ]
    }

    fn conditions() -> Vec<Condition> {
        vec![
            Condition::eq("role", "user"),
            Condition::eq("age", 36),
            Condition::eq("verified", true),
            Condition::eq("role", Value::Null),
            Condition::ne("role", "admin"),
            Condition::ne("age", Value::Null),
            Condition::gt("age", 40),
            Condition::gte("age", 36),
            Condition::lt("age", 85.5),
            Condition::lte("name", "Alan"),
            Condition::gt("age", "a"),
            Condition::is_in("role", ["admin", "guest"]),
            Condition::is_in("age", [json!(41), json!(85.5)]),
            Condition::contains("name", "a"),
            Condition::contains("tags", "b"),
            Condition::starts_with("name", "A"),
            Condition::is_null("verified"),
        ]
    }

    fn selected(compiled: Option<authkv_core::CompiledExpression>, rows: &[Item]) -> Vec<String> {
        let filter = compiled.map(|c| {
            FilterExpression::parse(&c.expression, &c.names, &c.values).unwrap()
        });
        rows.iter()
            .filter(|row| filter.as_ref().map_or(true, |f| f.matches(row)))
            .map(|row| row["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_compiled_filters_select_same_rows_as_typed_conditions() {
        let rows = fixture();
        let conditions = conditions();

        let mut cases: Vec<Vec<Condition>> = vec![Vec::new()];
        cases.extend(conditions.iter().cloned().map(|c| vec![c]));
        for a in &conditions {
            for b in &conditions {
                cases.push(vec![a.clone(), b.clone()]);
            }
        }

        for case in cases {
            let expected: Vec<String> = rows
                .iter()
                .filter(|row| case.iter().all(|c| direct_match(c, row)))
                .map(|row| row["id"].as_str().unwrap().to_string())
                .collect();
            let actual = selected(compile_filter(&case).unwrap(), &rows);
            assert_eq!(actual, expected, "conditions: {case:?}");
        }
    }
}
