//! The selector subset used to pick containers, items, and handles:
//! compound selectors (`li.card[data-id]`, `#list`, `*`) joined by commas.

use std::{fmt, str::FromStr};

use crate::{
    dom::{Document, NodeId},
    error::SelectorError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Compound>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let alternatives = Parser::new(source).parse_list()?;
        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.alternatives.iter().any(|c| c.matches(doc, node))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !doc.tag(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| doc.has_class(node, class)) {
            return false;
        }
        self.attrs.iter().all(|test| match &test.value {
            Some(expected) => doc.attr(node, &test.name) == Some(expected.as_str()),
            None => doc.has_attr(node, &test.name),
        })
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Compound>, SelectorError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_whitespace();
            let compound = self.parse_compound()?;
            if compound.is_empty() {
                return match self.peek() {
                    Some(ch) => Err(SelectorError::UnexpectedChar {
                        ch,
                        offset: self.pos,
                    }),
                    None => Err(SelectorError::Empty),
                };
            }
            alternatives.push(compound);
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(alternatives),
                Some(',') => self.pos += 1,
                Some(_) => return Err(SelectorError::Combinator { offset: self.pos }),
            }
        }
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        if self.peek() == Some('*') {
            self.pos += 1;
            compound.tag = Some("*".to_string());
        } else if let Some(tag) = self.ident() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.required_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.required_ident()?);
                }
                Some('[') => {
                    let start = self.pos;
                    self.pos += 1;
                    compound.attrs.push(self.attr_test(start)?);
                }
                _ => return Ok(compound),
            }
        }
    }

    fn attr_test(&mut self, start: usize) -> Result<AttrTest, SelectorError> {
        self.skip_whitespace();
        let name = self.required_ident()?;
        self.skip_whitespace();
        let value = match self.peek() {
            Some(']') => None,
            Some('=') => {
                self.pos += 1;
                self.skip_whitespace();
                Some(self.attr_value(start)?)
            }
            Some(ch) => {
                return Err(SelectorError::UnexpectedChar {
                    ch,
                    offset: self.pos,
                })
            }
            None => return Err(SelectorError::UnterminatedAttribute { offset: start }),
        };
        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(SelectorError::UnterminatedAttribute { offset: start });
        }
        self.pos += 1;
        Ok(AttrTest { name, value })
    }

    fn attr_value(&mut self, start: usize) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.peek() {
                        Some(ch) if ch == quote => {
                            self.pos += 1;
                            return Ok(value);
                        }
                        Some(ch) => {
                            value.push(ch);
                            self.pos += 1;
                        }
                        None => return Err(SelectorError::UnterminatedAttribute { offset: start }),
                    }
                }
            }
            _ => self.required_ident(),
        }
    }

    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn required_ident(&mut self) -> Result<String, SelectorError> {
        match self.ident() {
            Some(ident) => Ok(ident),
            None => match self.peek() {
                Some(ch) => Err(SelectorError::UnexpectedChar {
                    ch,
                    offset: self.pos,
                }),
                None => Err(SelectorError::Empty),
            },
        }
    }
}

#[cfg(test)]
#[path = "tests/selector_tests.rs"]
mod tests;
