// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Parser for the minimal query evaluation-program grammar: `TERM`,
//! `SELECT`, `RESTRICT`, `EVAL` and `SUMMARIZE` statements, case-insensitive
//! keywords, double-quoted string literals, decimal/float numbers, `;`-terminated
//! statements. No grounding source in `original_source` covers this textual
//! grammar (the peer C++ engine's program parser lives in a sibling repository
//! outside this pack), so the lexer/parser below is a hand-rolled recursive-descent
//! reader written in the crate's own error-handling idiom rather than pulling in
//! a parser-combinator crate.

use crate::error::{Error, Result};
use crate::keys::Index;

/// A term feature's value: either a literal string or a pre-resolved termno.
#[derive(Clone, Debug, PartialEq)]
pub enum TermValueSpec {
    Literal(String),
    Id(Index),
}

/// One `TERM <set> <value> : <type> ;` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct TermDecl {
    pub set: String,
    pub value: TermValueSpec,
    pub type_name: String,
}

/// A parameter value in an `EVAL`/`SUMMARIZE` argument list: a bare identifier
/// (a feature-set or metadata-field name) or a number.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Name(String),
}

impl ParamValue {
    /// Reads this value as a number, or `None` if it's a name.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Name(_) => None,
        }
    }

    /// Reads this value as a name (identifier or string literal), or `None` if
    /// it's a number.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            Self::Number(_) => None,
        }
    }
}

/// One `EVAL <name>(params...) WITH <sets> ;` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalDecl {
    pub name: String,
    pub params: Vec<(String, ParamValue)>,
    pub with_sets: Vec<String>,
}

/// One `SUMMARIZE <attribute> = <name>(params...) ;` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct SummarizeDecl {
    pub attribute: String,
    pub name: String,
    pub params: Vec<(String, ParamValue)>,
}

/// A parsed evaluation program: the declared term features, selection and
/// restriction feature sets, weighting functions and summarizers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub terms: Vec<TermDecl>,
    pub select_sets: Vec<String>,
    pub restrict_sets: Vec<String>,
    pub evals: Vec<EvalDecl>,
    pub summarizers: Vec<SummarizeDecl>,
}

impl Program {
    /// Parses `source` as an evaluation program.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lex(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        parser.parse_program()
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    String(String),
    Number(f64),
    Symbol(char),
}

fn lex(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' || (c == '/' && chars.get(i + 1) == Some(&'/')) {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '"' {
            let mut value = String::new();
            i += 1;
            let mut closed = false;
            while i < chars.len() {
                if chars[i] == '"' {
                    closed = true;
                    i += 1;
                    break;
                }
                value.push(chars[i]);
                i += 1;
            }
            if !closed {
                return Err(Error::InvalidArgument("query program: unterminated string literal"));
            }
            tokens.push(Token::String(value));
            continue;
        }
        if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| Error::InvalidArgument("query program: malformed number"))?;
            tokens.push(Token::Number(value));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident(text));
            continue;
        }
        if matches!(c, ';' | ':' | ',' | '(' | ')' | '=') {
            tokens.push(Token::Symbol(c));
            i += 1;
            continue;
        }
        return Err(Error::InvalidArgument("query program: unexpected character"));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<()> {
        match self.advance() {
            Some(Token::Symbol(c)) if c == symbol => Ok(()),
            _ => Err(Error::InvalidArgument("query program: expected symbol")),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(Error::InvalidArgument("query program: expected identifier")),
        }
    }

    fn keyword_matches(token: &Token, keyword: &str) -> bool {
        matches!(token, Token::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }

    fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        while let Some(token) = self.peek().cloned() {
            if Self::keyword_matches(&token, "TERM") {
                self.pos += 1;
                program.terms.push(self.parse_term()?);
            } else if Self::keyword_matches(&token, "SELECT") {
                self.pos += 1;
                program.select_sets.extend(self.parse_ident_list()?);
            } else if Self::keyword_matches(&token, "RESTRICT") {
                self.pos += 1;
                program.restrict_sets.extend(self.parse_ident_list()?);
            } else if Self::keyword_matches(&token, "EVAL") {
                self.pos += 1;
                program.evals.push(self.parse_eval()?);
            } else if Self::keyword_matches(&token, "SUMMARIZE") {
                self.pos += 1;
                program.summarizers.push(self.parse_summarize()?);
            } else {
                return Err(Error::InvalidArgument("query program: unknown statement keyword"));
            }
        }
        Ok(program)
    }

    fn parse_term(&mut self) -> Result<TermDecl> {
        let set = self.expect_ident()?;
        let value = match self.advance() {
            Some(Token::String(s)) => TermValueSpec::Literal(s),
            Some(Token::Ident(s)) => TermValueSpec::Literal(s),
            Some(Token::Number(n)) => TermValueSpec::Id(n as Index),
            _ => return Err(Error::InvalidArgument("query program: expected a term value")),
        };
        self.expect_symbol(':')?;
        let type_name = self.expect_ident()?;
        self.expect_symbol(';')?;
        Ok(TermDecl { set, value, type_name })
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.expect_ident()?];
        while matches!(self.peek(), Some(Token::Symbol(','))) {
            self.pos += 1;
            names.push(self.expect_ident()?);
        }
        self.expect_symbol(';')?;
        Ok(names)
    }

    fn parse_param_value(&mut self) -> Result<ParamValue> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(ParamValue::Number(n)),
            Some(Token::Ident(s)) => Ok(ParamValue::Name(s)),
            Some(Token::String(s)) => Ok(ParamValue::Name(s)),
            _ => Err(Error::InvalidArgument("query program: expected a parameter value")),
        }
    }

    fn parse_param_list(&mut self) -> Result<Vec<(String, ParamValue)>> {
        self.expect_symbol('(')?;
        let mut params = Vec::new();
        if !matches!(self.peek(), Some(Token::Symbol(')'))) {
            loop {
                let name = self.expect_ident()?;
                self.expect_symbol('=')?;
                let value = self.parse_param_value()?;
                params.push((name, value));
                if matches!(self.peek(), Some(Token::Symbol(','))) {
                    self.pos += 1;
                    continue;
                }
                break;
            }
        }
        self.expect_symbol(')')?;
        Ok(params)
    }

    fn parse_eval(&mut self) -> Result<EvalDecl> {
        let name = self.expect_ident()?;
        let params = self.parse_param_list()?;
        match self.advance() {
            Some(token) if Self::keyword_matches(&token, "WITH") => {}
            _ => return Err(Error::InvalidArgument("query program: EVAL expects WITH")),
        }
        let with_sets = self.parse_ident_list()?;
        Ok(EvalDecl { name, params, with_sets })
    }

    fn parse_summarize(&mut self) -> Result<SummarizeDecl> {
        let attribute = self.expect_ident()?;
        self.expect_symbol('=')?;
        let name = self.expect_ident()?;
        let params = self.parse_param_list()?;
        self.expect_symbol(';')?;
        Ok(SummarizeDecl { attribute, name, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_program() {
        let source = r#"
            TERM sel "hello" : word ;
            SELECT sel ;
            EVAL BM25(k1=1.5, b=0.75, avgdoclen=10, doclen=doclen) WITH sel ;
            SUMMARIZE title = Attribute(attribute=title) ;
        "#;
        let program = Program::parse(source).unwrap();
        assert_eq!(program.terms.len(), 1);
        assert_eq!(program.terms[0].set, "sel");
        assert_eq!(program.terms[0].value, TermValueSpec::Literal("hello".to_owned()));
        assert_eq!(program.select_sets, vec!["sel".to_owned()]);
        assert_eq!(program.evals.len(), 1);
        assert_eq!(program.evals[0].name, "BM25");
        assert_eq!(program.evals[0].with_sets, vec!["sel".to_owned()]);
        assert_eq!(program.summarizers.len(), 1);
        assert_eq!(program.summarizers[0].attribute, "title");
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let source = r#"term sel "a" : word ; select sel ;"#;
        let program = Program::parse(source).unwrap();
        assert_eq!(program.terms.len(), 1);
        assert_eq!(program.select_sets, vec!["sel".to_owned()]);
    }

    #[test]
    fn restrict_accepts_several_sets() {
        let program = Program::parse("RESTRICT a, b, c ;").unwrap();
        assert_eq!(program.restrict_sets, vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]);
    }

    #[test]
    fn line_comments_are_skipped() {
        let source = "# a leading comment\nSELECT sel ;\n// another comment\n";
        let program = Program::parse(source).unwrap();
        assert_eq!(program.select_sets, vec!["sel".to_owned()]);
    }

    #[test]
    fn unterminated_string_is_rejected() {
        assert!(Program::parse("TERM sel \"oops : word ;").is_err());
    }

    #[test]
    fn unknown_statement_keyword_is_rejected() {
        assert!(Program::parse("BOGUS sel ;").is_err());
    }

    #[test]
    fn missing_semicolon_is_rejected() {
        assert!(Program::parse("SELECT sel").is_err());
    }
}
