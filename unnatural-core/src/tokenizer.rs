use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Surface used for the end of a logical line.
pub const NEWLINE: &str = "<NEWLINE>";
/// Surface used when the indentation level increases.
pub const INDENT: &str = "<INDENT>";
/// Surface used for each popped indentation level.
pub const DEDENT: &str = "<DEDENT>";

const TAB_SIZE: usize = 8;

const KEYWORDS: &[&str] = &[
	"False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
	"def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
	"in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
	"with", "yield",
];

/// Operators and delimiters, longest first so the scan is a longest match.
const OPERATORS: &[&str] = &[
	"**=", "//=", ">>=", "<<=", "...",
	"**", "//", ">>", "<<", "<=", ">=", "==", "!=", "->", ":=", "+=", "-=", "*=", "/=", "%=",
	"&=", "|=", "^=", "@=",
	"+", "-", "*", "/", "%", "@", "&", "|", "^", "~", "<", ">", "(", ")", "[", "]", "{", "}",
	",", ":", ";", ".", "=",
];

/// Language-defined category of a token.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
	Keyword,
	Name,
	Number,
	String,
	Operator,
	Newline,
	Indent,
	Dedent,
}

/// An immutable unit of source text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
	surface: String,
	kind: TokenKind,
}

impl Token {
	pub fn new(surface: impl Into<String>, kind: TokenKind) -> Self {
		Self { surface: surface.into(), kind }
	}

	/// Builds a token from a bare surface string, guessing its category.
	///
	/// Used when a caller hands over an already tokenized prefix
	/// (for instance a list of path segments) rather than source text.
	pub fn from_surface(surface: &str) -> Self {
		let kind = match surface {
			NEWLINE => TokenKind::Newline,
			INDENT => TokenKind::Indent,
			DEDENT => TokenKind::Dedent,
			s if KEYWORDS.contains(&s) => TokenKind::Keyword,
			s if OPERATORS.contains(&s) => TokenKind::Operator,
			s if s.starts_with(|c: char| c.is_ascii_digit()) => TokenKind::Number,
			s if s.ends_with(['"', '\'']) => TokenKind::String,
			_ => TokenKind::Name,
		};
		Self::new(surface, kind)
	}

	pub fn surface(&self) -> &str {
		&self.surface
	}

	pub fn kind(&self) -> TokenKind {
		self.kind
	}
}

/// Ordered tokens of one file or snippet.
pub type TokenSequence = Vec<Token>;

/// The input could not be lexed at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot tokenize at line {line}, column {column}: {reason}")]
pub struct TokenizeError {
	pub line: usize,
	pub column: usize,
	pub reason: String,
}

/// Converts source text into its token sequence.
///
/// `mid_line` tells whether the text stops at a cursor. When it does, nothing
/// is synthesized at the end and an unterminated trailing string becomes a
/// partial token. Otherwise the last logical line is closed with a newline,
/// open indentation is closed with dedents, and an unterminated string is an
/// error.
///
/// Syntactically invalid programs are fine (unbalanced brackets, bad dedents);
/// only characters no token can start with are rejected.
pub fn tokenize(text: &str, mid_line: bool) -> Result<TokenSequence, TokenizeError> {
	Lexer::new(text, mid_line).run()
}

struct Lexer {
	chars: Vec<char>,
	pos: usize,
	line: usize,
	column: usize,
	mid_line: bool,
	/// Open bracket depth; newlines inside brackets are insignificant.
	depth: usize,
	indents: Vec<usize>,
	at_line_start: bool,
	line_has_tokens: bool,
	tokens: TokenSequence,
}

impl Lexer {
	fn new(text: &str, mid_line: bool) -> Self {
		Self {
			chars: text.chars().collect(),
			pos: 0,
			line: 1,
			column: 1,
			mid_line,
			depth: 0,
			indents: vec![0],
			at_line_start: true,
			line_has_tokens: false,
			tokens: Vec::new(),
		}
	}

	fn peek(&self, offset: usize) -> Option<char> {
		self.chars.get(self.pos + offset).copied()
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek(0)?;
		self.pos += 1;
		if c == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
		Some(c)
	}

	fn error(&self, reason: impl Into<String>) -> TokenizeError {
		TokenizeError { line: self.line, column: self.column, reason: reason.into() }
	}

	fn push(&mut self, surface: impl Into<String>, kind: TokenKind) {
		self.tokens.push(Token::new(surface, kind));
		if !matches!(kind, TokenKind::Indent | TokenKind::Dedent) {
			self.line_has_tokens = true;
		}
	}

	fn run(mut self) -> Result<TokenSequence, TokenizeError> {
		while let Some(c) = self.peek(0) {
			if self.at_line_start && self.depth == 0 {
				self.indentation();
				continue;
			}

			match c {
				' ' | '\t' | '\x0c' => {
					self.bump();
				}
				'#' => {
					while self.peek(0).is_some_and(|c| c != '\n' && c != '\r') {
						self.bump();
					}
				}
				'\\' if matches!(self.peek(1), Some('\n') | Some('\r') | None) => {
					// Explicit line continuation
					self.bump();
					if self.peek(0) == Some('\r') {
						self.bump();
					}
					if self.peek(0) == Some('\n') {
						self.bump();
					}
				}
				'\r' | '\n' => self.end_of_line(),
				c if c.is_alphabetic() || c == '_' => self.word()?,
				c if c.is_ascii_digit() => self.number(),
				'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
				'\'' | '"' => self.string(self.pos)?,
				_ => self.operator()?,
			}
		}

		if !self.mid_line {
			if self.line_has_tokens {
				self.push(NEWLINE, TokenKind::Newline);
			}
			while self.indents.len() > 1 {
				self.indents.pop();
				self.push(DEDENT, TokenKind::Dedent);
			}
		}
		Ok(self.tokens)
	}

	/// Measures the indentation of a fresh line and emits indent/dedent tokens.
	///
	/// Blank and comment-only lines leave the indentation stack untouched.
	fn indentation(&mut self) {
		let mut width = 0;
		while let Some(c) = self.peek(0) {
			match c {
				' ' => width += 1,
				'\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
				'\x0c' => width = 0,
				_ => break,
			}
			self.bump();
		}
		self.at_line_start = false;

		match self.peek(0) {
			None | Some('\n') | Some('\r') | Some('#') => return,
			_ => (),
		}

		// Never empty: the base level 0 is not popped here
		let current = *self.indents.last().unwrap_or(&0);
		if width > current {
			self.indents.push(width);
			self.push(INDENT, TokenKind::Indent);
		} else {
			// Inconsistent dedents stop at the nearest enclosing level
			while self.indents.len() > 1 && self.indents.last().is_some_and(|&top| top > width) {
				self.indents.pop();
				self.push(DEDENT, TokenKind::Dedent);
			}
		}
	}

	fn end_of_line(&mut self) {
		if self.bump() == Some('\r') && self.peek(0) == Some('\n') {
			self.bump();
		}
		if self.depth == 0 {
			if self.line_has_tokens {
				self.push(NEWLINE, TokenKind::Newline);
				self.line_has_tokens = false;
			}
			self.at_line_start = true;
		}
	}

	fn word(&mut self) -> Result<(), TokenizeError> {
		let start = self.pos;
		while self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
			self.bump();
		}
		let word: String = self.chars[start..self.pos].iter().collect();

		if matches!(self.peek(0), Some('\'') | Some('"')) && is_string_prefix(&word) {
			return self.string(start);
		}

		let kind = if KEYWORDS.contains(&word.as_str()) { TokenKind::Keyword } else { TokenKind::Name };
		self.push(word, kind);
		Ok(())
	}

	fn number(&mut self) {
		let start = self.pos;
		let hex = self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X'));
		while let Some(c) = self.peek(0) {
			if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
				self.bump();
				if !hex && matches!(c, 'e' | 'E') && matches!(self.peek(0), Some('+') | Some('-')) {
					self.bump();
				}
			} else {
				break;
			}
		}
		let surface: String = self.chars[start..self.pos].iter().collect();
		self.push(surface, TokenKind::Number);
	}

	/// Lexes a string literal whose prefix (possibly empty) begins at `start`.
	fn string(&mut self, start: usize) -> Result<(), TokenizeError> {
		let (line, column) = (self.line, self.column);
		let quote = self.peek(0).unwrap_or('"');
		let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
		let delimiter = if triple { 3 } else { 1 };
		for _ in 0..delimiter {
			self.bump();
		}

		loop {
			match self.peek(0) {
				None => {
					if self.mid_line {
						let partial: String = self.chars[start..].iter().collect();
						self.push(partial, TokenKind::String);
						return Ok(());
					}
					return Err(TokenizeError {
						line,
						column,
						reason: "unterminated string literal".to_owned(),
					});
				}
				Some('\\') => {
					self.bump();
					self.bump();
				}
				Some('\n') | Some('\r') if !triple => {
					return Err(TokenizeError {
						line,
						column,
						reason: "unterminated string literal".to_owned(),
					});
				}
				Some(c) if c == quote
					&& (!triple || (self.peek(1) == Some(quote) && self.peek(2) == Some(quote))) =>
				{
					for _ in 0..delimiter {
						self.bump();
					}
					break;
				}
				Some(_) => {
					self.bump();
				}
			}
		}

		let surface: String = self.chars[start..self.pos].iter().collect();
		self.push(surface, TokenKind::String);
		Ok(())
	}

	fn operator(&mut self) -> Result<(), TokenizeError> {
		let rest = &self.chars[self.pos..];
		let matched = OPERATORS.iter().find(|op| {
			op.chars().count() <= rest.len() && op.chars().zip(rest.iter()).all(|(a, &b)| a == b)
		});

		let Some(op) = matched else {
			let c = rest.first().copied().unwrap_or_default();
			return Err(self.error(format!("unexpected character {c:?}")));
		};

		for _ in 0..op.chars().count() {
			self.bump();
		}
		match *op {
			"(" | "[" | "{" => self.depth += 1,
			")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
			_ => (),
		}
		self.push(*op, TokenKind::Operator);
		Ok(())
	}
}

/// String prefixes such as `r`, `b`, `f`, `rb`, `Fr` (case-insensitive).
fn is_string_prefix(word: &str) -> bool {
	let lower = word.to_ascii_lowercase();
	matches!(lower.as_str(), "r" | "u" | "b" | "f" | "br" | "rb" | "fr" | "rf")
}
