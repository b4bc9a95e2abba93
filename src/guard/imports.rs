//! Syntax-only scanner for Go package clauses and import declarations.
//!
//! Only the leading `package` clause and the `import` declarations that
//! follow it are read. Scanning stops at the first other token, so the body
//! of the file may be arbitrarily invalid.

use std::fmt;

/// Characters that may never appear in an import path.
const ILLEGAL_IMPORT_CHARS: &str = "!\"#$%&'()*,:;<=>?[\\]^{|}`\u{FFFD}";

/// Import paths declared by one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSet {
    package: String,
    paths: Vec<String>,
}

impl ImportSet {
    /// Name from the package clause.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Import paths in declaration order, without duplicates.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Check whether the file declares a runnable program.
    pub fn is_main(&self) -> bool {
        self.package == "main"
    }

    fn insert(&mut self, path: String) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }
}

/// A syntax error in the package clause or import declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    /// 1-based line number.
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.line, self.message)
    }
}

impl std::error::Error for ScanError {}

/// Read the package clause and every import declaration of a Go source file.
pub fn scan_imports(source: &str) -> Result<ImportSet, ScanError> {
    let mut scanner = Scanner::new(source);
    let mut set = ImportSet {
        package: scanner.package_clause()?,
        paths: Vec::new(),
    };
    loop {
        scanner.skip_trivia()?;
        let checkpoint = scanner.checkpoint();
        if scanner.ident() != Some("import") {
            scanner.restore(checkpoint);
            break;
        }
        scanner.skip_trivia()?;
        if scanner.eat('(') {
            loop {
                scanner.skip_trivia()?;
                if scanner.eat(')') {
                    break;
                }
                if scanner.at_end() {
                    return Err(scanner.error("expected ')' to close import group"));
                }
                set.insert(scanner.import_spec()?);
            }
        } else {
            set.insert(scanner.import_spec()?);
        }
    }
    Ok(set)
}

/// Read only the package name of a Go source file.
pub fn package_clause(source: &str) -> Result<String, ScanError> {
    Scanner::new(source).package_clause()
}

/// Check whether Go source declares `package main`.
///
/// Invalid UTF-8 or a malformed package clause is not a program.
pub fn is_package_main(source: &[u8]) -> bool {
    std::str::from_utf8(source)
        .ok()
        .and_then(|src| package_clause(src).ok())
        .is_some_and(|name| name == "main")
}

/// Decode the body of a double-quoted Go string literal (without the quotes).
pub(crate) fn unquote(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars.next().ok_or("invalid escape at end of string")?;
        match escaped {
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{b}'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'x' => out.push(hex_escape(&mut chars, 2)?),
            'u' => out.push(hex_escape(&mut chars, 4)?),
            'U' => out.push(hex_escape(&mut chars, 8)?),
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let digit = chars
                        .next()
                        .and_then(|d| d.to_digit(8))
                        .ok_or("invalid octal escape")?;
                    value = value * 8 + digit;
                }
                out.push(char::from_u32(value).ok_or("invalid octal escape")?);
            }
            other => return Err(format!("unknown escape sequence \\{other}")),
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<char, String> {
    let mut value = 0u32;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|d| d.to_digit(16))
            .ok_or("invalid hex escape")?;
        value = value * 16 + digit;
    }
    char::from_u32(value).ok_or_else(|| "escape is not a valid code point".to_string())
}

fn is_valid_import_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| !c.is_control() && !c.is_whitespace() && !ILLEGAL_IMPORT_CHARS.contains(c))
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        let src = src.strip_prefix('\u{feff}').unwrap_or(src);
        Self { src, pos: 0, line: 1 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn checkpoint(&self) -> (usize, usize) {
        (self.pos, self.line)
    }

    fn restore(&mut self, (pos, line): (usize, usize)) {
        self.pos = pos;
        self.line = line;
    }

    fn error(&self, message: impl Into<String>) -> ScanError {
        ScanError {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self, len: usize) {
        let consumed = &self.src[self.pos..self.pos + len];
        self.line += consumed.matches('\n').count();
        self.pos += len;
    }

    fn eat(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.bump(c.len_utf8());
            true
        } else {
            false
        }
    }

    /// Skip whitespace, comments and semicolons.
    fn skip_trivia(&mut self) -> Result<(), ScanError> {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.bump(len);
            } else if rest.starts_with("/*") {
                let len = rest[2..]
                    .find("*/")
                    .ok_or_else(|| self.error("comment not terminated"))?;
                self.bump(len + 4);
            } else if let Some(c) = rest.chars().next().filter(|c| c.is_whitespace() || *c == ';') {
                self.bump(c.len_utf8());
            } else {
                return Ok(());
            }
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let first = rest.chars().next()?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map_or(rest.len(), |(idx, _)| idx);
        self.bump(len);
        Some(&rest[..len])
    }

    fn package_clause(&mut self) -> Result<String, ScanError> {
        self.skip_trivia()?;
        if self.ident() != Some("package") {
            return Err(self.error("expected 'package'"));
        }
        self.skip_trivia()?;
        match self.ident() {
            Some("_") => Err(self.error("invalid package name _")),
            Some(name) => Ok(name.to_string()),
            None => Err(self.error("expected package name")),
        }
    }

    /// `[name | . | _] "path"`
    fn import_spec(&mut self) -> Result<String, ScanError> {
        if !self.eat('.') {
            self.ident();
        }
        self.skip_trivia()?;
        let line = self.line;
        let path = self.string_lit()?;
        if !is_valid_import_path(&path) {
            return Err(ScanError {
                line,
                message: format!("invalid import path: {path:?}"),
            });
        }
        Ok(path)
    }

    fn string_lit(&mut self) -> Result<String, ScanError> {
        let rest = self.rest();
        if let Some(body) = rest.strip_prefix('`') {
            let end = body
                .find('`')
                .ok_or_else(|| self.error("raw string literal not terminated"))?;
            let value = body[..end].replace('\r', "");
            self.bump(end + 2);
            return Ok(value);
        }
        if let Some(body) = rest.strip_prefix('"') {
            let mut escaped = false;
            for (idx, c) in body.char_indices() {
                match c {
                    '\n' => break,
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => {
                        let value = unquote(&body[..idx]).map_err(|e| self.error(e))?;
                        self.bump(idx + 2);
                        return Ok(value);
                    }
                    _ => escaped = false,
                }
            }
            return Err(self.error("string literal not terminated"));
        }
        Err(self.error("expected import path string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_grouped_imports() {
        let src = r#"// Package main does things.
package main

import "fmt"

import (
	"strings"
	str "strconv"
	. "math"
	_ "embed"
	"fmt"
)

func main() { fmt.Println(strings.ToUpper("hi")) }
"#;
        let set = scan_imports(src).unwrap();
        assert!(set.is_main());
        assert_eq!(set.paths(), ["fmt", "strings", "strconv", "math", "embed"]);
    }

    #[test]
    fn test_tolerates_invalid_body() {
        let src = "package main\nimport \"fmt\"\nfunc main( {{{ this is not go\nimport \"os/exec\"\n";
        let set = scan_imports(src).unwrap();
        assert_eq!(set.paths(), ["fmt"]);
    }

    #[test]
    fn test_comments_and_semicolons() {
        let src = "/* header */ package lib; import /* c */ (\"a/b\"; `c/d`) // trailing\nvar x = 1";
        let set = scan_imports(src).unwrap();
        assert_eq!(set.package(), "lib");
        assert!(!set.is_main());
        assert_eq!(set.paths(), ["a/b", "c/d"]);
    }

    #[test]
    fn test_escaped_import_path() {
        let set = scan_imports("package main\nimport \"os\\x2fexec\"\n").unwrap();
        assert_eq!(set.paths(), ["os/exec"]);
    }

    #[test]
    fn test_identifier_starting_with_import_is_not_a_declaration() {
        let set = scan_imports("package main\nimportant := 1\n").unwrap();
        assert!(set.paths().is_empty());
    }

    #[test]
    fn test_errors() {
        assert!(scan_imports("").is_err());
        assert!(scan_imports("not go code").is_err());
        assert!(scan_imports("package _").is_err());

        let err = scan_imports("package main\n\nimport (\n\t\"fmt\"\n").unwrap_err();
        assert!(err.message.contains("')'"));

        let err = scan_imports("package main\nimport \"has space\"\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("invalid import path"));

        assert!(scan_imports("package main\nimport \"fmt\n\"").is_err());
        assert!(scan_imports("package main\nimport \"\"").is_err());
        assert!(scan_imports("package main /* open").is_err());
    }

    #[test]
    fn test_is_package_main() {
        assert!(is_package_main(b"package main\n"));
        assert!(is_package_main(
            b"package main\n\nimport \"fmt\"\n\nfunc main() { fmt.Println(\"hi\") }\n"
        ));
        assert!(!is_package_main(b"package foo\n"));
        assert!(!is_package_main(b""));
        assert!(!is_package_main(b"not go code"));
        assert!(!is_package_main(b"package mainly\n"));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r"a\tb\\cé\101").unwrap(), "a\tb\\c\u{e9}A");
        assert!(unquote(r"\q").is_err());
        assert!(unquote("trailing\\").is_err());
    }
}
