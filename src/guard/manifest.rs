//! Parser for `go.mod` dependency manifests.
//!
//! The parser understands the full directive set (`module`, `go`,
//! `toolchain`, `godebug`, `require`, `exclude`, `replace`, `retract`,
//! `tool`, `ignore`), single-line and block forms, quoted paths and
//! `//` comments. Unknown directives and malformed arguments are errors.

use std::fmt;

use super::imports::unquote;

/// A requirement from a `require` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Module path.
    pub path: String,
    /// Required version.
    pub version: String,
    /// Marked with an `// indirect` comment.
    pub indirect: bool,
}

/// A `replace` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Module path being replaced.
    pub old_path: String,
    /// Version being replaced, if restricted to one.
    pub old_version: Option<String>,
    /// Replacement module path or local directory.
    pub new_path: String,
    /// Replacement version; absent for local directories.
    pub new_version: Option<String>,
}

/// A parsed `go.mod` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Path from the `module` directive.
    pub module: Option<String>,
    /// Version from the `go` directive.
    pub go_version: Option<String>,
    /// Version from the `toolchain` directive.
    pub toolchain: Option<String>,
    /// Every `require` entry in file order.
    pub requirements: Vec<Requirement>,
    /// Every `replace` entry in file order.
    pub replacements: Vec<Replacement>,
    /// `(path, version)` pairs from `exclude` directives.
    pub exclusions: Vec<(String, String)>,
}

/// A syntax error in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestError {
    /// 1-based line number.
    pub line: usize,
    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.line, self.reason)
    }
}

impl std::error::Error for ManifestError {}

impl Manifest {
    /// Parse manifest text.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let mut manifest = Manifest::default();
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(idx, raw)| lex_line(raw, idx + 1));

        while let Some(line) = lines.next() {
            let line = line?;
            let Some((verb, args)) = line.tokens.split_first() else {
                continue;
            };
            if verb.quoted {
                return Err(line.error(format!("unexpected string {:?}", verb.text)));
            }
            let verb = verb.text.as_str();

            let opens_block = args.len() == 1 && args[0].is_bare("(");
            let empty_block = args.len() == 2 && args[0].is_bare("(") && args[1].is_bare(")");
            if opens_block || empty_block {
                if !BLOCK_VERBS.contains(&verb) {
                    return Err(line.error(format!("{verb} directive does not support blocks")));
                }
                if empty_block {
                    continue;
                }
                let mut closed = false;
                for entry in lines.by_ref() {
                    let entry = entry?;
                    if entry.tokens.len() == 1 && entry.tokens[0].is_bare(")") {
                        closed = true;
                        break;
                    }
                    if entry.tokens.is_empty() {
                        continue;
                    }
                    manifest.apply(verb, &entry)?;
                }
                if !closed {
                    return Err(line.error(format!("{verb} block is not terminated")));
                }
            } else {
                let directive = Line {
                    number: line.number,
                    tokens: args.to_vec(),
                    comment: line.comment.clone(),
                };
                manifest.apply(verb, &directive)?;
            }
        }
        Ok(manifest)
    }

    /// Requirements not marked `// indirect`.
    pub fn direct_requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter().filter(|r| !r.indirect)
    }

    /// Check whether any `replace` directive is present.
    pub fn has_replace(&self) -> bool {
        !self.replacements.is_empty()
    }

    fn apply(&mut self, verb: &str, line: &Line) -> Result<(), ManifestError> {
        let args: Vec<&str> = line.tokens.iter().map(|t| t.text.as_str()).collect();
        match verb {
            "module" => {
                if self.module.is_some() {
                    return Err(line.error("repeated module statement"));
                }
                let [path] = args[..] else {
                    return Err(line.error("usage: module module/path"));
                };
                check_path(line, path)?;
                self.module = Some(path.to_string());
            }
            "go" => {
                if self.go_version.is_some() {
                    return Err(line.error("repeated go statement"));
                }
                let [version] = args[..] else {
                    return Err(line.error("usage: go 1.23"));
                };
                if !is_go_version(version) {
                    return Err(line.error(format!("invalid go version '{version}'")));
                }
                self.go_version = Some(version.to_string());
            }
            "toolchain" => {
                if self.toolchain.is_some() {
                    return Err(line.error("repeated toolchain statement"));
                }
                let [name] = args[..] else {
                    return Err(line.error("usage: toolchain name"));
                };
                self.toolchain = Some(name.to_string());
            }
            "godebug" => {
                let [setting] = args[..] else {
                    return Err(line.error("usage: godebug key=value"));
                };
                if !setting.contains('=') {
                    return Err(line.error("usage: godebug key=value"));
                }
            }
            "require" | "exclude" => {
                let [path, version] = args[..] else {
                    return Err(line.error(format!("usage: {verb} module/path v1.2.3")));
                };
                check_path(line, path)?;
                check_version(line, version)?;
                if verb == "require" {
                    self.requirements.push(Requirement {
                        path: path.to_string(),
                        version: version.to_string(),
                        indirect: is_indirect(&line.comment),
                    });
                } else {
                    self.exclusions.push((path.to_string(), version.to_string()));
                }
            }
            "replace" => self.replacements.push(parse_replace(line, &args)?),
            "retract" => {
                if args.is_empty() {
                    return Err(line.error("usage: retract version or retract [low, high]"));
                }
            }
            "tool" | "ignore" => {
                let [path] = args[..] else {
                    return Err(line.error(format!("usage: {verb} path")));
                };
                check_path(line, path)?;
            }
            other => return Err(line.error(format!("unknown directive: {other}"))),
        }
        Ok(())
    }
}

const BLOCK_VERBS: &[&str] = &[
    "require", "exclude", "replace", "retract", "tool", "ignore", "godebug",
];

const REPLACE_USAGE: &str = "usage: replace module/path [v1.2.3] => other/module v1.4\n\t or replace module/path [v1.2.3] => ../local/directory";

fn parse_replace(line: &Line, args: &[&str]) -> Result<Replacement, ManifestError> {
    let arrow = args
        .iter()
        .position(|a| *a == "=>")
        .ok_or_else(|| line.error(REPLACE_USAGE))?;
    let (old, new) = (&args[..arrow], &args[arrow + 1..]);
    if old.is_empty() || old.len() > 2 || new.is_empty() || new.len() > 2 {
        return Err(line.error(REPLACE_USAGE));
    }
    check_path(line, old[0])?;
    if let Some(version) = old.get(1) {
        check_version(line, version)?;
    }
    if let Some(version) = new.get(1) {
        check_version(line, version)?;
    }
    Ok(Replacement {
        old_path: old[0].to_string(),
        old_version: old.get(1).map(|v| v.to_string()),
        new_path: new[0].to_string(),
        new_version: new.get(1).map(|v| v.to_string()),
    })
}

fn check_path(line: &Line, path: &str) -> Result<(), ManifestError> {
    if path.is_empty() || path.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(line.error(format!("malformed module path {path:?}")));
    }
    Ok(())
}

fn check_version(line: &Line, version: &str) -> Result<(), ManifestError> {
    let valid = version.strip_prefix('v').is_some_and(|rest| {
        rest.starts_with(|c: char| c.is_ascii_digit())
            && rest
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    });
    if !valid {
        return Err(line.error(format!("invalid module version {version:?}")));
    }
    Ok(())
}

fn is_go_version(version: &str) -> bool {
    version.starts_with(|c: char| c.is_ascii_digit())
        && version.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}

fn is_indirect(comment: &str) -> bool {
    let comment = comment.trim();
    comment == "indirect" || comment.starts_with("indirect;")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_bare(&self, text: &str) -> bool {
        !self.quoted && self.text == text
    }
}

#[derive(Debug, Clone)]
struct Line {
    number: usize,
    tokens: Vec<Token>,
    comment: String,
}

impl Line {
    fn error(&self, reason: impl Into<String>) -> ManifestError {
        ManifestError {
            line: self.number,
            reason: reason.into(),
        }
    }
}

fn lex_line(raw: &str, number: usize) -> Result<Line, ManifestError> {
    let mut line = Line {
        number,
        tokens: Vec::new(),
        comment: String::new(),
    };
    let mut rest = raw.trim_end_matches('\r');
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(comment) = rest.strip_prefix("//") {
            line.comment = comment.trim().to_string();
            break;
        }
        if let Some(body) = rest.strip_prefix('"') {
            let end = closing_quote(body).ok_or_else(|| line.error("unterminated quoted string"))?;
            let text = unquote(&body[..end]).map_err(|e| line.error(e))?;
            line.tokens.push(Token { text, quoted: true });
            rest = &body[end + 1..];
            continue;
        }
        if let Some(body) = rest.strip_prefix('`') {
            let end = body
                .find('`')
                .ok_or_else(|| line.error("unterminated raw string"))?;
            line.tokens.push(Token {
                text: body[..end].to_string(),
                quoted: true,
            });
            rest = &body[end + 1..];
            continue;
        }
        if rest.starts_with('(') || rest.starts_with(')') {
            line.tokens.push(Token {
                text: rest[..1].to_string(),
                quoted: false,
            });
            rest = &rest[1..];
            continue;
        }
        let len = rest
            .char_indices()
            .find(|&(idx, c)| {
                c.is_whitespace()
                    || matches!(c, '(' | ')' | '"' | '`')
                    || rest[idx..].starts_with("//")
            })
            .map_or(rest.len(), |(idx, _)| idx);
        line.tokens.push(Token {
            text: rest[..len].to_string(),
            quoted: false,
        });
        rest = &rest[len..];
    }
    Ok(line)
}

fn closing_quote(body: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in body.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(idx),
            _ => escaped = false,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let manifest = Manifest::parse("module m\n\ngo 1.22\n").unwrap();
        assert_eq!(manifest.module.as_deref(), Some("m"));
        assert_eq!(manifest.go_version.as_deref(), Some("1.22"));
        assert!(manifest.requirements.is_empty());
        assert!(!manifest.has_replace());
    }

    #[test]
    fn test_parse_require_block_with_indirect() {
        let content = r#"module example.com/app

go 1.22.0

toolchain go1.22.4

require github.com/expr-lang/expr v1.16.9

require (
	"golang.org/x/text" v0.16.0 // indirect
	github.com/google/go-cmp v0.6.0 // a note
)

exclude golang.org/x/net v0.1.0
retract [v1.0.0, v1.0.5] // broken
godebug default=go1.21
"#;
        let manifest = Manifest::parse(content).unwrap();
        assert_eq!(manifest.module.as_deref(), Some("example.com/app"));
        assert_eq!(manifest.toolchain.as_deref(), Some("go1.22.4"));
        assert_eq!(manifest.requirements.len(), 3);
        assert_eq!(manifest.requirements[1].path, "golang.org/x/text");
        assert!(manifest.requirements[1].indirect);
        assert!(!manifest.requirements[2].indirect);

        let direct: Vec<_> = manifest.direct_requirements().map(|r| r.path.as_str()).collect();
        assert_eq!(direct, ["github.com/expr-lang/expr", "github.com/google/go-cmp"]);
        assert_eq!(manifest.exclusions.len(), 1);
    }

    #[test]
    fn test_parse_replace_forms() {
        let content = "module m\nreplace example.com/a => ../a\nreplace (\n\texample.com/b v1.0.0 => example.com/c v1.2.0\n)\n";
        let manifest = Manifest::parse(content).unwrap();
        assert!(manifest.has_replace());
        assert_eq!(manifest.replacements.len(), 2);
        assert_eq!(manifest.replacements[0].new_path, "../a");
        assert_eq!(manifest.replacements[0].new_version, None);
        assert_eq!(manifest.replacements[1].old_version.as_deref(), Some("v1.0.0"));
    }

    #[test]
    fn test_malformed_manifests() {
        let cases = [
            ("module m\nbogus directive\n", 2, "unknown directive"),
            ("module a\nmodule b\n", 2, "repeated module"),
            ("module m\nrequire example.com/a\n", 2, "usage: require"),
            ("module m\nrequire example.com/a 1.0.0\n", 2, "invalid module version"),
            ("module m\nrequire (\n\texample.com/a v1.0.0\n", 2, "not terminated"),
            ("module m\ngo (\n)\n", 2, "does not support blocks"),
            ("module m\nreplace example.com/a ../a\n", 2, "usage: replace"),
            ("module \"m\n", 1, "unterminated"),
            ("module m\ngo latest\n", 2, "invalid go version"),
        ];
        for (content, line, reason) in cases {
            let err = Manifest::parse(content).unwrap_err();
            assert_eq!(err.line, line, "{content:?}");
            assert!(err.reason.contains(reason), "{content:?}: {}", err.reason);
        }
    }

    #[test]
    fn test_comments_and_crlf() {
        let manifest =
            Manifest::parse("// header comment\r\nmodule m // trailing\r\n\r\ngo 1.21rc1\r\n").unwrap();
        assert_eq!(manifest.module.as_deref(), Some("m"));
        assert_eq!(manifest.go_version.as_deref(), Some("1.21rc1"));
    }
}
