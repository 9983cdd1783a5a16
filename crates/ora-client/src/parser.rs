//! SQL scanner that classifies a statement and extracts its bind names.
//!
//! Bind names follow the server's rules:
//! - quoted names (`:"my bind"`) may contain any character and are kept
//!   verbatim;
//! - unquoted names start with a letter, may contain letters, digits, `_`,
//!   `$` and `#`, and are upper-cased;
//! - numeric names (`:1`) are kept as written.
//!
//! Text inside string literals, quoted identifiers, `q'[...]'` strings and
//! comments is skipped. A colon directly after a string literal belongs to
//! JSON constant syntax and is not a bind.

use crate::statement::StatementKind;

/// A bind placeholder found in the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedBind {
    pub name: String,
    pub is_return_bind: bool,
}

/// Result of scanning a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedSql {
    pub kind: StatementKind,
    pub is_returning: bool,
    pub binds: Vec<ParsedBind>,
}

/// Classify a statement by its first keyword.
pub(crate) fn classify(keyword: &str) -> StatementKind {
    match keyword {
        "DECLARE" | "CALL" | "BEGIN" => StatementKind::PlSql,
        "SELECT" | "WITH" => StatementKind::Query,
        "INSERT" | "UPDATE" | "DELETE" | "MERGE" => StatementKind::Dml,
        "ALTER" | "CREATE" | "DROP" | "ANALYZE" | "AUDIT" | "COMMENT" | "GRANT" | "REVOKE"
        | "TRUNCATE" => StatementKind::Ddl,
        "COMMIT" | "ROLLBACK" => StatementKind::TransactionControl,
        _ => StatementKind::Unknown,
    }
}

/// Scan `sql`.
pub(crate) fn parse(sql: &str) -> ParsedSql {
    let mut parser = Parser {
        chars: sql.chars().collect(),
        pos: 0,
        kind: None,
        returning_keyword_found: false,
        is_returning: false,
        binds: Vec::new(),
    };
    parser.run();
    ParsedSql {
        kind: parser.kind.unwrap_or(StatementKind::Unknown),
        is_returning: parser.is_returning,
        binds: parser.binds,
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    kind: Option<StatementKind>,
    returning_keyword_found: bool,
    is_returning: bool,
    binds: Vec<ParsedBind>,
}

impl Parser {
    fn run(&mut self) {
        let mut last_was_string = false;
        let mut last_was_alpha = false;
        let mut last_ch = '\0';
        let mut word_start = 0;

        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            let is_alpha = ch.is_alphabetic();
            if is_alpha && !last_was_alpha {
                word_start = self.pos;
            } else if !is_alpha && last_was_alpha && self.on_word(word_start, self.pos) {
                return;
            }

            if ch == '\'' {
                last_was_string = true;
                if last_ch == 'q' || last_ch == 'Q' {
                    self.skip_qstring();
                } else {
                    self.skip_quoted('\'');
                }
            } else if !ch.is_whitespace() {
                match ch {
                    '-' => self.skip_single_line_comment(),
                    '/' => self.skip_multi_line_comment(),
                    '"' => self.skip_quoted('"'),
                    ':' if !last_was_string => self.parse_bind_name(),
                    _ => {}
                }
                last_was_string = false;
            }

            self.pos += 1;
            last_was_alpha = is_alpha;
            last_ch = ch;
        }

        if last_was_alpha {
            self.on_word(word_start, self.chars.len());
        }
    }

    /// Handle a completed word. Returns `true` when scanning should stop.
    fn on_word(&mut self, start: usize, end: usize) -> bool {
        let word: String = self.chars[start..end].iter().collect::<String>().to_uppercase();
        match self.kind {
            None => {
                let kind = classify(&word);
                self.kind = Some(kind);
                kind == StatementKind::Ddl
            }
            Some(StatementKind::Dml) if !self.returning_keyword_found => {
                if word == "RETURNING" || word == "RETURN" {
                    self.returning_keyword_found = true;
                }
                false
            }
            _ => {
                if self.returning_keyword_found && word == "INTO" {
                    self.is_returning = true;
                }
                false
            }
        }
    }

    fn add_bind(&mut self, name: String) {
        let plsql = self.kind == Some(StatementKind::PlSql);
        if plsql && self.binds.iter().any(|b| b.name == name) {
            return;
        }
        self.binds.push(ParsedBind {
            name,
            is_return_bind: self.is_returning,
        });
    }

    fn parse_bind_name(&mut self) {
        let mut quoted = false;
        let mut digits_only = false;
        let mut in_bind = false;
        let mut start = 0;
        let mut pos = self.pos + 1;

        while pos < self.chars.len() {
            let ch = self.chars[pos];
            if !in_bind {
                if ch.is_whitespace() {
                    pos += 1;
                    continue;
                } else if ch == '"' {
                    quoted = true;
                } else if ch.is_numeric() {
                    digits_only = true;
                } else if !ch.is_alphabetic() {
                    return;
                }
                in_bind = true;
                start = pos;
            } else if digits_only && !ch.is_numeric() {
                break;
            } else if quoted && ch == '"' {
                break;
            } else if !digits_only
                && !quoted
                && !ch.is_alphanumeric()
                && !matches!(ch, '$' | '_' | '#')
            {
                break;
            }
            pos += 1;
        }

        if !in_bind {
            return;
        }
        let name = if quoted {
            self.chars[start + 1..pos].iter().collect()
        } else if digits_only {
            self.chars[start..pos].iter().collect()
        } else {
            self.chars[start..pos].iter().collect::<String>().to_uppercase()
        };
        // resume on the closing quote, or on the last character of the name
        self.pos = if quoted && pos < self.chars.len() {
            pos
        } else {
            pos - 1
        };
        self.add_bind(name);
    }

    fn skip_quoted(&mut self, sep: char) {
        self.pos += 1;
        while self.pos < self.chars.len() && self.chars[self.pos] != sep {
            self.pos += 1;
        }
    }

    fn skip_qstring(&mut self) {
        self.pos += 1;
        let Some(&open) = self.chars.get(self.pos) else {
            return;
        };
        let sep = match open {
            '[' => ']',
            '{' => '}',
            '(' => ')',
            '<' => '>',
            other => other,
        };
        self.pos += 1;
        let mut exiting = false;
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            if !exiting && ch == sep {
                exiting = true;
            } else if exiting {
                if ch == '\'' {
                    return;
                } else if ch != sep {
                    exiting = false;
                }
            }
            self.pos += 1;
        }
    }

    fn skip_single_line_comment(&mut self) {
        if self.chars.get(self.pos + 1) != Some(&'-') {
            return;
        }
        let mut pos = self.pos + 2;
        while pos < self.chars.len() && self.chars[pos] != '\n' {
            pos += 1;
        }
        self.pos = pos.min(self.chars.len() - 1);
    }

    fn skip_multi_line_comment(&mut self) {
        if self.chars.get(self.pos + 1) != Some(&'*') {
            return;
        }
        let mut pos = self.pos + 2;
        while pos + 1 < self.chars.len() {
            if self.chars[pos] == '*' && self.chars[pos + 1] == '/' {
                self.pos = pos + 1;
                return;
            }
            pos += 1;
        }
        self.pos = self.chars.len() - 1;
    }
}
