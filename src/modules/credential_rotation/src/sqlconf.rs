/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/sqlconf.rs
*
* Reading and rewriting the credential assignments of OpenEMR's
* `sites/<site>/sqlconf.php`:
*
*   $host   = 'db.example.com';
*   $port   = '3306';
*   $login  = 'openemr_a';
*   $pass   = 'secret';
*   $dbase  = 'openemr';
*
* Only the quoted values of those five assignments are touched; every other
* byte of the file (comments, `$disable_utf8_flag`, `$config`, ...) is kept.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::SqlConfError;
use crate::secrets::SlotCredentials;
use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

const FIELDS: [&str; 5] = ["host", "port", "login", "pass", "dbase"];

fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // A single-quoted PHP literal: anything but quote/backslash, or an escape pair.
        Regex::new(r"(?m)^[ \t]*\$(host|port|login|pass|dbase)[ \t]*=[ \t]*'((?:[^'\\]|\\.)*)'[ \t]*;")
            .expect("assignment pattern is a valid regex")
    })
}

/// Credentials currently in effect according to `sqlconf.php`.
#[derive(Clone, PartialEq, Eq)]
pub struct SqlConf {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub pass: String,
    pub dbase: String,
}

impl fmt::Debug for SqlConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlConf")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("pass", &"<redacted>")
            .field("dbase", &self.dbase)
            .finish()
    }
}

/// Byte ranges of the five quoted values, in `FIELDS` order.
fn locate(contents: &str) -> Result<[(Range<usize>, String); 5], SqlConfError> {
    let mut found: [Option<(Range<usize>, String)>; 5] = Default::default();

    for caps in assignment_pattern().captures_iter(contents) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let Some(index) = FIELDS.iter().position(|f| *f == name.as_str()) else {
            continue;
        };
        if found[index].is_some() {
            return Err(SqlConfError::DuplicateField { field: FIELDS[index] });
        }
        found[index] = Some((value.range(), unescape(value.as_str())));
    }

    let mut located: Vec<(Range<usize>, String)> = Vec::with_capacity(FIELDS.len());
    for (index, slot) in found.into_iter().enumerate() {
        located.push(slot.ok_or(SqlConfError::MissingField(FIELDS[index]))?);
    }
    located
        .try_into()
        .map_err(|_| SqlConfError::MissingField(FIELDS[0]))
}

impl SqlConf {
    pub fn parse(contents: &str) -> Result<Self, SqlConfError> {
        let [host, port, login, pass, dbase] = locate(contents)?;
        let port_value = port.1;
        let port = port_value
            .trim()
            .parse()
            .map_err(|_| SqlConfError::InvalidPort(port_value.clone()))?;

        Ok(Self {
            host: host.1,
            port,
            login: login.1,
            pass: pass.1,
            dbase: dbase.1,
        })
    }

    /// True when the file authenticates as this slot's user with its password.
    pub fn matches(&self, creds: &SlotCredentials) -> bool {
        self.login == creds.username && self.pass == creds.password
    }

    /// The on-disk tuple expressed as slot credentials.
    pub fn to_slot_credentials(&self) -> SlotCredentials {
        SlotCredentials {
            username: self.login.clone(),
            password: self.pass.clone(),
            host: self.host.clone(),
            port: self.port,
            dbname: self.dbase.clone(),
        }
    }
}

/// Returns `original` with the five credential values replaced by `creds`.
pub fn render(original: &str, creds: &SlotCredentials) -> Result<String, SqlConfError> {
    let located = locate(original)?;
    let port = creds.port.to_string();
    let replacements = [&creds.host, &port, &creds.username, &creds.password, &creds.dbname];

    let mut edits: Vec<(Range<usize>, String)> = located
        .into_iter()
        .zip(replacements)
        .map(|((range, _), value)| (range, escape(value)))
        .collect();
    edits.sort_by_key(|(range, _)| range.start);

    let mut rendered = String::with_capacity(original.len() + 64);
    let mut cursor = 0;
    for (range, value) in edits {
        rendered.push_str(&original[cursor..range.start]);
        rendered.push_str(&value);
        cursor = range.end;
    }
    rendered.push_str(&original[cursor..]);
    Ok(rendered)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '\'')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<?php\n\
//  OpenEMR\n\
//  MySQL Config\n\
//  $login = 'commented-out';\n\
\n\
global $disable_utf8_flag;\n\
$disable_utf8_flag = false;\n\
\n\
$host\t= 'db-a.cluster.local';\n\
$port\t= '3306';\n\
$login\t= 'openemr_a';\n\
$pass\t= 'old-a';\n\
$dbase\t= 'openemr';\n\
$db_encoding = 'utf8mb4';\n\
\n\
$config = 1; /////////////\n\
?>\n";

    fn slot_b() -> SlotCredentials {
        SlotCredentials {
            username: "openemr_b".to_string(),
            password: "n3w'pa\\ss".to_string(),
            host: "db-b.cluster.local".to_string(),
            port: 3307,
            dbname: "openemr".to_string(),
        }
    }

    #[test]
    fn test_parse_reads_credential_fields() {
        let conf = SqlConf::parse(SAMPLE).unwrap();
        assert_eq!(conf.host, "db-a.cluster.local");
        assert_eq!(conf.port, 3306);
        assert_eq!(conf.login, "openemr_a");
        assert_eq!(conf.pass, "old-a");
        assert_eq!(conf.dbase, "openemr");
    }

    #[test]
    fn test_render_only_touches_credential_values() {
        let rendered = render(SAMPLE, &slot_b()).unwrap();

        assert!(rendered.contains("$login\t= 'openemr_b';"));
        assert!(rendered.contains("$pass\t= 'n3w\\'pa\\\\ss';"));
        assert!(rendered.contains("$port\t= '3307';"));
        assert!(rendered.contains("//  $login = 'commented-out';"));
        assert!(rendered.contains("$db_encoding = 'utf8mb4';"));
        assert!(rendered.ends_with("$config = 1; /////////////\n?>\n"));

        let reparsed = SqlConf::parse(&rendered).unwrap();
        assert_eq!(reparsed.to_slot_credentials(), slot_b());
    }

    #[test]
    fn test_render_back_to_original_values_is_byte_identical() {
        let original = SqlConf::parse(SAMPLE).unwrap().to_slot_credentials();
        let flipped = render(SAMPLE, &slot_b()).unwrap();
        assert_eq!(render(&flipped, &original).unwrap(), SAMPLE);
    }

    #[test]
    fn test_matches_compares_login_and_password() {
        let conf = SqlConf::parse(SAMPLE).unwrap();
        let mut creds = conf.to_slot_credentials();
        creds.host = "another-endpoint".to_string();
        assert!(conf.matches(&creds));

        creds.password = "placeholder".to_string();
        assert!(!conf.matches(&creds));
    }

    #[test]
    fn test_missing_and_duplicate_fields_are_rejected() {
        let without_pass = SAMPLE.replace("$pass\t= 'old-a';\n", "");
        assert!(matches!(
            SqlConf::parse(&without_pass),
            Err(SqlConfError::MissingField("pass"))
        ));

        let doubled = format!("{}$login = 'again';\n", SAMPLE);
        assert!(matches!(
            SqlConf::parse(&doubled),
            Err(SqlConfError::DuplicateField { field: "login" })
        ));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let bad_port = SAMPLE.replace("'3306'", "'mysql'");
        assert!(matches!(SqlConf::parse(&bad_port), Err(SqlConfError::InvalidPort(p)) if p == "mysql"));
    }
}
