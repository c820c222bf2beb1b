//! Rule-based instruction normalization.
//!
//! A raw listing line is cut at the dialect's fixed column, stripped of size
//! qualifiers and split into operand strings. Each operand then runs through
//! a fixed precedence chain where later rules may overwrite earlier results:
//!
//! 1. `_…`, `L…` or all-digit → `VAL`, else `[…` → `MEM`
//! 2. `.text…` → `text`
//! 3. `0x…` → `byte`
//! 4. quoted → `char`
//! 5. two-char register/segment prefix → `REGSEG`
//! 6. synonym groups (exact match) → canonical key
//!
//! Every rule looks at the *current* token value, so the order matters and
//! must not be turned into independent matching.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Label / immediate class
pub const VAL: &str = "VAL";
/// Memory operand class
pub const MEM: &str = "MEM";
/// Section reference class
pub const TEXT: &str = "text";
/// Hex literal class
pub const BYTE: &str = "byte";
/// String/char literal class
pub const CHAR: &str = "char";
/// Register or segment class
pub const REGSEG: &str = "REGSEG";

/// One instruction line reduced to canonical tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLine
{
    /// 0-based line number in the source listing
    pub line: usize,

    /// Canonical tokens in operand order
    pub tokens: Vec<String>,
}

/// Token alphabet configuration shared by build and query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules
{
    /// Canonical key → literal spellings that collapse into it (ordered)
    pub synonyms: IndexMap<String, Vec<String>>,

    /// Two-character register/segment prefixes mapped to `REGSEG`
    pub regseg: Vec<String>,
}

/// Fixed-column listing layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingDialect
{
    /// Character column where the instruction text begins (raw line, tabs counted as one)
    pub column_offset: usize,

    /// Leading lines to skip before the first function/instruction
    pub header_lines: usize,

    /// Size qualifiers removed before operand splitting
    pub strip_keywords: Vec<String>,
}

impl Default for NormalizationRules
{
    fn default() -> Self
    {
        let group = |key: &str, members: &[&str]| {
            (
                key.to_string(),
                members
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>(),
            )
        };

        Self {
            synonyms: IndexMap::from([
                group("mov", &["movl", "movq", "movw", "movb", "movabs", "movzx", "movsx", "movsxd", "movzbl", "movsbl"]),
                group("jcc", &["je", "jne", "jz", "jnz", "jg", "jge", "jl", "jle", "ja", "jae", "jb", "jbe", "js", "jns"]),
                group("add", &["addl", "addq", "inc"]),
                group("sub", &["subl", "subq", "dec"]),
                group("push", &["pushl", "pushq"]),
                group("pop", &["popl", "popq"]),
                group("call", &["calll", "callq"]),
                group("ret", &["retl", "retq", "retn"]),
                group("lea", &["leal", "leaq"]),
                group("cmp", &["cmpl", "cmpq", "test", "testl", "testq"]),
            ]),
            regseg: [
                "ea", "eb", "ec", "ed", "es", "ax", "bx", "cx", "dx", "al", "ah", "bl", "bh", "dl",
                "dh", "sp", "bp", "si", "cs", "ds", "ss", "fs", "gs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for ListingDialect
{
    /// `objdump -d -M intel` layout: address and byte columns fill the
    /// first 32 characters, six banner lines precede the first function
    fn default() -> Self
    {
        Self {
            column_offset: 32,
            header_lines: 6,
            strip_keywords: ["BYTE", "WORD", "DWORD", "QWORD", "TBYTE", "XMMWORD", "PTR"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Deterministic line normalizer built once per configuration
#[derive(Debug, Clone)]
pub struct Normalizer
{
    rules: NormalizationRules,
    dialect: ListingDialect,
    keywords: HashSet<String>,
}

impl Normalizer
{
    pub fn new(
        rules: NormalizationRules,
        dialect: ListingDialect,
    ) -> Self
    {
        let keywords = dialect
            .strip_keywords
            .iter()
            .cloned()
            .collect();

        Self { rules, dialect, keywords }
    }

    pub fn dialect(&self) -> &ListingDialect
    {
        &self.dialect
    }

    pub fn rules(&self) -> &NormalizationRules
    {
        &self.rules
    }

    /// Identity of everything that shapes tokens (header length excluded,
    /// since query listings carry their own)
    pub fn rules_id(&self) -> String
    {
        let mut h = blake3::Hasher::new();
        for (key, members) in &self.rules.synonyms
        {
            h.update(key.as_bytes());
            h.update(&[1]);
            for m in members
            {
                h.update(m.as_bytes());
                h.update(&[0]);
            }
        }
        h.update(&[2]);
        for p in &self.rules.regseg
        {
            h.update(p.as_bytes());
            h.update(&[0]);
        }
        h.update(&[2]);
        h.update(&(self.dialect.column_offset as u64).to_le_bytes());
        for k in &self.dialect.strip_keywords
        {
            h.update(k.as_bytes());
            h.update(&[0]);
        }

        h.finalize()
            .to_hex()
            .as_str()[..16]
            .to_string()
    }

    /// Same rules and layout with a different header length
    pub fn with_header_lines(
        &self,
        header_lines: usize,
    ) -> Self
    {
        let dialect = ListingDialect { header_lines, ..self.dialect.clone() };
        Self::new(self.rules.clone(), dialect)
    }

    /// Classify one operand/mnemonic string. Empty input is dropped.
    pub fn normalize_operand(
        &self,
        operand: &str,
    ) -> Option<String>
    {
        if operand.is_empty()
        {
            return None;
        }

        let mut token = operand.to_string();

        if token.starts_with('_') || token.starts_with('L') || is_numeric(&token)
        {
            token = VAL.to_string();
        }
        else if token.starts_with('[')
        {
            token = MEM.to_string();
        }

        if token.starts_with(".text")
        {
            token = TEXT.to_string();
        }

        if token.starts_with("0x")
        {
            token = BYTE.to_string();
        }

        if token.starts_with('"') || token.starts_with('\'')
        {
            token = CHAR.to_string();
        }

        if self.has_regseg_prefix(&token)
        {
            token = REGSEG.to_string();
        }

        for (key, members) in &self.rules.synonyms
        {
            if members
                .iter()
                .any(|m| *m == token)
            {
                token = key.clone();
            }
        }

        Some(token)
    }

    /// Normalize one raw listing line.
    ///
    /// Returns `None` for lines no longer than the column offset (malformed,
    /// skipped by callers) and for lines that yield no tokens.
    pub fn normalize_line(
        &self,
        line_no: usize,
        raw: &str,
    ) -> Option<NormalizedLine>
    {
        let text = self.instruction_text(raw)?;

        let tokens: Vec<String> = text
            .replace('\t', " ")
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !self.keywords.contains(*part))
            .filter_map(|part| self.normalize_operand(part))
            .collect();

        if tokens.is_empty()
        {
            return None;
        }

        Some(NormalizedLine { line: line_no, tokens })
    }

    /// Slice the instruction text starting at the dialect column
    fn instruction_text<'a>(
        &self,
        raw: &'a str,
    ) -> Option<&'a str>
    {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let offset = self
            .dialect
            .column_offset;

        if offset == 0
        {
            return (!raw.is_empty()).then_some(raw);
        }

        // Byte index of the first character past the column offset
        let (start, _) = raw
            .char_indices()
            .nth(offset)?;

        Some(&raw[start..])
    }

    fn has_regseg_prefix(
        &self,
        token: &str,
    ) -> bool
    {
        let prefix: String = token
            .chars()
            .take(2)
            .collect();

        prefix
            .chars()
            .count()
            == 2
            && self
                .rules
                .regseg
                .iter()
                .any(|p| *p == prefix)
    }
}

fn is_numeric(s: &str) -> bool
{
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit())
}
