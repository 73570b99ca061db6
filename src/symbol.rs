//! Trading pair identifiers
//!
//! A symbol is a `BASE/QUOTE` pair such as `DIS/USDT`. Symbols are fixed at
//! startup from configuration and used as keys everywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Symbol parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    /// Missing the `/` separator or more than one of them
    #[error("symbol must look like BASE/QUOTE: {0:?}")]
    Malformed(String),
    /// One side of the pair is empty
    #[error("symbol has an empty base or quote: {0:?}")]
    EmptyPart(String),
}

/// A validated `BASE/QUOTE` trading pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalise a symbol (upper-cased, surrounding whitespace trimmed)
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let normalised = raw.trim().to_uppercase();
        let mut parts = normalised.split('/');
        let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => (base, quote),
            _ => return Err(SymbolError::Malformed(raw.to_string())),
        };
        if base.is_empty() || quote.is_empty() {
            return Err(SymbolError::EmptyPart(raw.to_string()));
        }
        Ok(Self(normalised))
    }

    /// Base asset, e.g. `DIS`
    pub fn base(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// Quote asset, e.g. `USDT`
    pub fn quote(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
