use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const SUFFIX_TOKENS: [&str; 3] = ["limited", "ltd", "ipo"];

/// Join key between exchange IPO rows and grey-market quotes.
///
/// Lower-cased with whitespace collapsed, and trailing `Limited`/`Ltd`/`IPO`
/// tokens removed (a trailing `.` or `,` on those tokens is ignored), so
/// `"Demo Energy Ltd."` and `"demo  energy limited IPO"` share a key.
/// Matching on the key is exact; there is no fuzzy comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyKey(String);

impl CompanyKey {
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        let lowered = name.to_lowercase();
        let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(ValidationError::EmptyCompanyName);
        }

        while tokens.len() > 1 {
            let last = tokens[tokens.len() - 1].trim_end_matches(['.', ',']);
            if SUFFIX_TOKENS.contains(&last) {
                tokens.pop();
            } else {
                break;
            }
        }

        Ok(Self(tokens.join(" ")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CompanyKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for CompanyKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CompanyKey> for String {
    fn from(value: CompanyKey) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_legal_suffixes() {
        let a = CompanyKey::parse("Demo Energy Ltd.").expect("key");
        let b = CompanyKey::parse("  demo   ENERGY Limited IPO").expect("key");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "demo energy");
    }

    #[test]
    fn keeps_inner_tokens() {
        let key = CompanyKey::parse("Ltd Holdings Limited").expect("key");
        assert_eq!(key.as_str(), "ltd holdings");
    }

    #[test]
    fn never_strips_the_only_token() {
        let key = CompanyKey::parse("IPO").expect("key");
        assert_eq!(key.as_str(), "ipo");
    }

    #[test]
    fn rejects_blank_names() {
        assert_eq!(
            CompanyKey::parse("   "),
            Err(ValidationError::EmptyCompanyName)
        );
    }
}
