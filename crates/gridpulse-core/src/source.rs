use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::http_client::HttpAuth;
use crate::ValidationError;

/// Provider payload families understood by the bundled adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Aemo,
    Exchange,
    GridOperator,
    Generic,
}

impl ProviderKind {
    pub const ALL: [Self; 4] = [Self::Aemo, Self::Exchange, Self::GridOperator, Self::Generic];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aemo => "aemo",
            Self::Exchange => "exchange",
            Self::GridOperator => "grid_operator",
            Self::Generic => "generic",
        }
    }

    /// Authentication scheme each provider family expects for an API key.
    pub fn auth_for_key(self, key: Option<String>) -> HttpAuth {
        let Some(key) = key.filter(|key| !key.trim().is_empty()) else {
            return HttpAuth::None;
        };

        match self {
            Self::Aemo => HttpAuth::Header {
                name: String::from("Ocp-Apim-Subscription-Key"),
                value: key,
            },
            Self::Exchange => HttpAuth::QueryParam {
                name: String::from("api_key"),
                value: key,
            },
            Self::GridOperator => HttpAuth::Header {
                name: String::from("X-API-Key"),
                value: key,
            },
            Self::Generic => HttpAuth::BearerToken(key),
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "aemo" => Ok(Self::Aemo),
            "exchange" => Ok(Self::Exchange),
            "grid_operator" => Ok(Self::GridOperator),
            "generic" => Ok(Self::Generic),
            other => Err(ValidationError::InvalidProviderKind {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_labels_leniently() {
        assert_eq!("grid-operator".parse::<ProviderKind>(), Ok(ProviderKind::GridOperator));
        assert_eq!(" AEMO ".parse::<ProviderKind>(), Ok(ProviderKind::Aemo));
        assert!(matches!(
            "scada".parse::<ProviderKind>(),
            Err(ValidationError::InvalidProviderKind { .. })
        ));
    }

    #[test]
    fn blank_key_means_no_auth() {
        assert_eq!(
            ProviderKind::Generic.auth_for_key(Some(String::from("  "))),
            HttpAuth::None
        );
        assert_eq!(
            ProviderKind::Generic.auth_for_key(Some(String::from("tok"))),
            HttpAuth::BearerToken(String::from("tok"))
        );
    }
}
