//! Member name resolution: host member -> stored field name.

use super::ast::MemberRef;
use crate::serializer::Serializer;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NamingConvention {
    #[default]
    #[serde(rename = "as-is")]
    AsIs,
    #[serde(rename = "camelCase")]
    CamelCase,
    #[serde(rename = "snake_case")]
    SnakeCase,
}

impl NamingConvention {
    #[must_use]
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::AsIs => name.to_string(),
            Self::CamelCase => camel_case(name),
            Self::SnakeCase => snake_case(name),
        }
    }
}

impl FromStr for NamingConvention {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "asis" | "default" | "none" => Ok(Self::AsIs),
            "camelcase" | "camel" => Ok(Self::CamelCase),
            "snakecase" | "snake" => Ok(Self::SnakeCase),
            other => Err(format!("unknown naming convention: {other}")),
        }
    }
}

/// Lower-cases the leading run of capitals: `ID` -> `id`, `URLPath` -> `urlPath`,
/// `BreweryId` -> `breweryId`.
fn camel_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len());
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_uppercase() {
            out.extend(&chars[i..]);
            return out;
        }
        let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
        if i > 0 && next_is_lower {
            out.extend(&chars[i..]);
            return out;
        }
        out.extend(c.to_lowercase());
    }
    out
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

pub trait MemberNameResolver: Send + Sync {
    fn resolve_name(&self, member: &MemberRef) -> String;
}

/// Derives names from a naming convention alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionNameResolver {
    pub convention: NamingConvention,
}

impl ConventionNameResolver {
    #[must_use]
    pub const fn new(convention: NamingConvention) -> Self {
        Self { convention }
    }
}

impl MemberNameResolver for ConventionNameResolver {
    fn resolve_name(&self, member: &MemberRef) -> String {
        self.convention.apply(&member.name)
    }
}

/// Defers to the serializer's member contract, caching answers per member.
pub struct SerializerNameResolver {
    serializer: Arc<dyn Serializer>,
    fallback: ConventionNameResolver,
    cache: RwLock<HashMap<MemberRef, String>>,
}

impl SerializerNameResolver {
    #[must_use]
    pub fn new(serializer: Arc<dyn Serializer>, fallback: NamingConvention) -> Self {
        Self {
            serializer,
            fallback: ConventionNameResolver::new(fallback),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl MemberNameResolver for SerializerNameResolver {
    fn resolve_name(&self, member: &MemberRef) -> String {
        if let Some(n) = self.cache.read().get(member) {
            return n.clone();
        }
        let resolved = self
            .serializer
            .member_contract()
            .and_then(|c| c.member_name(&member.declaring_type, &member.name))
            .unwrap_or_else(|| self.fallback.resolve_name(member));
        self.cache.write().insert(member.clone(), resolved.clone());
        resolved
    }
}

/// Pick the strategy for a serializer: its own contract when it has one, otherwise the
/// naming convention.
#[must_use]
pub fn resolver_for(
    serializer: &Arc<dyn Serializer>,
    convention: NamingConvention,
) -> Arc<dyn MemberNameResolver> {
    if serializer.member_contract().is_some() {
        Arc::new(SerializerNameResolver::new(serializer.clone(), convention))
    } else {
        Arc::new(ConventionNameResolver::new(convention))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{FieldContract, JsonSerializer};

    fn m(t: &str, n: &str) -> MemberRef {
        MemberRef { declaring_type: t.into(), name: n.into() }
    }

    #[test]
    fn camel_case_rules() {
        assert_eq!(camel_case("BreweryId"), "breweryId");
        assert_eq!(camel_case("ID"), "id");
        assert_eq!(camel_case("URLPath"), "urlPath");
        assert_eq!(camel_case("name"), "name");
        assert_eq!(camel_case(""), "");
    }

    #[test]
    fn snake_case_rules() {
        assert_eq!(snake_case("BreweryId"), "brewery_id");
        assert_eq!(snake_case("abv"), "abv");
        assert_eq!(snake_case("Updated2Date"), "updated2_date");
    }

    #[test]
    fn parse_conventions() {
        assert_eq!("camelCase".parse::<NamingConvention>().unwrap(), NamingConvention::CamelCase);
        assert_eq!("as-is".parse::<NamingConvention>().unwrap(), NamingConvention::AsIs);
        assert_eq!("snake_case".parse::<NamingConvention>().unwrap(), NamingConvention::SnakeCase);
        assert!("kebab".parse::<NamingConvention>().is_err());
    }

    #[test]
    fn resolver_strategy_follows_serializer() {
        let plain: Arc<dyn Serializer> = Arc::new(JsonSerializer::new());
        let r = resolver_for(&plain, NamingConvention::CamelCase);
        assert_eq!(r.resolve_name(&m("Beer", "Abv")), "abv");

        let contract = FieldContract::new(NamingConvention::AsIs).rename("Beer", "Abv", "alcohol");
        let with: Arc<dyn Serializer> = Arc::new(JsonSerializer::with_contract(contract));
        let r = resolver_for(&with, NamingConvention::CamelCase);
        assert_eq!(r.resolve_name(&m("Beer", "Abv")), "alcohol");
        // contract's own convention wins over the fallback
        assert_eq!(r.resolve_name(&m("Beer", "Name")), "Name");
        // cached answer is stable
        assert_eq!(r.resolve_name(&m("Beer", "Abv")), "alcohol");
    }
}
