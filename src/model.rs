use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "i64", into = "i64")]
pub enum Standing {
    Terrible,
    Bad,
    Neutral,
    Good,
    Excellent,
}

impl Standing {
    pub const ALL: [Standing; 5] = [
        Standing::Excellent,
        Standing::Good,
        Standing::Neutral,
        Standing::Bad,
        Standing::Terrible,
    ];

    pub fn value(self) -> i64 {
        match self {
            Standing::Terrible => -10,
            Standing::Bad => -5,
            Standing::Neutral => 0,
            Standing::Good => 5,
            Standing::Excellent => 10,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Standing::Terrible => "Terrible",
            Standing::Bad => "Bad",
            Standing::Neutral => "Neutral",
            Standing::Good => "Good",
            Standing::Excellent => "Excellent",
        }
    }

    /// Accepts either the display name (case-insensitive) or the numeric value.
    pub fn parse(input: &str) -> Option<Standing> {
        let trimmed = input.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return Standing::try_from(value).ok();
        }
        Standing::ALL
            .into_iter()
            .find(|standing| standing.name().eq_ignore_ascii_case(trimmed))
    }
}

impl TryFrom<i64> for Standing {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -10 => Ok(Standing::Terrible),
            -5 => Ok(Standing::Bad),
            0 => Ok(Standing::Neutral),
            5 => Ok(Standing::Good),
            10 => Ok(Standing::Excellent),
            other => Err(Error::InvalidStanding(other)),
        }
    }
}

impl From<Standing> for i64 {
    fn from(standing: Standing) -> Self {
        standing.value()
    }
}

impl std::fmt::Display for Standing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactRef {
    pub name: String,
    pub href: String,
}

/// One entry of a contact collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub contact: ContactRef,
    pub href: String,
    pub standing: Standing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
}

impl Contact {
    pub fn name(&self) -> &str {
        &self.contact.name
    }

    /// Returns a copy with `changes` applied; `self` is untouched.
    pub fn with_changes(&self, changes: &ContactChanges) -> Contact {
        let mut updated = self.clone();
        if let Some(standing) = changes.standing {
            updated.standing = standing;
        }
        if let Some(watched) = changes.watched {
            updated.watched = Some(watched);
        }
        updated
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactChanges {
    pub standing: Option<Standing>,
    pub watched: Option<bool>,
}

impl ContactChanges {
    pub fn standing(standing: Standing) -> Self {
        Self {
            standing: Some(standing),
            watched: None,
        }
    }

    pub fn watched(watched: bool) -> Self {
        Self {
            standing: None,
            watched: Some(watched),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactList {
    #[serde(default)]
    pub items: Vec<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Link>,
}

impl ContactList {
    pub fn lookup(&self, name: &str) -> Option<&Contact> {
        self.items.iter().find(|item| item.contact.name == name)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.contact.name == name)
    }

    /// Removes the first record named `name`, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactCreate {
    pub contact: ContactTarget,
    pub standing: Standing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactTarget {
    pub href: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiRootWire {
    pub character: Link,
    #[serde(default)]
    pub search: Option<Link>,
}

#[derive(Debug, Deserialize)]
pub struct CharacterWire {
    pub contacts: Link,
    pub notifications: Link,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResultsWire {
    #[serde(default)]
    pub items: Vec<SearchItemWire>,
}

#[derive(Debug, Deserialize)]
pub struct SearchItemWire {
    pub resource: Link,
}
