//! Chat-level gating applied before an update reaches the dialogs.
//!
//! This decides whether the bot talks to a chat at all. What a user may do
//! once admitted is decided by their [`lorebot_common::Role`].

use serde::{Deserialize, Serialize};

use crate::config::TelegramAccountConfig;

/// DM access policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    /// Anyone can DM the bot.
    #[default]
    Open,
    /// Only users on the allowlist.
    Allowlist,
    /// DMs disabled.
    Disabled,
}

/// Group access policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    /// Bot answers in every group it is added to.
    Open,
    /// Only in groups on the allowlist.
    Allowlist,
    #[default]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Dm,
    Group,
}

/// Reason an inbound update was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    DmsDisabled,
    NotOnAllowlist,
    GroupsDisabled,
    GroupNotOnAllowlist,
}

impl AccessDenied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DmsDisabled => "dms_disabled",
            Self::NotOnAllowlist => "not_on_allowlist",
            Self::GroupsDisabled => "groups_disabled",
            Self::GroupNotOnAllowlist => "group_not_on_allowlist",
        }
    }
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DmsDisabled => write!(f, "DMs are disabled"),
            Self::NotOnAllowlist => write!(f, "user not on allowlist"),
            Self::GroupsDisabled => write!(f, "groups are disabled"),
            Self::GroupNotOnAllowlist => write!(f, "group not on allowlist"),
        }
    }
}

pub struct AccessRequest<'a> {
    pub kind: ChatKind,
    pub peer_id: &'a str,
    pub username: Option<&'a str>,
    pub group_id: Option<&'a str>,
}

/// Allowlist policy and entries for one account.
pub struct AccessRules<'a> {
    pub dm_policy: &'a DmPolicy,
    pub allowlist: &'a [String],
    pub group_policy: &'a GroupPolicy,
    pub group_allowlist: &'a [String],
}

impl<'a> From<&'a TelegramAccountConfig> for AccessRules<'a> {
    fn from(c: &'a TelegramAccountConfig) -> Self {
        Self {
            dm_policy: &c.dm_policy,
            allowlist: &c.allowlist,
            group_policy: &c.group_policy,
            group_allowlist: &c.group_allowlist,
        }
    }
}

pub fn check_access(rules: &AccessRules<'_>, req: &AccessRequest<'_>) -> Result<(), AccessDenied> {
    match req.kind {
        ChatKind::Dm => match rules.dm_policy {
            DmPolicy::Disabled => Err(AccessDenied::DmsDisabled),
            DmPolicy::Open => Ok(()),
            // An explicit allowlist policy with no entries admits nobody.
            DmPolicy::Allowlist => {
                let listed = matches_any(req.peer_id, rules.allowlist)
                    || req
                        .username
                        .is_some_and(|u| matches_any(u.trim_start_matches('@'), rules.allowlist));
                if listed {
                    Ok(())
                } else {
                    Err(AccessDenied::NotOnAllowlist)
                }
            },
        },
        ChatKind::Group => match rules.group_policy {
            GroupPolicy::Disabled => Err(AccessDenied::GroupsDisabled),
            GroupPolicy::Open => Ok(()),
            GroupPolicy::Allowlist => {
                if req
                    .group_id
                    .is_some_and(|g| matches_any(g, rules.group_allowlist))
                {
                    Ok(())
                } else {
                    Err(AccessDenied::GroupNotOnAllowlist)
                }
            },
        },
    }
}

/// Case-insensitive match against allowlist patterns. `*` matches any run of
/// characters; a leading `@` on a pattern is ignored.
fn matches_any(peer: &str, patterns: &[String]) -> bool {
    let peer = peer.to_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim_start_matches('@').to_lowercase();
        if pattern.contains('*') {
            glob_match(&pattern, &peer)
        } else {
            pattern == peer
        }
    })
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    parts.last().is_none_or(|last| last.is_empty()) || pos == text.len()
}
