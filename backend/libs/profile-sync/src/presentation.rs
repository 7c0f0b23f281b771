//! Derived header state: count labels and follow-control gating

use crate::models::{ProfileRecord, SessionIdentity, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralCategory {
    One,
    Other,
}

/// One/other plural rule sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluralRules {
    /// `one` for exactly 1 (en, de, es, ...)
    #[default]
    English,
    /// `one` for 0 and 1 (fr, pt-BR, ...)
    French,
}

impl PluralRules {
    pub fn select(self, n: u64) -> PluralCategory {
        let one = match self {
            PluralRules::English => n == 1,
            PluralRules::French => n <= 1,
        };
        if one {
            PluralCategory::One
        } else {
            PluralCategory::Other
        }
    }

    /// Pick the label for `count`; an unknown count renders `singular`
    pub fn label<'a>(self, count: Option<u64>, singular: &'a str, plural: &'a str) -> &'a str {
        match count.map(|n| self.select(n)) {
            None | Some(PluralCategory::One) => singular,
            Some(PluralCategory::Other) => plural,
        }
    }
}

pub fn plural_category(n: u64) -> PluralCategory {
    PluralRules::default().select(n)
}

pub fn plural_label<'a>(count: Option<u64>, singular: &'a str, plural: &'a str) -> &'a str {
    PluralRules::default().label(count, singular, plural)
}

/// Text shown in the profile header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileHeader {
    pub name: Option<String>,
    pub image: Option<String>,
    pub tweets: String,
    pub followers: String,
    pub following: String,
}

impl ProfileHeader {
    pub fn from_record(record: Option<&ProfileRecord>) -> Self {
        Self::with_rules(record, PluralRules::default())
    }

    pub fn with_rules(record: Option<&ProfileRecord>, rules: PluralRules) -> Self {
        let count_label = |count: Option<u64>, singular: &str, plural: &str| {
            let label = rules.label(count, singular, plural);
            match count {
                Some(n) => format!("{n} {label}"),
                None => label.to_string(),
            }
        };
        Self {
            name: record.and_then(|r| r.name.clone()),
            image: record.and_then(|r| r.image.clone()),
            tweets: count_label(record.map(|r| r.tweets_count), "Tweet", "Tweets"),
            followers: count_label(record.map(|r| r.followers_count), "Follower", "Followers"),
            following: match record {
                Some(r) => format!("{} Following", r.follows_count),
                None => "Following".to_string(),
            },
        }
    }
}

/// Follow button state; `None` from [`follow_control`] means "not rendered"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowControl {
    pub label: &'static str,
    pub is_following: bool,
    pub disabled: bool,
}

/// The control exists only for an authenticated viewer on someone else's
/// profile whose follow state is known
pub fn follow_control(
    session: &SessionIdentity,
    profile_id: &UserId,
    is_following: Option<bool>,
    pending: bool,
) -> Option<FollowControl> {
    let viewer_id = session.viewer_id()?;
    if viewer_id == profile_id {
        return None;
    }
    // unknown relation: nothing to toggle
    let is_following = is_following?;
    Some(FollowControl {
        label: if is_following { "Unfollow" } else { "Follow" },
        is_following,
        disabled: pending,
    })
}
