use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::config::GridProfile;
use crate::lifecycle::Lifecycle;
use crate::tiers::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentCode {
    /// `{A|B|C}{1|2|3}{N|C|S|H|D}`
    NineGrid {
        value: Tier,
        activity: Tier,
        lifecycle: Lifecycle,
    },
    /// `T{1-3}V{1-3}`
    TempoValue { tempo: Tier, value: Tier },
}

fn value_letter(tier: Tier) -> char {
    match tier {
        Tier::High => 'A',
        Tier::Mid => 'B',
        Tier::Low => 'C',
    }
}

fn tier_from_value_letter(letter: char) -> Option<Tier> {
    match letter {
        'A' => Some(Tier::High),
        'B' => Some(Tier::Mid),
        'C' => Some(Tier::Low),
        _ => None,
    }
}

fn tier_from_digit(digit: char) -> Option<Tier> {
    digit
        .to_digit(10)
        .and_then(|d| u8::try_from(d).ok())
        .and_then(Tier::from_rank)
}

impl SegmentCode {
    pub fn nine_grid(value: Tier, activity: Tier, lifecycle: Lifecycle) -> Self {
        SegmentCode::NineGrid {
            value,
            activity,
            lifecycle,
        }
    }

    pub fn tempo_value(tempo: Tier, value: Tier) -> Self {
        SegmentCode::TempoValue { tempo, value }
    }

    /// Builds the code for `profile` when every axis it needs is known.
    pub fn compose(
        profile: GridProfile,
        lifecycle: Option<Lifecycle>,
        value: Option<Tier>,
        activity: Option<Tier>,
        tempo: Option<Tier>,
        tempo_value: Option<Tier>,
    ) -> Option<Self> {
        match profile {
            GridProfile::NineGrid => Some(Self::nine_grid(value?, activity?, lifecycle?)),
            GridProfile::TempoValue => {
                lifecycle?;
                Some(Self::tempo_value(tempo?, tempo_value?))
            }
        }
    }

    /// Combinations without business meaning: newbies outside the top
    /// activity column have too little history to act on.
    pub fn is_hidden(&self) -> bool {
        matches!(
            self,
            SegmentCode::NineGrid {
                activity: Tier::Mid | Tier::Low,
                lifecycle: Lifecycle::Newbie,
                ..
            }
        )
    }

    /// Nine-grid cell without the lifecycle letter, e.g. `A1`.
    pub fn cell(&self) -> String {
        match self {
            SegmentCode::NineGrid {
                value, activity, ..
            } => format!("{}{}", value_letter(*value), activity.rank()),
            SegmentCode::TempoValue { .. } => self.to_string(),
        }
    }
}

impl fmt::Display for SegmentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentCode::NineGrid {
                value,
                activity,
                lifecycle,
            } => write!(
                f,
                "{}{}{}",
                value_letter(*value),
                activity.rank(),
                lifecycle.grid_letter()
            ),
            SegmentCode::TempoValue { tempo, value } => {
                write!(f, "{}{}", tempo.ranked_label('T'), value.ranked_label('V'))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSegmentCodeError(pub String);

impl fmt::Display for ParseSegmentCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised segment code '{}'", self.0)
    }
}

impl std::error::Error for ParseSegmentCodeError {}

impl FromStr for SegmentCode {
    type Err = ParseSegmentCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSegmentCodeError(s.to_string());
        let chars: Vec<char> = s.trim().chars().collect();
        match chars.as_slice() {
            ['T', t, 'V', v] => Ok(SegmentCode::tempo_value(
                tier_from_digit(*t).ok_or_else(err)?,
                tier_from_digit(*v).ok_or_else(err)?,
            )),
            [v, a, l] => Ok(SegmentCode::nine_grid(
                tier_from_value_letter(*v).ok_or_else(err)?,
                tier_from_digit(*a).ok_or_else(err)?,
                Lifecycle::from_grid_letter(*l).ok_or_else(err)?,
            )),
            _ => Err(err()),
        }
    }
}

impl Serialize for SegmentCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
