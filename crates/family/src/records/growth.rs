//! Growth measurements and developmental milestones.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use kinship_types::{HeightId, MilestoneId, Pack, PackBuffer, PackError, PersonId, WeightId};
use serde::{Deserialize, Serialize};

/// A height measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Height {
    /// Allocated id.
    pub id: HeightId,
    /// Person measured.
    pub person_id: PersonId,
    /// Height in inches.
    pub inches: f64,
    /// When the measurement was taken.
    pub date: DateTime<Utc>,
}

impl Pack for Height {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.person_id)?;
        buf.field(&mut self.inches)?;
        buf.field(&mut self.date)
    }
}

impl_record!(Height, HeightId);

/// A weight measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    /// Allocated id.
    pub id: WeightId,
    /// Person measured.
    pub person_id: PersonId,
    /// Weight in pounds.
    pub pounds: f64,
    /// When the measurement was taken.
    pub date: DateTime<Utc>,
}

impl Pack for Weight {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.person_id)?;
        buf.field(&mut self.pounds)?;
        buf.field(&mut self.date)
    }
}

impl_record!(Weight, WeightId);

/// Kind of milestone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    /// Height reached.
    #[default]
    Height,
    /// Weight reached.
    Weight,
    /// Started crawling.
    Crawling,
    /// Started walking.
    Walking,
    /// First word spoken.
    FirstWord,
}

pack_enum!(MilestoneType { Height = 0, Weight = 1, Crawling = 2, Walking = 3, FirstWord = 4 });

impl MilestoneType {
    /// Stable label used in forms and URLs.
    pub fn label(self) -> &'static str {
        match self {
            MilestoneType::Height => "height",
            MilestoneType::Weight => "weight",
            MilestoneType::Crawling => "crawling",
            MilestoneType::Walking => "walking",
            MilestoneType::FirstWord => "first_word",
        }
    }
}

impl fmt::Display for MilestoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MilestoneType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "height" => Ok(MilestoneType::Height),
            "weight" => Ok(MilestoneType::Weight),
            "crawling" => Ok(MilestoneType::Crawling),
            "walking" => Ok(MilestoneType::Walking),
            "first_word" => Ok(MilestoneType::FirstWord),
            other => Err(format!("unknown milestone type: {other}")),
        }
    }
}

/// A developmental milestone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Allocated id.
    pub id: MilestoneId,
    /// Person who reached it.
    pub person_id: PersonId,
    /// Kind of milestone.
    pub milestone_type: MilestoneType,
    /// When it was reached.
    pub date: DateTime<Utc>,
    /// Age in years when reached.
    pub age: f64,
    /// Measured value, for numeric milestones.
    pub numeric_value: f64,
    /// Unit of `numeric_value`.
    pub unit: String,
    /// Free-form value, such as the first word.
    pub text_value: String,
    /// Notes.
    pub notes: String,
}

impl Pack for Milestone {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.person_id)?;
        buf.enumeration(&mut self.milestone_type)?;
        buf.field(&mut self.date)?;
        buf.field(&mut self.age)?;
        buf.field(&mut self.numeric_value)?;
        buf.field(&mut self.unit)?;
        buf.field(&mut self.text_value)?;
        buf.field(&mut self.notes)
    }
}

impl_record!(Milestone, MilestoneId);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use kinship_test_utils::strategies::arb_timestamp;
    use kinship_types::pack;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_milestone_type_labels_parse_back() {
        for kind in [
            MilestoneType::Height,
            MilestoneType::Weight,
            MilestoneType::Crawling,
            MilestoneType::Walking,
            MilestoneType::FirstWord,
        ] {
            assert_eq!(kind.label().parse::<MilestoneType>().unwrap(), kind);
        }
        assert!("running".parse::<MilestoneType>().is_err());
    }

    proptest! {
        #[test]
        fn prop_milestone_reads_back_equal(
            date in arb_timestamp(),
            age in 0.0f64..18.0,
            text in "[a-z ]{0,20}",
        ) {
            let milestone = Milestone {
                id: MilestoneId::new(4),
                person_id: PersonId::new(5),
                milestone_type: MilestoneType::FirstWord,
                date,
                age,
                numeric_value: 0.0,
                unit: String::new(),
                text_value: text,
                notes: "at breakfast".to_string(),
            };
            let bytes = pack::encode(&milestone).unwrap();
            prop_assert_eq!(pack::decode::<Milestone>(&bytes).unwrap(), milestone);
        }
    }
}
