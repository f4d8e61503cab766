//! Closed vocabularies stored as text columns.

use serde::{Deserialize, Serialize};
use sqlx::database::{HasArguments, HasValueRef};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Database, Decode, Encode, Type};
use std::fmt;
use std::str::FromStr;

/// Common surface of every stored choice so filters, forms and resources can
/// treat them uniformly.
pub trait Choice: Copy + FromStr<Err = ChoiceError> + 'static {
    /// `(stored value, human label)` pairs in display order.
    const CHOICES: &'static [(&'static str, &'static str)];

    fn as_str(&self) -> &'static str;
    fn label(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {field}; expected one of: {expected}")]
pub struct ChoiceError {
    pub field: &'static str,
    pub value: String,
    pub expected: String,
}

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $field:literal {
            $($variant:ident => ($value:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        // Stored as plain text on every engine rather than as a named
        // database enum type.
        impl<DB: Database> Type<DB> for $name
        where
            str: Type<DB>,
        {
            fn type_info() -> DB::TypeInfo {
                <str as Type<DB>>::type_info()
            }

            fn compatible(ty: &DB::TypeInfo) -> bool {
                <str as Type<DB>>::compatible(ty)
            }
        }

        impl<'q, DB: Database> Encode<'q, DB> for $name
        where
            &'q str: Encode<'q, DB>,
        {
            fn encode_by_ref(&self, buf: &mut <DB as HasArguments<'q>>::ArgumentBuffer) -> IsNull {
                let value: &'q str = self.as_str();
                <&'q str as Encode<'q, DB>>::encode_by_ref(&value, buf)
            }
        }

        impl<'r, DB: Database> Decode<'r, DB> for $name
        where
            &'r str: Decode<'r, DB>,
        {
            fn decode(value: <DB as HasValueRef<'r>>::ValueRef) -> Result<Self, BoxDynError> {
                let raw = <&'r str as Decode<'r, DB>>::decode(value)?;
                Ok(raw.parse()?)
            }
        }

        impl Choice for $name {
            const CHOICES: &'static [(&'static str, &'static str)] = &[$(($value, $label)),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value,)+
                }
            }

            fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ChoiceError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw.trim() {
                    $($value => Ok(Self::$variant),)+
                    other => Err(ChoiceError {
                        field: $field,
                        value: other.to_string(),
                        expected: Self::CHOICES
                            .iter()
                            .map(|(value, _)| *value)
                            .collect::<Vec<_>>()
                            .join(", "),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

choice_enum! {
    /// Where a job posting was sourced from.
    JobSource as "source" {
        Manual => ("manual", "Manual"),
        Greenhouse => ("greenhouse", "Greenhouse"),
        Lever => ("lever", "Lever"),
        Other => ("other", "Other"),
    }
}

choice_enum! {
    /// How long the reviewer worked with the company or manager.
    ReviewDuration as "duration" {
        UnderThreeMonths => ("<3m", "Less than 3 months"),
        ThreeToTwelveMonths => ("3-12m", "3-12 months"),
        OneToThreeYears => ("1-3y", "1-3 years"),
        OverThreeYears => ("3y+", "More than 3 years"),
    }
}

choice_enum! {
    Sentiment as "sentiment" {
        Positive => ("positive", "Positive"),
        Neutral => ("neutral", "Neutral"),
        Negative => ("negative", "Negative"),
    }
}

choice_enum! {
    WouldWorkAgain as "would_work_again" {
        Yes => ("yes", "Yes"),
        Unsure => ("unsure", "Unsure"),
        No => ("no", "No"),
    }
}

choice_enum! {
    /// Trust level attached to a company aggregate.
    Confidence as "confidence" {
        Low => ("low", "Low"),
        Medium => ("medium", "Medium"),
        High => ("high", "High"),
    }
}

impl Default for JobSource {
    fn default() -> Self {
        Self::Manual
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_values() {
        assert_eq!("<3m".parse::<ReviewDuration>(), Ok(ReviewDuration::UnderThreeMonths));
        assert_eq!(" lever ".parse::<JobSource>(), Ok(JobSource::Lever));
        assert_eq!(Confidence::High.as_str(), "high");
        assert_eq!(WouldWorkAgain::Unsure.label(), "Unsure");
    }

    #[test]
    fn rejects_unknown_values_with_expected_list() {
        let err = "maybe".parse::<WouldWorkAgain>().expect_err("unknown choice");
        assert_eq!(err.field, "would_work_again");
        assert_eq!(err.expected, "yes, unsure, no");
    }

    #[test]
    fn serde_uses_stored_values() {
        let json = serde_json::to_string(&ReviewDuration::OverThreeYears).expect("serialize");
        assert_eq!(json, "\"3y+\"");
        let parsed: Sentiment = serde_json::from_str("\"negative\"").expect("deserialize");
        assert_eq!(parsed, Sentiment::Negative);
    }
}
