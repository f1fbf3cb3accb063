//! Static types for formula expressions
//!
//! Every resolved formula node carries a [`FormulaType`]. The type drives
//! operator eligibility, implicit coercions, and aggregation rules, all as
//! exhaustive matches so adding a variant forces every table to be revisited.

use std::fmt;

/// The static type of a formula expression or field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormulaType {
    /// Produced only for nodes that failed to resolve
    Invalid,
    /// The type of an empty literal / empty field
    Blank,
    /// Single-line text
    Text,
    /// Multi-line text
    LongText,
    /// Fixed-precision number
    Number {
        /// Digits after the decimal point (0..=10)
        decimal_places: u8,
    },
    /// True/false
    Boolean,
    /// Calendar date, optionally with a time component
    Date {
        /// Whether the value carries a time-of-day component
        has_time: bool,
        /// IANA timezone name, if the field is timezone-aware
        timezone: Option<String>,
    },
    /// A span of time (seconds resolution)
    Duration,
    /// One option chosen from a fixed set
    SingleSelect,
    /// A URL
    Url,
    /// The value list produced by a lookup through a link field
    Array(Box<FormulaType>),
}

impl FormulaType {
    /// A number with no decimal places
    pub fn integer() -> Self {
        FormulaType::Number { decimal_places: 0 }
    }

    /// A number with the given decimal places
    pub fn number(decimal_places: u8) -> Self {
        FormulaType::Number { decimal_places }
    }

    /// A plain date without time
    pub fn date() -> Self {
        FormulaType::Date {
            has_time: false,
            timezone: None,
        }
    }

    /// Whether arithmetic operators may be applied to this type
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            FormulaType::Number { .. } | FormulaType::Date { .. } | FormulaType::Duration
        )
    }

    /// Whether values of this type can be compared with `<`, `<=`, `>`, `>=`
    pub fn is_comparable(&self) -> bool {
        match self {
            FormulaType::Text
            | FormulaType::LongText
            | FormulaType::Number { .. }
            | FormulaType::Boolean
            | FormulaType::Date { .. }
            | FormulaType::Duration
            | FormulaType::SingleSelect
            | FormulaType::Url => true,
            FormulaType::Invalid | FormulaType::Blank | FormulaType::Array(_) => false,
        }
    }

    /// Whether an array of this type can feed numeric aggregates (sum, avg, ...)
    pub fn is_aggregatable(&self) -> bool {
        matches!(self, FormulaType::Number { .. } | FormulaType::Duration)
    }

    /// Whether this type is textual (concatenation-eligible)
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FormulaType::Text | FormulaType::LongText | FormulaType::Url | FormulaType::SingleSelect
        )
    }

    /// Implicit coercion table
    ///
    /// Identity never counts as a coercion; callers that need the distinction
    /// should use [`FormulaType::coercion_cost`]. `Number -> Text` is
    /// deliberately absent: that conversion exists only through the explicit
    /// `totext` function.
    pub fn coerces_to(&self, target: &FormulaType) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            // Blank adapts to any concrete type
            (FormulaType::Blank, t) if *t != FormulaType::Invalid => true,
            // Numeric widening (more decimal places)
            (
                FormulaType::Number { decimal_places: a },
                FormulaType::Number { decimal_places: b },
            ) => a <= b,
            // Textual kinds collapse into text
            (FormulaType::LongText, FormulaType::Text) => true,
            (FormulaType::Text, FormulaType::LongText) => true,
            (FormulaType::Url, FormulaType::Text) => true,
            (FormulaType::SingleSelect, FormulaType::Text) => true,
            // A date without time widens to one with time
            (
                FormulaType::Date { has_time: false, .. },
                FormulaType::Date { has_time: true, .. },
            ) => true,
            (FormulaType::Array(a), FormulaType::Array(b)) => a.coerces_to(b),
            _ => false,
        }
    }

    /// Cost of converting `self` into `target` for overload resolution
    ///
    /// `Some(0)` for an exact match, `Some(1)` for an implicit coercion,
    /// `None` when no implicit conversion exists.
    pub fn coercion_cost(&self, target: &FormulaType) -> Option<u8> {
        if self == target {
            Some(0)
        } else if self.coerces_to(target) {
            Some(1)
        } else {
            None
        }
    }

    /// Result type of `self + rhs`, if the pair is addable
    pub fn add_result(&self, rhs: &FormulaType) -> Option<FormulaType> {
        match (self, rhs) {
            (
                FormulaType::Number { decimal_places: a },
                FormulaType::Number { decimal_places: b },
            ) => Some(FormulaType::Number {
                decimal_places: (*a).max(*b),
            }),
            (FormulaType::Date { .. }, FormulaType::Duration) => Some(self.clone()),
            (FormulaType::Duration, FormulaType::Date { .. }) => Some(rhs.clone()),
            (FormulaType::Duration, FormulaType::Duration) => Some(FormulaType::Duration),
            // `+` doubles as concatenation for textual operands
            (a, b) if a.is_textual() && b.is_textual() => Some(FormulaType::Text),
            (FormulaType::Blank, b) if b.is_arithmetic() => Some(rhs.clone()),
            (a, FormulaType::Blank) if a.is_arithmetic() => Some(self.clone()),
            _ => None,
        }
    }

    /// Result type of `self - rhs`, if the pair is subtractable
    pub fn sub_result(&self, rhs: &FormulaType) -> Option<FormulaType> {
        match (self, rhs) {
            (
                FormulaType::Number { decimal_places: a },
                FormulaType::Number { decimal_places: b },
            ) => Some(FormulaType::Number {
                decimal_places: (*a).max(*b),
            }),
            (FormulaType::Date { .. }, FormulaType::Duration) => Some(self.clone()),
            (FormulaType::Date { .. }, FormulaType::Date { .. }) => Some(FormulaType::Duration),
            (FormulaType::Duration, FormulaType::Duration) => Some(FormulaType::Duration),
            (FormulaType::Blank, b) if b.is_arithmetic() => Some(rhs.clone()),
            (a, FormulaType::Blank) if a.is_arithmetic() => Some(self.clone()),
            _ => None,
        }
    }

    /// Result type of `self * rhs` / `self % rhs` / `self ^ rhs`
    ///
    /// Multiplication-family operators only apply to numbers (and a duration
    /// scaled by a number).
    pub fn mul_result(&self, rhs: &FormulaType) -> Option<FormulaType> {
        match (self, rhs) {
            (
                FormulaType::Number { decimal_places: a },
                FormulaType::Number { decimal_places: b },
            ) => Some(FormulaType::Number {
                decimal_places: (*a).max(*b),
            }),
            (FormulaType::Duration, FormulaType::Number { .. }) => Some(FormulaType::Duration),
            (FormulaType::Number { .. }, FormulaType::Duration) => Some(FormulaType::Duration),
            _ => None,
        }
    }

    /// Result type of `self / rhs`
    ///
    /// Division never fails at the type level for numeric operands; a zero
    /// divisor becomes a per-row error value in the compiled expression.
    /// Quotients keep the maximum precision the engine supports.
    pub fn div_result(&self, rhs: &FormulaType) -> Option<FormulaType> {
        match (self, rhs) {
            (FormulaType::Number { .. }, FormulaType::Number { .. }) => Some(FormulaType::Number {
                decimal_places: MAX_DECIMAL_PLACES,
            }),
            (FormulaType::Duration, FormulaType::Number { .. }) => Some(FormulaType::Duration),
            _ => None,
        }
    }

    /// Whether `self` and `rhs` may be compared for equality or ordering
    pub fn comparable_with(&self, rhs: &FormulaType) -> bool {
        if !self.is_comparable() || !rhs.is_comparable() {
            return false;
        }
        self.coerces_to(rhs) || rhs.coerces_to(self)
    }

    /// Result type of unary minus
    pub fn negate_result(&self) -> Option<FormulaType> {
        match self {
            FormulaType::Number { .. } | FormulaType::Duration => Some(self.clone()),
            _ => None,
        }
    }

    /// The element type, for arrays; `self` otherwise
    pub fn element_type(&self) -> &FormulaType {
        match self {
            FormulaType::Array(inner) => inner,
            other => other,
        }
    }
}

/// Decimal places used for division results and other full-precision numbers
pub const MAX_DECIMAL_PLACES: u8 = 10;

impl fmt::Display for FormulaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaType::Invalid => write!(f, "invalid"),
            FormulaType::Blank => write!(f, "blank"),
            FormulaType::Text => write!(f, "text"),
            FormulaType::LongText => write!(f, "long text"),
            FormulaType::Number { decimal_places } => write!(f, "number({decimal_places})"),
            FormulaType::Boolean => write!(f, "boolean"),
            FormulaType::Date { has_time: true, .. } => write!(f, "date with time"),
            FormulaType::Date {
                has_time: false, ..
            } => write!(f, "date"),
            FormulaType::Duration => write!(f, "duration"),
            FormulaType::SingleSelect => write!(f, "single select"),
            FormulaType::Url => write!(f, "url"),
            FormulaType::Array(inner) => write!(f, "array of {inner}"),
        }
    }
}
