//! Conversion between typed attribute values and the text cgroup control
//! files expect.

use std::fmt::{self, Display};
use std::str::FromStr;

use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

const FREEZER_STATE_THAWED: &str = "THAWED";
const FREEZER_STATE_FROZEN: &str = "FROZEN";
const FREEZER_STATE_FREEZING: &str = "FREEZING";

/// A value that can be written to a control file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeValue {
    Int(i64),
    /// Boolean knobs are written as `1` or `0`.
    Flag(bool),
    /// Written as a comma separated list with a trailing comma, e.g. `0,2,4,`.
    /// The kernel list parser ignores the trailing delimiter.
    IntList(Vec<usize>),
    /// A literal keyword such as `FROZEN`.
    Token(&'static str),
}

impl AttributeValue {
    pub fn format(&self) -> String {
        match self {
            AttributeValue::Int(value) => value.to_string(),
            AttributeValue::Flag(flag) => u8::from(*flag).to_string(),
            AttributeValue::IntList(values) => values.iter().fold(String::new(), |mut acc, v| {
                acc.push_str(&v.to_string());
                acc.push(',');
                acc
            }),
            AttributeValue::Token(token) => (*token).to_owned(),
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(flag: bool) -> Self {
        AttributeValue::Flag(flag)
    }
}

impl From<Pid> for AttributeValue {
    fn from(tid: Pid) -> Self {
        AttributeValue::Int(tid.as_raw().into())
    }
}

impl From<&[usize]> for AttributeValue {
    fn from(values: &[usize]) -> Self {
        AttributeValue::IntList(values.to_vec())
    }
}

impl From<FreezerState> for AttributeValue {
    fn from(state: FreezerState) -> Self {
        AttributeValue::Token(state.as_str())
    }
}

pub fn parse_int(line: &str) -> Option<i64> {
    line.trim().parse().ok()
}

pub fn parse_flag(line: &str) -> Option<bool> {
    match line.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// Parses a cpu or memory node list. Accepts both the format written by
/// [`AttributeValue::IntList`] and the range syntax the kernel reports back
/// (`0-3,8`).
pub fn parse_int_list(line: &str) -> Option<Vec<usize>> {
    let mut values = Vec::new();
    for segment in line.trim().split(',').map(str::trim) {
        if segment.is_empty() {
            continue;
        }

        match segment.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().ok()?;
                let end: usize = end.trim().parse().ok()?;
                if start > end {
                    return None;
                }
                values.extend(start..=end);
            }
            None => values.push(segment.parse().ok()?),
        }
    }

    Some(values)
}

/// State of the freezer controller of a group.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FreezerState {
    /// Tasks in the group are running.
    Thawed,
    /// The kernel is still in the process of stopping the tasks.
    Freezing,
    /// Tasks in the group are suspended.
    Frozen,
}

impl FreezerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreezerState::Thawed => FREEZER_STATE_THAWED,
            FreezerState::Freezing => FREEZER_STATE_FREEZING,
            FreezerState::Frozen => FREEZER_STATE_FROZEN,
        }
    }
}

impl Display for FreezerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown freezer state {0:?}")]
pub struct UnknownFreezerState(pub String);

impl FromStr for FreezerState {
    type Err = UnknownFreezerState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            FREEZER_STATE_THAWED => Ok(FreezerState::Thawed),
            FREEZER_STATE_FREEZING => Ok(FreezerState::Freezing),
            FREEZER_STATE_FROZEN => Ok(FreezerState::Frozen),
            other => Err(UnknownFreezerState(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_values() {
        assert_eq!(AttributeValue::Int(-1).format(), "-1");
        assert_eq!(AttributeValue::Flag(true).format(), "1");
        assert_eq!(AttributeValue::Flag(false).format(), "0");
        assert_eq!(AttributeValue::IntList(vec![0, 2, 4]).format(), "0,2,4,");
        assert_eq!(AttributeValue::IntList(vec![]).format(), "");
        assert_eq!(AttributeValue::from(FreezerState::Frozen).format(), "FROZEN");
        assert_eq!(AttributeValue::from(Pid::from_raw(4242)).format(), "4242");
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42\n"), Some(42));
        assert_eq!(parse_int(" -1 "), Some(-1));
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("4x"), None);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1\n"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("2"), None);
    }

    #[test]
    fn test_parse_kernel_ranges() {
        assert_eq!(parse_int_list("0-3,8\n"), Some(vec![0, 1, 2, 3, 8]));
        assert_eq!(parse_int_list("0,2,4,"), Some(vec![0, 2, 4]));
        assert_eq!(parse_int_list("\n"), Some(vec![]));
        assert_eq!(parse_int_list("3-1"), None);
        assert_eq!(parse_int_list("a,b"), None);
    }

    #[test]
    fn test_freezer_state_tokens() {
        assert_eq!("FROZEN\n".parse::<FreezerState>(), Ok(FreezerState::Frozen));
        assert_eq!("THAWED".parse::<FreezerState>(), Ok(FreezerState::Thawed));
        assert_eq!("FREEZING".parse::<FreezerState>(), Ok(FreezerState::Freezing));
        assert_eq!(
            "MELTED".parse::<FreezerState>(),
            Err(UnknownFreezerState("MELTED".to_owned()))
        );
    }

    quickcheck! {
        fn prop_int_list_is_comma_terminated(values: Vec<u16>) -> bool {
            let values: Vec<usize> = values.into_iter().map(usize::from).collect();
            let formatted = AttributeValue::IntList(values.clone()).format();

            (values.is_empty() || formatted.ends_with(','))
                && parse_int_list(&formatted) == Some(values)
        }
    }
}
