// GAA score notation ("G-PP"): goals are worth three points each.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid score `{input}`: expected G-PP")]
pub struct ScoreParseError {
    pub input: String,
}

/// A score such as `1-08` (one goal, eight points).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Score {
    pub goals: u32,
    pub points: u32,
}

impl Score {
    pub fn new(goals: u32, points: u32) -> Self {
        Score { goals, points }
    }

    /// Total value of the score in points, saturating at `u32::MAX`.
    pub fn total_points(&self) -> u32 {
        self.goals.saturating_mul(3).saturating_add(self.points)
    }

    /// Component-wise sum, used to combine half-time scores.
    pub fn add(self, other: Score) -> Score {
        Score {
            goals: self.goals.saturating_add(other.goals),
            points: self.points.saturating_add(other.points),
        }
    }
}

impl FromStr for Score {
    type Err = ScoreParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ScoreParseError {
            input: s.to_string(),
        };
        let trimmed = s.trim();
        let (g, p) = trimmed.split_once('-').ok_or_else(err)?;
        if g.is_empty()
            || p.is_empty()
            || !g.bytes().all(|b| b.is_ascii_digit())
            || !p.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }
        let goals = g.parse().map_err(|_| err())?;
        let points = p.parse().map_err(|_| err())?;
        Ok(Score { goals, points })
    }
}

impl fmt::Display for Score {
    /// Canonical form: points padded to two digits (`1-08`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.goals, self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_totals() {
        let score: Score = "1-08".parse().unwrap();
        assert_eq!(score, Score::new(1, 8));
        assert_eq!(score.total_points(), 11);
    }

    #[test]
    fn normalizes_unpadded_points() {
        let score: Score = " 2-5 ".parse().unwrap();
        assert_eq!(score.to_string(), "2-05");
        assert_eq!(score.total_points(), 11);
    }

    #[test]
    fn canonical_strings_survive_format_then_parse() {
        for text in ["0-00", "0-12", "3-09", "10-21"] {
            let score: Score = text.parse().unwrap();
            assert_eq!(score.to_string(), text);
            let again: Score = score.to_string().parse().unwrap();
            assert_eq!(again.total_points(), score.goals * 3 + score.points);
        }
    }

    #[test]
    fn rejects_malformed_scores() {
        for text in ["", "1", "1-", "-8", "a-08", "1-0x", "1--8", "1.08", "+1-08"] {
            assert!(text.parse::<Score>().is_err(), "{text} should fail");
        }
    }

    #[test]
    fn add_combines_halves() {
        let first: Score = "0-05".parse().unwrap();
        let second: Score = "1-04".parse().unwrap();
        let total = first.add(second);
        assert_eq!(total.to_string(), "1-09");
        assert_eq!(total.total_points(), 12);
    }

    #[test]
    fn huge_scores_saturate() {
        let score: Score = "2000000000-0".parse().unwrap();
        assert_eq!(score.total_points(), u32::MAX);
        let doubled = score.add(Score::new(u32::MAX, 1));
        assert_eq!(doubled.goals, u32::MAX);
        assert_eq!(doubled.points, 1);
    }
}
