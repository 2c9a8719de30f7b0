//! Index and status-code selections
//!
//! Index-bearing operations accept a single index, a set of indices or a
//! contiguous range. Tokens look like `3`, `1-5` or `2,4,9-10`.

use std::collections::BTreeSet;

use crate::storage::{StoreError, StoreResult};

/// Which records an operation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every record
    All,
    /// A single index
    One(i64),
    /// A contiguous range, both ends included
    Range { low: i64, high: i64 },
    /// Several indices and ranges, kept as sorted, disjoint inclusive spans
    Set(Vec<(i64, i64)>),
}

impl Selection {
    /// Parse index tokens; no tokens selects everything
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> StoreResult<Self> {
        if tokens.is_empty() {
            return Ok(Selection::All);
        }

        let pieces: Vec<&str> = tokens
            .iter()
            .flat_map(|t| t.as_ref().split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if let [single] = pieces.as_slice() {
            return match parse_piece(single)? {
                (low, high) if low == high => Ok(Selection::One(low)),
                (low, high) => Ok(Selection::Range { low, high }),
            };
        }

        let mut spans = pieces
            .into_iter()
            .map(parse_piece)
            .collect::<StoreResult<Vec<_>>>()?;
        if spans.is_empty() {
            return Err(StoreError::InvalidArgument("no index given".to_string()));
        }
        Ok(Selection::Set(merge_spans(&mut spans)))
    }

    /// Selected ids up to `max_id`, ascending; `None` for `All`
    ///
    /// Ranges may reach far past the last record, so they are clipped
    /// before being expanded.
    pub fn ids_within(&self, max_id: i64) -> Option<Vec<i64>> {
        let spans = match self {
            Selection::All => return None,
            Selection::One(id) => vec![(*id, *id)],
            Selection::Range { low, high } => vec![(*low, *high)],
            Selection::Set(spans) => spans.clone(),
        };
        Some(
            spans
                .into_iter()
                .filter(|&(low, _)| low <= max_id)
                .flat_map(|(low, high)| low..=high.min(max_id))
                .collect(),
        )
    }

    /// The index when exactly one record is selected
    pub fn single(&self) -> Option<i64> {
        match self {
            Selection::One(id) => Some(*id),
            Selection::Range { low, high } if low == high => Some(*low),
            Selection::Set(spans) => match spans.as_slice() {
                [(low, high)] if low == high => Some(*low),
                _ => None,
            },
            _ => None,
        }
    }

    /// Smallest selected index
    pub fn min_id(&self) -> Option<i64> {
        match self {
            Selection::All => None,
            Selection::One(id) => Some(*id),
            Selection::Range { low, .. } => Some(*low),
            Selection::Set(spans) => spans.first().map(|(low, _)| *low),
        }
    }
}

impl From<i64> for Selection {
    fn from(id: i64) -> Self {
        Selection::One(id)
    }
}

/// A set of HTTP status codes, e.g. `400-599,301`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSet(BTreeSet<u16>);

impl StatusSet {
    /// Parse a comma-separated list of codes and ranges
    pub fn parse(list: &str) -> StoreResult<Self> {
        let mut codes = BTreeSet::new();
        for piece in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (low, high) = parse_piece(piece)?;
            if high > i64::from(u16::MAX) {
                return Err(StoreError::InvalidArgument(format!(
                    "status code out of range: {}",
                    piece
                )));
            }
            codes.extend((low..=high).map(|c| c as u16));
        }
        Ok(Self(codes))
    }

    /// Build from explicit codes
    pub fn from_codes(codes: impl IntoIterator<Item = u16>) -> Self {
        Self(codes.into_iter().collect())
    }

    /// Whether a fetch status falls in the set; an absent status never does
    pub fn contains(&self, status: Option<u16>) -> bool {
        status.is_some_and(|s| self.0.contains(&s))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sort spans and join the ones that overlap or touch
fn merge_spans(spans: &mut [(i64, i64)]) -> Vec<(i64, i64)> {
    spans.sort_unstable();
    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(spans.len());
    for &(low, high) in spans.iter() {
        match merged.last_mut() {
            Some(last) if low <= last.1.saturating_add(1) => last.1 = last.1.max(high),
            _ => merged.push((low, high)),
        }
    }
    merged
}

/// Parse `N` or `A-B` into an ordered inclusive pair of positive integers
fn parse_piece(piece: &str) -> StoreResult<(i64, i64)> {
    let invalid = || StoreError::InvalidArgument(format!("invalid index token: '{}'", piece));

    let (low, high) = match piece.split_once('-') {
        Some((a, b)) => (
            a.trim().parse::<i64>().map_err(|_| invalid())?,
            b.trim().parse::<i64>().map_err(|_| invalid())?,
        ),
        None => {
            let n = piece.parse::<i64>().map_err(|_| invalid())?;
            (n, n)
        }
    };

    if low < 1 || high < 1 {
        return Err(StoreError::InvalidArgument(format!(
            "index must be positive: '{}'",
            piece
        )));
    }
    Ok((low.min(high), low.max(high)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_is_all() {
        let tokens: [&str; 0] = [];
        assert_eq!(Selection::parse(&tokens).unwrap(), Selection::All);
        assert_eq!(Selection::All.ids_within(10), None);
    }

    #[test]
    fn test_parse_single_and_range() {
        assert_eq!(Selection::parse(&["4"]).unwrap(), Selection::One(4));
        assert_eq!(
            Selection::parse(&["7-3"]).unwrap(),
            Selection::Range { low: 3, high: 7 }
        );
        assert_eq!(Selection::parse(&["5-5"]).unwrap().single(), Some(5));
    }

    #[test]
    fn test_parse_set() {
        let sel = Selection::parse(&["2,4", "9-10"]).unwrap();
        assert_eq!(sel.ids_within(100).unwrap(), vec![2, 4, 9, 10]);
        assert_eq!(sel.min_id(), Some(2));
        assert_eq!(sel.single(), None);
    }

    #[test]
    fn test_set_merges_overlapping_pieces() {
        let sel = Selection::parse(&["5,3-4,1", "2"]).unwrap();
        assert_eq!(sel, Selection::Set(vec![(1, 5)]));
        assert_eq!(Selection::parse(&["3,3"]).unwrap().single(), Some(3));
    }

    #[test]
    fn test_huge_ranges_are_clipped_to_max_id() {
        let range = Selection::parse(&["1-9223372036854775807"]).unwrap();
        assert_eq!(range.ids_within(3).unwrap(), vec![1, 2, 3]);

        let set = Selection::parse(&["1,2-9999999999", "7"]).unwrap();
        assert_eq!(set, Selection::Set(vec![(1, 9_999_999_999)]));
        assert_eq!(set.ids_within(4).unwrap(), vec![1, 2, 3, 4]);

        let beyond = Selection::parse(&["8-9999999999"]).unwrap();
        assert!(beyond.ids_within(4).unwrap().is_empty());
        assert_eq!(beyond.min_id(), Some(8));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Selection::parse(&["abc"]),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            Selection::parse(&["0"]),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            Selection::parse(&["1-x"]),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_status_set() {
        let set = StatusSet::parse("400-404, 301").unwrap();
        assert!(set.contains(Some(301)));
        assert!(set.contains(Some(404)));
        assert!(!set.contains(Some(405)));
        assert!(!set.contains(None));
    }

    #[test]
    fn test_status_set_out_of_range() {
        assert!(StatusSet::parse("70000").is_err());
    }
}
