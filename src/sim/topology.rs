//! Radio reachability between simulated boards

use std::collections::BTreeMap;

use crate::core::{Error, Result};

/// Signal strength of a link when none is given, in dBm
pub const DEFAULT_SIGNAL: i32 = -50;

/// Hardware keys of the bench boards, assigned to simulated boards in order
pub const BOARD_KEYS: [&str; 4] = [
    "E6614864D32F7622",
    "E6614864D36FAF21",
    "E6614864D388AD21",
    "E6614864D3138C21",
];

/// Which boards can hear each other, and how well.
///
/// Boards are numbered by position; the number has nothing to do with the
/// id the token hands out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    boards: usize,
    links: BTreeMap<(usize, usize), i32>,
}

impl Topology {
    /// Creates a topology of isolated boards
    pub fn new(boards: usize) -> Self {
        Topology {
            boards,
            links: BTreeMap::new(),
        }
    }

    /// Builds a topology from an adjacency list, rejecting self links and
    /// one-sided entries
    pub fn from_adjacency(adjacency: &[&[usize]]) -> Result<Self> {
        let mut topology = Topology::new(adjacency.len());
        for (a, row) in adjacency.iter().enumerate() {
            for &b in row.iter() {
                if a == b {
                    return Err(Error::config(format!("board {} cannot be adjacent to itself", a)));
                }
                if b >= adjacency.len() || !adjacency[b].contains(&a) {
                    return Err(Error::config(format!("conflicting adjacency between {} and {}", a, b)));
                }
                topology.links.insert(Self::key(a, b), DEFAULT_SIGNAL);
            }
        }
        Ok(topology)
    }

    /// Two boards
    pub fn pair() -> Self {
        Topology::new(2).link(0, 1)
    }

    /// `boards` boards in a line
    pub fn line(boards: usize) -> Self {
        (1..boards).fold(Topology::new(boards), |t, b| t.link(b - 1, b))
    }

    /// Board 1 in the middle of three leaves
    pub fn star() -> Self {
        Topology::new(4).link(0, 1).link(1, 2).link(1, 3)
    }

    /// Boards 0, 1 and 2 in a triangle with board 3 hanging off board 2
    pub fn triangle_with_tail() -> Self {
        Topology::new(4).link(0, 1).link(0, 2).link(1, 2).link(2, 3)
    }

    /// Adds a link with the default signal strength
    pub fn link(self, a: usize, b: usize) -> Self {
        self.link_with_signal(a, b, DEFAULT_SIGNAL)
    }

    /// Adds a link with the given signal strength
    pub fn link_with_signal(mut self, a: usize, b: usize, signal_strength: i32) -> Self {
        assert!(a != b && a < self.boards && b < self.boards, "invalid link {}-{}", a, b);
        self.links.insert(Self::key(a, b), signal_strength);
        self
    }

    /// Number of boards
    pub fn len(&self) -> usize {
        self.boards
    }

    /// Returns whether there are no boards
    pub fn is_empty(&self) -> bool {
        self.boards == 0
    }

    /// Signal strength between two boards, if they can hear each other
    pub fn signal(&self, a: usize, b: usize) -> Option<i32> {
        self.links.get(&Self::key(a, b)).copied()
    }

    /// Boards in range of `board`, ascending
    pub fn neighbors(&self, board: usize) -> Vec<usize> {
        (0..self.boards).filter(|&b| self.signal(board, b).is_some()).collect()
    }

    /// Hop count between every pair of boards, `None` when unreachable
    pub fn hop_counts(&self) -> Vec<Vec<Option<usize>>> {
        (0..self.boards)
            .map(|from| {
                let mut hops = vec![None; self.boards];
                hops[from] = Some(0);
                let mut frontier = vec![from];
                let mut depth = 0;
                while !frontier.is_empty() {
                    depth += 1;
                    let mut next = Vec::new();
                    for b in frontier {
                        for n in self.neighbors(b) {
                            if hops[n].is_none() {
                                hops[n] = Some(depth);
                                next.push(n);
                            }
                        }
                    }
                    frontier = next;
                }
                hops
            })
            .collect()
    }

    /// Returns whether every board can reach every other
    pub fn is_connected(&self) -> bool {
        self.hop_counts()
            .first()
            .map_or(true, |row| row.iter().all(Option::is_some))
    }

    fn key(a: usize, b: usize) -> (usize, usize) {
        (a.min(b), a.max(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts() {
        assert_eq!(Topology::pair().neighbors(0), vec![1]);
        assert_eq!(Topology::line(4).neighbors(2), vec![1, 3]);
        assert_eq!(Topology::star().neighbors(1), vec![0, 2, 3]);
        assert_eq!(Topology::triangle_with_tail().neighbors(2), vec![0, 1, 3]);
        for topology in [Topology::pair(), Topology::line(4), Topology::star(), Topology::triangle_with_tail()] {
            assert!(topology.is_connected());
        }
        assert!(!Topology::new(3).link(0, 1).is_connected());
    }

    #[test]
    fn test_from_adjacency() {
        let topology = Topology::from_adjacency(&[&[1, 2], &[0, 2], &[0, 1, 3], &[2]]).unwrap();
        assert_eq!(topology, Topology::triangle_with_tail());

        assert!(Topology::from_adjacency(&[&[0]]).is_err());
        assert!(Topology::from_adjacency(&[&[1], &[]]).is_err());
    }

    #[test]
    fn test_hop_counts() {
        let hops = Topology::line(4).hop_counts();
        assert_eq!(hops[0], vec![Some(0), Some(1), Some(2), Some(3)]);
        assert_eq!(hops[3][1], Some(2));
    }

    #[test]
    fn test_signal_is_symmetric() {
        let topology = Topology::new(3).link_with_signal(2, 0, -72);
        assert_eq!(topology.signal(0, 2), Some(-72));
        assert_eq!(topology.signal(2, 0), Some(-72));
        assert_eq!(topology.signal(0, 1), None);
    }
}
