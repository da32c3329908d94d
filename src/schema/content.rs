//! Content model matching
//!
//! The children of an element are matched against its particle once the
//! element is closed. Matching works on sets of child positions, so optional
//! and repeated particles never need backtracking; the furthest position
//! reached is kept to explain a failure.

use super::model::{Occurs, Particle, Term};
use crate::namespaces::QName;
use std::collections::BTreeSet;

type Positions = BTreeSet<usize>;

/// Why a list of children does not match a content model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMismatch {
    /// Index of the first child that cannot be placed; `None` when children
    /// are missing at the end
    pub unexpected: Option<usize>,
    /// Names that would have been accepted at that point
    pub expected: Vec<String>,
}

impl ContentMismatch {
    /// Render the mismatch for the element holding `children`
    pub fn describe(&self, children: &[QName]) -> String {
        let expected = if self.expected.is_empty() {
            String::new()
        } else {
            format!(" Expected is ( {} ).", self.expected.join(", "))
        };
        match self.unexpected.and_then(|i| children.get(i)) {
            Some(child) => format!(
                "element '{}' is not expected.{}",
                child.local_name, expected
            ),
            None => format!("missing child element(s).{}", expected),
        }
    }
}

struct Matcher<'a> {
    children: &'a [QName],
    furthest: usize,
    expected: Vec<String>,
}

impl<'a> Matcher<'a> {
    fn expect(&mut self, position: usize, what: String) {
        if position > self.furthest {
            self.furthest = position;
            self.expected.clear();
        }
        if position == self.furthest && !self.expected.contains(&what) {
            self.expected.push(what);
        }
    }

    fn advance(&mut self, position: usize) {
        if position > self.furthest {
            self.furthest = position;
            self.expected.clear();
        }
    }

    fn particle(&mut self, particle: &Particle, start: &Positions) -> Positions {
        let occurs = particle.occurs;
        let mut result = if occurs.min == 0 {
            start.clone()
        } else {
            Positions::new()
        };
        let mut seen = start.clone();
        let mut current = start.clone();
        let mut count = 0u32;

        while !current.is_empty() {
            count += 1;
            if !occurs.allows(count) {
                break;
            }
            let next = self.term(&particle.term, &current);
            if count >= occurs.min {
                result.extend(next.iter().copied());
                if next.is_subset(&seen) {
                    break;
                }
            }
            seen.extend(next.iter().copied());
            current = next;
        }
        result
    }

    fn term(&mut self, term: &Term, start: &Positions) -> Positions {
        match term {
            Term::Element(name, _) => {
                let mut next = Positions::new();
                for &position in start {
                    if self.children.get(position) == Some(name) {
                        self.advance(position + 1);
                        next.insert(position + 1);
                    } else {
                        self.expect(position, name.local_name.clone());
                    }
                }
                next
            }
            Term::Any(wildcard) => {
                let mut next = Positions::new();
                for &position in start {
                    match self.children.get(position) {
                        Some(child) if wildcard.matches(child) => {
                            self.advance(position + 1);
                            next.insert(position + 1);
                        }
                        _ => self.expect(position, "##any".to_string()),
                    }
                }
                next
            }
            Term::Sequence(items) => {
                let mut current = start.clone();
                for item in items {
                    current = self.particle(item, &current);
                    if current.is_empty() {
                        break;
                    }
                }
                current
            }
            Term::Choice(items) => {
                let mut next = Positions::new();
                for item in items {
                    next.extend(self.particle(item, start));
                }
                next
            }
            Term::All(items) => self.all(items, start),
        }
    }

    fn all(&mut self, items: &[Particle], start: &Positions) -> Positions {
        let required: u64 = items
            .iter()
            .enumerate()
            .filter(|(i, p)| *i < 64 && p.occurs.min > 0)
            .fold(0, |mask, (i, _)| mask | (1u64 << i));

        let mut result = Positions::new();
        let mut visited = BTreeSet::new();
        let mut pending: Vec<(usize, u64)> = start.iter().map(|&p| (p, 0)).collect();

        while let Some((position, used)) = pending.pop() {
            if !visited.insert((position, used)) {
                continue;
            }
            if used & required == required {
                result.insert(position);
            }
            for (i, item) in items.iter().enumerate().take(64) {
                let bit = 1u64 << i;
                if used & bit != 0 {
                    continue;
                }
                let single = Particle::new(Occurs::once(), item.term.clone());
                let from = Positions::from([position]);
                for next in self.particle(&single, &from) {
                    if next > position {
                        pending.push((next, used | bit));
                    }
                }
            }
        }
        result
    }
}

/// Match `children` against `particle`
pub fn match_content(particle: &Particle, children: &[QName]) -> Result<(), ContentMismatch> {
    let mut matcher = Matcher {
        children,
        furthest: 0,
        expected: Vec::new(),
    };
    let end = matcher.particle(particle, &Positions::from([0]));
    if end.contains(&children.len()) {
        return Ok(());
    }
    let unexpected = if matcher.furthest < children.len() {
        Some(matcher.furthest)
    } else {
        None
    };
    Err(ContentMismatch {
        unexpected,
        expected: matcher.expected,
    })
}
