//! Property path strings.
//!
//! Paths address properties on a view-model instance, traversing nested
//! instances with `.` and list elements with `[index]`:
//! `stats.items[3].label`. The final segment is always a property name; the
//! segments before it select which instance that property lives on.

use smallvec::SmallVec;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("unexpected {found:?} at byte {at}")]
    Unexpected { found: char, at: usize },
    #[error("index at byte {at} is not a number")]
    BadIndex { at: usize },
    #[error("unterminated index bracket")]
    UnterminatedIndex,
    #[error("path ends in an index, expected a property name")]
    TrailingIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A property name on the current instance.
    Field(String),
    /// An element of the list selected by the preceding field.
    Index(usize),
}

/// A parsed property path. The leaf is guaranteed to be a [`Segment::Field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    segments: SmallVec<[Segment; 4]>,
}
impl PropertyPath {
    pub fn parse(text: &str) -> Result<Self, PathError> {
        if text.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = SmallVec::new();
        let mut chars = text.char_indices().peekable();
        loop {
            // Each iteration consumes one field name. Dots and brackets are
            // only legal after at least one field character.
            let mut field = String::new();
            while let Some(&(at, c)) = chars.peek() {
                match c {
                    '.' | '[' | ']' => {
                        if field.is_empty() {
                            return Err(PathError::Unexpected { found: c, at });
                        }
                        break;
                    }
                    _ => {
                        field.push(c);
                        chars.next();
                    }
                }
            }
            if field.is_empty() {
                // Ran off the end right after a separator.
                return Err(PathError::Empty);
            }
            segments.push(Segment::Field(field));

            // Zero or more index brackets, then either a dot or the end.
            loop {
                match chars.next() {
                    None => return Ok(Self { segments }),
                    Some((_, '.')) => {
                        if chars.peek().is_none() {
                            return Err(PathError::Empty);
                        }
                        break;
                    }
                    Some((at, '[')) => {
                        let mut digits = String::new();
                        loop {
                            match chars.next() {
                                None => return Err(PathError::UnterminatedIndex),
                                Some((_, ']')) => break,
                                Some((_, d)) if d.is_ascii_digit() => digits.push(d),
                                Some(_) => return Err(PathError::BadIndex { at }),
                            }
                        }
                        let index: usize =
                            digits.parse().map_err(|_| PathError::BadIndex { at })?;
                        segments.push(Segment::Index(index));
                        if chars.peek().is_none() {
                            return Err(PathError::TrailingIndex);
                        }
                    }
                    Some((at, found)) => return Err(PathError::Unexpected { found, at }),
                }
            }
        }
    }
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
    /// Everything up to the final field, plus the final field's name.
    #[must_use]
    pub fn split_leaf(&self) -> (&[Segment], &str) {
        // Parse guarantees a trailing Field.
        let Some((Segment::Field(leaf), rest)) = self.segments.split_last() else {
            unreachable!("parse never produces a trailing index")
        };
        (rest, leaf)
    }
}
impl std::fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) => {
                    if i != 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}
