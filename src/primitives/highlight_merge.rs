//! Layering of highlight partitions.
//!
//! A [`HighlightedLine`] splits one line into consecutive sections, each with
//! a set of colors. Highlighters produce such partitions independently (syntax,
//! search matches, diagnostics) and [`HighlightMerger`] layers them: the result
//! has a boundary wherever either input has one, and every section carries the
//! colors of both inputs.

use crate::error::{DocumentError, Result};

/// Duplicate-free set of colors. Iteration follows insertion order (union
/// keeps the left side's order and appends what the right side adds), but
/// equality ignores it.
#[derive(Debug, Clone)]
pub struct ColorSet<C>(Vec<C>);

impl<C: PartialEq> PartialEq for ColorSet<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|c| other.0.contains(c))
    }
}

impl<C: Eq> Eq for ColorSet<C> {}

impl<C> Default for ColorSet<C> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<C: Clone + PartialEq> ColorSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(color: C) -> Self {
        Self(vec![color])
    }

    pub fn insert(&mut self, color: C) {
        if !self.0.contains(&color) {
            self.0.push(color);
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for color in &other.0 {
            out.insert(color.clone());
        }
        out
    }

    pub fn contains(&self, color: &C) -> bool {
        self.0.contains(color)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, C> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[C] {
        &self.0
    }
}

impl<C: Clone + PartialEq> FromIterator<C> for ColorSet<C> {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        let mut set = Self::new();
        for color in iter {
            set.insert(color);
        }
        set
    }
}

/// One colored section. `offset` is relative to the line start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedSection<C> {
    pub offset: usize,
    pub length: usize,
    pub colors: ColorSet<C>,
}

impl<C> HighlightedSection<C> {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// A partition of `[0, length)` into colored sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedLine<C> {
    length: usize,
    sections: Vec<HighlightedSection<C>>,
}

impl<C: Clone + PartialEq> HighlightedLine<C> {
    /// A line without any colors.
    pub fn plain(length: usize) -> Self {
        Self::uniform(length, ColorSet::new())
    }

    /// A single section covering the whole line.
    pub fn uniform(length: usize, colors: ColorSet<C>) -> Self {
        let sections = if length == 0 {
            Vec::new()
        } else {
            vec![HighlightedSection {
                offset: 0,
                length,
                colors,
            }]
        };
        Self { length, sections }
    }

    /// Builds a partition from consecutive `(length, colors)` pieces.
    /// Zero-length pieces are dropped.
    pub fn from_sections(pieces: impl IntoIterator<Item = (usize, ColorSet<C>)>) -> Self {
        let mut offset = 0;
        let mut sections = Vec::new();
        for (length, colors) in pieces {
            if length == 0 {
                continue;
            }
            sections.push(HighlightedSection {
                offset,
                length,
                colors,
            });
            offset += length;
        }
        Self {
            length: offset,
            sections,
        }
    }

    /// Builds a partition of `length` from highlighter spans
    /// `(offset, length, colors)`. Gaps get the empty color set.
    ///
    /// Spans must be sorted and must not overlap; a span starting before the
    /// end of the previous one fails with `InconsistentMerge` (carrying the
    /// covered length and the span's offset), and a span reaching past
    /// `length` fails with `OutOfRange`.
    pub fn from_spans(
        length: usize,
        spans: impl IntoIterator<Item = (usize, usize, ColorSet<C>)>,
    ) -> Result<Self> {
        let mut sections = Vec::new();
        let mut covered = 0;
        for (offset, span_length, colors) in spans {
            let end = offset
                .checked_add(span_length)
                .filter(|end| *end <= length)
                .ok_or(DocumentError::out_of_range(offset, span_length, length))?;
            if offset < covered {
                return Err(DocumentError::InconsistentMerge {
                    base: covered,
                    additional: offset,
                });
            }
            if span_length == 0 {
                continue;
            }
            if offset > covered {
                sections.push(HighlightedSection {
                    offset: covered,
                    length: offset - covered,
                    colors: ColorSet::new(),
                });
            }
            sections.push(HighlightedSection {
                offset,
                length: span_length,
                colors,
            });
            covered = end;
        }
        if covered < length {
            sections.push(HighlightedSection {
                offset: covered,
                length: length - covered,
                colors: ColorSet::new(),
            });
        }
        Ok(Self { length, sections })
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn sections(&self) -> &[HighlightedSection<C>] {
        &self.sections
    }

    /// Colors at `offset`, or `None` past the end of the line.
    pub fn colors_at(&self, offset: usize) -> Option<&ColorSet<C>> {
        let index = self.sections.partition_point(|s| s.end() <= offset);
        self.sections
            .get(index)
            .filter(|s| s.offset <= offset)
            .map(|s| &s.colors)
    }

    /// Layers `other` on top of this line in place.
    pub fn merge_with(&mut self, other: &Self) -> Result<()> {
        *self = HighlightMerger::merge(self, other)?;
        Ok(())
    }
}

/// Merges highlight partitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightMerger;

impl HighlightMerger {
    /// Layers `additional` over `base`. Both must cover the same length.
    pub fn merge<C: Clone + PartialEq>(
        base: &HighlightedLine<C>,
        additional: &HighlightedLine<C>,
    ) -> Result<HighlightedLine<C>> {
        if base.length != additional.length {
            return Err(DocumentError::InconsistentMerge {
                base: base.length,
                additional: additional.length,
            });
        }
        let mut base_sections = base.sections.iter().filter(|s| s.length > 0);
        let mut additional_sections = additional.sections.iter().filter(|s| s.length > 0);
        let mut current_base = base_sections.next();
        let mut current_additional = additional_sections.next();
        let mut base_left = current_base.map_or(0, |s| s.length);
        let mut additional_left = current_additional.map_or(0, |s| s.length);

        let mut sections = Vec::with_capacity(base.sections.len() + additional.sections.len());
        let mut offset = 0;
        while let (Some(b), Some(a)) = (current_base, current_additional) {
            let length = base_left.min(additional_left);
            sections.push(HighlightedSection {
                offset,
                length,
                colors: b.colors.union(&a.colors),
            });
            offset += length;
            base_left -= length;
            additional_left -= length;
            if base_left == 0 {
                current_base = base_sections.next();
                base_left = current_base.map_or(0, |s| s.length);
            }
            if additional_left == 0 {
                current_additional = additional_sections.next();
                additional_left = current_additional.map_or(0, |s| s.length);
            }
        }

        if offset != base.length {
            return Err(DocumentError::InconsistentMerge {
                base: base.length,
                additional: offset,
            });
        }
        Ok(HighlightedLine {
            length: offset,
            sections,
        })
    }

    /// Layers every line of `layers` over `base`, left to right.
    pub fn merge_all<'a, C: Clone + PartialEq + 'a>(
        base: &HighlightedLine<C>,
        layers: impl IntoIterator<Item = &'a HighlightedLine<C>>,
    ) -> Result<HighlightedLine<C>> {
        let mut merged = base.clone();
        for layer in layers {
            merged.merge_with(layer)?;
        }
        Ok(merged)
    }
}
