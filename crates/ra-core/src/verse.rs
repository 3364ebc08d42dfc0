use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RaError, Result};

// ---------------------------------------------------------------------------
// Book identifiers
// ---------------------------------------------------------------------------

/// Canonical three-letter book codes in canonical order (1 = GEN .. 66 = REV).
pub const BOOK_IDS: [&str; 66] = [
    "GEN", "EXO", "LEV", "NUM", "DEU", "JOS", "JDG", "RUT", "1SA", "2SA", "1KI", "2KI", "1CH",
    "2CH", "EZR", "NEH", "EST", "JOB", "PSA", "PRO", "ECC", "SNG", "ISA", "JER", "LAM", "EZK",
    "DAN", "HOS", "JOL", "AMO", "OBA", "JON", "MIC", "NAM", "HAB", "ZEP", "HAG", "ZEC", "MAL",
    "MAT", "MRK", "LUK", "JHN", "ACT", "ROM", "1CO", "2CO", "GAL", "EPH", "PHP", "COL", "1TH",
    "2TH", "1TI", "2TI", "TIT", "PHM", "HEB", "JAS", "1PE", "2PE", "1JN", "2JN", "3JN", "JUD",
    "REV",
];

/// Return the 1-based canonical number of `book_id`, or `None` when the code
/// is not a known canonical book.
pub fn book_number(book_id: &str) -> Option<u8> {
    BOOK_IDS
        .iter()
        .position(|b| b.eq_ignore_ascii_case(book_id))
        .map(|i| (i + 1) as u8)
}

/// Inverse of [`book_number`].
pub fn book_id(book_number: u8) -> Option<&'static str> {
    BOOK_IDS.get((book_number as usize).checked_sub(1)?).copied()
}

// ---------------------------------------------------------------------------
// VerseRef
// ---------------------------------------------------------------------------

/// A (book, chapter, verse) triple.
///
/// A `VerseRef` carries no versification of its own; callers always know which
/// [`Versification`] a reference belongs to and convert explicitly before
/// comparing references that come from different texts. Ordering is
/// canonical: book, then chapter, then verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerseRef {
    pub book: u8,
    pub chapter: u32,
    pub verse: u32,
}

impl VerseRef {
    pub fn new(book: u8, chapter: u32, verse: u32) -> Self {
        Self {
            book,
            chapter,
            verse,
        }
    }

    /// Parse `"PSA 10:1"`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (book, cv) = s
            .split_once(' ')
            .ok_or_else(|| RaError::InvalidInput(format!("malformed verse reference: {s}")))?;
        let book = book_number(book)
            .ok_or_else(|| RaError::InvalidInput(format!("unknown book: {book}")))?;
        let (chapter, verse) = parse_chapter_verse(cv.trim())?;
        Ok(Self::new(book, chapter, verse))
    }
}

impl fmt::Display for VerseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{}",
            book_id(self.book).unwrap_or("???"),
            self.chapter,
            self.verse
        )
    }
}

fn parse_chapter_verse(s: &str) -> Result<(u32, u32)> {
    let (c, v) = s
        .split_once(':')
        .ok_or_else(|| RaError::InvalidInput(format!("expected chapter:verse, got {s}")))?;
    let chapter = c
        .parse()
        .map_err(|_| RaError::InvalidInput(format!("bad chapter number: {c}")))?;
    let verse = v
        .parse()
        .map_err(|_| RaError::InvalidInput(format!("bad verse number: {v}")))?;
    Ok((chapter, verse))
}

// ---------------------------------------------------------------------------
// Versification
// ---------------------------------------------------------------------------

/// A named versification table.
///
/// Every table maps its own references onto a shared "original" scheme;
/// references that have no explicit mapping are the same in both. Converting
/// between two tables therefore goes `self -> original -> target`.
#[derive(Debug, Clone, Default)]
pub struct Versification {
    name: String,
    to_original: HashMap<VerseRef, VerseRef>,
    from_original: HashMap<VerseRef, VerseRef>,
    last_verses: HashMap<(u8, u32), u32>,
}

impl Versification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The plain English table: no mappings at all.
    pub fn english() -> Self {
        Self::new("English")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare that `local` in this table corresponds to `original`.
    pub fn with_mapping(mut self, local: VerseRef, original: VerseRef) -> Self {
        self.add_mapping(local, original);
        self
    }

    /// Record the number of the last verse of `chapter`.
    pub fn with_last_verse(mut self, book: u8, chapter: u32, last_verse: u32) -> Self {
        self.last_verses.insert((book, chapter), last_verse);
        self
    }

    fn add_mapping(&mut self, local: VerseRef, original: VerseRef) {
        self.to_original.insert(local, original);
        self.from_original.insert(original, local);
    }

    /// Parse a table in the line format used by `.vrs` files:
    ///
    /// ```text
    /// # comment
    /// PSA 1:6 2:12 3:8          (last verse of each chapter)
    /// PSA 10:0 = PSA 9:22       (local = original)
    /// ROM 14:24-26 = ROM 16:25-27
    /// ```
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let mut vers = Self::new(name);
        for raw in text.lines() {
            let line = raw.trim().trim_start_matches("#!").trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((local, original)) = line.split_once('=') {
                vers.parse_mapping(local.trim(), original.trim())?;
            } else {
                vers.parse_last_verses(line)?;
            }
        }
        Ok(vers)
    }

    fn parse_mapping(&mut self, local: &str, original: &str) -> Result<()> {
        let (local_start, local_len) = parse_ref_range(local)?;
        let (orig_start, orig_len) = parse_ref_range(original)?;
        if local_len != orig_len {
            return Err(RaError::InvalidInput(format!(
                "mapping ranges differ in length: {local} = {original}"
            )));
        }
        for offset in 0..local_len {
            self.add_mapping(
                VerseRef::new(local_start.book, local_start.chapter, local_start.verse + offset),
                VerseRef::new(orig_start.book, orig_start.chapter, orig_start.verse + offset),
            );
        }
        Ok(())
    }

    fn parse_last_verses(&mut self, line: &str) -> Result<()> {
        let mut parts = line.split_whitespace();
        let book_code = parts.next().unwrap_or_default();
        let book = book_number(book_code)
            .ok_or_else(|| RaError::InvalidInput(format!("unknown book: {book_code}")))?;
        for cv in parts {
            let (chapter, last) = parse_chapter_verse(cv)?;
            self.last_verses.insert((book, chapter), last);
        }
        Ok(())
    }

    pub fn last_verse(&self, book: u8, chapter: u32) -> Option<u32> {
        self.last_verses.get(&(book, chapter)).copied()
    }

    pub fn to_original(&self, vref: VerseRef) -> VerseRef {
        self.to_original.get(&vref).copied().unwrap_or(vref)
    }

    pub fn from_original(&self, vref: VerseRef) -> VerseRef {
        self.from_original.get(&vref).copied().unwrap_or(vref)
    }

    /// Convert `vref`, expressed in this table, into `target`.
    pub fn convert(&self, vref: VerseRef, target: &Versification) -> VerseRef {
        if self.name == target.name {
            return vref;
        }
        target.from_original(self.to_original(vref))
    }

    /// The verse immediately preceding `vref`.
    ///
    /// Verse 0 of a chapter steps back to the last verse of the previous
    /// chapter when this table knows it; otherwise the reference is returned
    /// unchanged.
    pub fn previous_verse(&self, vref: VerseRef) -> VerseRef {
        if vref.verse > 0 {
            return VerseRef::new(vref.book, vref.chapter, vref.verse - 1);
        }
        match vref.chapter.checked_sub(1).filter(|c| *c > 0) {
            Some(prev) => match self.last_verse(vref.book, prev) {
                Some(last) => VerseRef::new(vref.book, prev, last),
                None => vref,
            },
            None => vref,
        }
    }
}

/// Parse `"ROM 14:24-26"` into its first reference and the number of verses.
fn parse_ref_range(s: &str) -> Result<(VerseRef, u32)> {
    match s.rsplit_once('-') {
        Some((start, end)) if !end.contains(':') => {
            let start = VerseRef::parse(start)?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| RaError::InvalidInput(format!("bad verse range: {s}")))?;
            if end < start.verse {
                return Err(RaError::InvalidInput(format!("descending verse range: {s}")));
            }
            Ok((start, end - start.verse + 1))
        }
        _ => Ok((VerseRef::parse(s)?, 1)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_numbers_round_trip() {
        assert_eq!(book_number("GEN"), Some(1));
        assert_eq!(book_number("mrk"), Some(41));
        assert_eq!(book_number("REV"), Some(66));
        assert_eq!(book_number("XYZ"), None);
        assert_eq!(book_id(41), Some("MRK"));
        assert_eq!(book_id(0), None);
    }

    #[test]
    fn verse_refs_order_canonically() {
        let a = VerseRef::new(41, 1, 20);
        let b = VerseRef::new(41, 2, 1);
        let c = VerseRef::new(42, 1, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn parse_and_display() {
        let v = VerseRef::parse("PSA 10:1").unwrap();
        assert_eq!(v, VerseRef::new(19, 10, 1));
        assert_eq!(v.to_string(), "PSA 10:1");
        assert!(VerseRef::parse("PSA10:1").is_err());
        assert!(VerseRef::parse("PSA 10").is_err());
    }

    #[test]
    fn conversion_goes_through_original() {
        let psa = book_number("PSA").unwrap();
        let vulgate = Versification::new("Vulgate")
            .with_mapping(VerseRef::new(psa, 9, 22), VerseRef::new(psa, 10, 1));
        let english = Versification::english();

        assert_eq!(
            vulgate.convert(VerseRef::new(psa, 9, 22), &english),
            VerseRef::new(psa, 10, 1)
        );
        assert_eq!(
            english.convert(VerseRef::new(psa, 10, 1), &vulgate),
            VerseRef::new(psa, 9, 22)
        );
        // Unmapped references pass through.
        assert_eq!(
            english.convert(VerseRef::new(psa, 3, 4), &vulgate),
            VerseRef::new(psa, 3, 4)
        );
    }

    #[test]
    fn parse_vrs_lines() {
        let text = "# test table\nROM 14:26 15:33 16:24\nROM 14:24-26 = ROM 16:25-27\n";
        let vers = Versification::parse("Test", text).unwrap();
        assert_eq!(vers.last_verse(45, 14), Some(26));
        assert_eq!(vers.last_verse(45, 16), Some(24));
        assert_eq!(
            vers.to_original(VerseRef::new(45, 14, 25)),
            VerseRef::new(45, 16, 26)
        );
    }

    #[test]
    fn parse_rejects_mismatched_ranges() {
        assert!(Versification::parse("Bad", "ROM 14:24-26 = ROM 16:25").is_err());
    }

    #[test]
    fn previous_verse_steps_over_chapter_start() {
        let vers = Versification::english().with_last_verse(19, 9, 20);
        assert_eq!(
            vers.previous_verse(VerseRef::new(19, 10, 0)),
            VerseRef::new(19, 9, 20)
        );
        assert_eq!(
            vers.previous_verse(VerseRef::new(19, 10, 5)),
            VerseRef::new(19, 10, 4)
        );
        // Unknown chapter length leaves verse 0 alone.
        assert_eq!(
            vers.previous_verse(VerseRef::new(19, 12, 0)),
            VerseRef::new(19, 12, 0)
        );
    }
}
