//! A reference text: the blocks of every reference book, cached in memory
//! over a [`BookStore`], plus the bookkeeping of which cached books have been
//! split since they were loaded.
//!
//! All access to the cache goes through a [`ReferenceTextSession`], a guard
//! over the reference text's lock. Any operation that may split a cached
//! reference block is a session method, so the lock is held for its whole
//! duration.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ra_align::{
    apply_splits_to_align, try_split_at_verse_end, verse_split_locations, AlignOptions,
    AlignReport, Aligner,
};
use ra_core::db::{create_pool, BookStore, SqliteBookStore};
use ra_core::{Block, BookScript, RaError, ReferenceLanguageInfo, Result, VerseRef, Versification};
use ra_matchup::BlockMatchup;

use crate::config::ReferenceTextConfig;

// ---------------------------------------------------------------------------
// ReferenceTextId
// ---------------------------------------------------------------------------

/// Identity of a reference text. Standard texts ship with the application;
/// custom texts belong to a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ReferenceTextId {
    Standard(String),
    Custom(String),
}

impl fmt::Display for ReferenceTextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceTextId::Standard(name) => write!(f, "standard:{name}"),
            ReferenceTextId::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ReferenceText
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CacheState {
    books: HashMap<String, Vec<Block>>,
    /// Cached books whose blocks were split after loading.
    modified: BTreeSet<String>,
}

pub struct ReferenceText {
    id: ReferenceTextId,
    language: ReferenceLanguageInfo,
    versification: Arc<Versification>,
    store: Arc<dyn BookStore>,
    state: Mutex<CacheState>,
}

impl fmt::Debug for ReferenceText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceText")
            .field("id", &self.id)
            .field("language", &self.language.language_name)
            .field("versification", &self.versification.name())
            .finish_non_exhaustive()
    }
}

impl ReferenceText {
    pub fn new(
        id: ReferenceTextId,
        language: ReferenceLanguageInfo,
        versification: Arc<Versification>,
        store: Arc<dyn BookStore>,
    ) -> Self {
        Self {
            id,
            language,
            versification,
            store,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Open the reference text described by `config`, backed by its SQLite
    /// database (or an empty in-memory one).
    pub fn open(config: &ReferenceTextConfig) -> Result<Self> {
        let store = match &config.database_path {
            Some(path) => {
                let path = path.to_str().ok_or_else(|| {
                    RaError::InvalidInput(format!("database path is not UTF-8: {}", path.display()))
                })?;
                SqliteBookStore::new(create_pool(path)?)
            }
            None => SqliteBookStore::in_memory()?,
        };
        info!(id = %config.id, "opened reference text");
        Ok(Self::new(
            config.id.clone(),
            config.language.clone(),
            Arc::new(config.versification.build()?),
            Arc::new(store),
        ))
    }

    pub fn id(&self) -> &ReferenceTextId {
        &self.id
    }

    pub fn language(&self) -> &ReferenceLanguageInfo {
        &self.language
    }

    pub fn versification(&self) -> &Arc<Versification> {
        &self.versification
    }

    pub fn store(&self) -> &Arc<dyn BookStore> {
        &self.store
    }

    /// Whether the store holds blocks for `book_id`.
    pub fn has_book(&self, book_id: &str) -> Result<bool> {
        Ok(self.store.book_ids()?.iter().any(|id| id == book_id))
    }

    /// Acquire the reference text for a sequence of operations.
    pub fn session(&self) -> Result<ReferenceTextSession<'_>> {
        let state = self
            .state
            .lock()
            .map_err(|_| RaError::Internal(format!("reference text {} lock poisoned", self.id)))?;
        Ok(ReferenceTextSession { text: self, state })
    }
}

// ---------------------------------------------------------------------------
// ReferenceTextSession
// ---------------------------------------------------------------------------

/// Exclusive access to a reference text's book cache. Released on drop.
pub struct ReferenceTextSession<'a> {
    text: &'a ReferenceText,
    state: MutexGuard<'a, CacheState>,
}

impl<'a> ReferenceTextSession<'a> {
    pub fn reference_text(&self) -> &'a ReferenceText {
        self.text
    }

    /// The cached blocks of `book_id`, loading them on first use.
    pub fn reference_blocks(&mut self, book_id: &str) -> Result<Option<&[Block]>> {
        Ok(self.cached_book(book_id)?.map(|blocks| blocks.as_slice()))
    }

    fn cached_book(&mut self, book_id: &str) -> Result<Option<&mut Vec<Block>>> {
        if !self.state.books.contains_key(book_id) {
            match self.text.store.load_book(book_id)? {
                Some(blocks) => {
                    self.state.books.insert(book_id.to_string(), blocks);
                }
                None => return Ok(None),
            }
        }
        Ok(self.state.books.get_mut(book_id))
    }

    /// Like [`Self::cached_book`], first discarding splits made to the cached
    /// copy since it was loaded.
    fn book_for_alignment(&mut self, book_id: &str) -> Result<Option<&mut Vec<Block>>> {
        if self.state.modified.remove(book_id) {
            debug!(book_id, "reloading modified reference book");
            self.state.books.remove(book_id);
        }
        self.cached_book(book_id)
    }

    fn mark_modified(&mut self, book_id: &str) {
        self.state.modified.insert(book_id.to_string());
    }

    /// Align every block of `book` with this reference text.
    ///
    /// Each text is first split wherever the other breaks at a verse
    /// boundary; blocks of `book` that already match are not split, and the
    /// reference text is only split when `options.allow_splitting` is set. A
    /// book the reference text lacks is left untouched.
    pub fn apply_to(&mut self, book: &mut BookScript, options: AlignOptions) -> Result<AlignReport> {
        let text = self.text;
        let book_number = book.book_number();
        let book_id = book.book_id().to_string();
        let vern_versification = Arc::clone(book.versification());

        let Some(refs) = self.book_for_alignment(&book_id)? else {
            debug!(book_id = %book_id, reference_text = %text.id, "no reference book to align with");
            return Ok(AlignReport::default());
        };

        let ref_split = options.allow_splitting && {
            let vern_locations = verse_split_locations(book.blocks(), book_number);
            apply_splits_to_align(
                refs,
                book_number,
                &text.versification,
                &vern_locations,
                &vern_versification,
                true,
            )
        };

        let ref_locations = verse_split_locations(refs, book_number);
        apply_splits_to_align(
            book.blocks_mut(),
            book_number,
            &vern_versification,
            &ref_locations,
            &text.versification,
            false,
        );

        let report = Aligner::new(
            book_number,
            &vern_versification,
            &text.versification,
            &text.language,
        )
        .with_options(options)
        .align(book.blocks_mut(), refs);

        if ref_split || report.ref_blocks_split > 0 {
            self.mark_modified(&book_id);
        }
        info!(
            book_id = %book_id,
            matched = report.matched,
            unmatched = report.unmatched,
            "aligned book with reference text"
        );
        Ok(report)
    }

    /// Build a matchup window around `book.blocks()[index]`, split to this
    /// reference text's verse breaks and aligned with it.
    ///
    /// The window starts only where the reference text also starts a verse.
    /// `predetermined_count` is passed through to [`BlockMatchup::build`].
    pub fn matchup_for(
        &mut self,
        book: &BookScript,
        index: usize,
        predetermined_count: usize,
        allow_splitting: bool,
    ) -> Result<BlockMatchup> {
        let text = self.text;
        let book_number = book.book_number();
        let vern_versification = Arc::clone(book.versification());

        let refs = self.book_for_alignment(book.book_id())?.ok_or_else(|| {
            RaError::NotFound(format!("{} has no book {}", text.id, book.book_id()))
        })?;
        let ref_locations = verse_split_locations(refs, book_number);

        let can_break = |vref: VerseRef| {
            let converted = vern_versification.convert(vref, &text.versification);
            ref_locations.iter().any(|l| l.before == converted)
        };
        let split = |blocks: &mut Vec<Block>| {
            apply_splits_to_align(
                blocks,
                book_number,
                &vern_versification,
                &ref_locations,
                &text.versification,
                false,
            );
        };
        let mut matchup = BlockMatchup::build(
            book,
            index,
            split,
            can_break,
            &text.language,
            predetermined_count,
        )?;

        let options = AlignOptions {
            allow_splitting,
            ..AlignOptions::default()
        };
        let report = Aligner::new(
            book_number,
            &vern_versification,
            &text.versification,
            &text.language,
        )
        .with_options(options)
        .align(matchup.correlated_blocks_mut(), refs);

        if report.ref_blocks_split > 0 {
            self.mark_modified(book.book_id());
        }
        Ok(matchup)
    }

    /// Split cached reference block `index` of `book_id` after `verse`.
    pub fn split_reference_block(&mut self, book_id: &str, index: usize, verse: u32) -> Result<bool> {
        let text = self.text;
        let blocks = self
            .cached_book(book_id)?
            .ok_or_else(|| RaError::NotFound(format!("{} has no book {book_id}", text.id)))?;
        let split = try_split_at_verse_end(blocks, index, verse);
        if split {
            self.mark_modified(book_id);
        }
        Ok(split)
    }

    /// Books whose cached blocks differ from the store because of splits.
    pub fn modified_book_ids(&self) -> Vec<String> {
        self.state.modified.iter().cloned().collect()
    }

    /// Write every modified book back to the store and clear its flag.
    /// Returns the ids written.
    pub fn save_modified(&mut self) -> Result<Vec<String>> {
        let ids = self.modified_book_ids();
        for id in &ids {
            if let Some(blocks) = self.state.books.get(id) {
                self.text.store.save_book(id, blocks)?;
            }
            self.state.modified.remove(id);
        }
        if !ids.is_empty() {
            info!(books = ?ids, reference_text = %self.text.id, "saved modified reference books");
        }
        Ok(ids)
    }
}

impl Drop for ReferenceTextSession<'_> {
    fn drop(&mut self) {
        if !self.state.modified.is_empty() {
            debug!(
                reference_text = %self.text.id,
                modified = ?self.state.modified,
                "reference text session released with modified books"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
