use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    sync::Arc,
};

use ahash::RandomState;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;

use crate::matrix::error::{LexiconFullError, LexiconLoadError, PersistenceError};

/// Dense row id of a term
pub type TermId = u32;

/// Thread-safe bijection between term strings and dense ids.
///
/// Ids are handed out in insertion order starting at 0 and are never
/// reused or reassigned. `get_or_insert` is atomic per term: concurrent
/// callers racing on an unseen term all observe the same id.
///
/// Implemented with a DashMap (term -> id) and a reverse table guarded by
/// an RwLock. A new id is taken from the reverse table while the map shard
/// of the term is still locked, so the two sides never disagree.
#[derive(Debug)]
pub struct Lexicon {
    ids: DashMap<Arc<str>, TermId, RandomState>,
    terms: RwLock<Vec<Arc<str>>>,
    capacity: usize,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexicon {
    /// Most terms a lexicon can hold: ids are `0..MAX_TERMS`
    pub const MAX_TERMS: usize = TermId::MAX as usize;

    /// Create an empty lexicon
    pub fn new() -> Self {
        Self::with_capacity_limit(Self::MAX_TERMS)
    }

    pub(crate) fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            ids: DashMap::with_hasher(RandomState::new()),
            terms: RwLock::new(Vec::new()),
            capacity: capacity.min(Self::MAX_TERMS),
        }
    }

    /// Return the id of `term`, registering it first if it was never seen.
    /// Fails only for an unseen term once every id is taken.
    pub fn get_or_insert(&self, term: &str) -> Result<TermId, LexiconFullError> {
        if let Some(id) = self.ids.get(term) {
            return Ok(*id);
        }
        match self.ids.entry(Arc::from(term)) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let mut terms = self.terms.write();
                if terms.len() >= self.capacity {
                    return Err(LexiconFullError {
                        capacity: self.capacity,
                    });
                }
                let id = terms.len() as TermId;
                terms.push(Arc::clone(entry.key()));
                entry.insert(id);
                Ok(id)
            }
        }
    }

    /// Id of `term` if it is registered
    #[inline]
    pub fn lookup(&self, term: &str) -> Option<TermId> {
        self.ids.get(term).map(|id| *id)
    }

    #[inline]
    pub fn contains(&self, term: &str) -> bool {
        self.ids.contains_key(term)
    }

    /// Term registered under `id`, `None` when `id >= len()`
    pub fn id_to_term(&self, id: TermId) -> Option<Arc<str>> {
        self.terms.read().get(id as usize).cloned()
    }

    /// Number of distinct terms ever inserted
    #[inline]
    pub fn len(&self) -> usize {
        self.terms.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all terms in id order
    pub fn terms(&self) -> Vec<Arc<str>> {
        self.terms.read().clone()
    }
}

/// persistence
impl Lexicon {
    /// Write the terms one per line, line number = id.
    /// Terms holding a line break are rejected, the file would not read back.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistenceError> {
        self.save_prefix(path, usize::MAX)
    }

    /// Like `save`, but only the first `len` ids.
    /// A matrix writes the lexicon as it was when the matrix was built.
    pub(crate) fn save_prefix<P: AsRef<Path>>(&self, path: P, len: usize) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let terms = self.terms.read();
        let terms = &terms[..len.min(terms.len())];
        if let Some((id, term)) = terms
            .iter()
            .enumerate()
            .find(|(_, term)| term.contains(['\n', '\r']))
        {
            return Err(PersistenceError::UnencodableTerm {
                id,
                term: term.to_string(),
            });
        }
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        for term in terms {
            writeln!(writer, "{}", term).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;
        tracing::debug!(path = %path.display(), terms = terms.len(), "saved lexicon");
        Ok(())
    }

    /// Rebuild a lexicon from `save` output, replaying the lines in order so
    /// every term gets back its old id
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LexiconLoadError> {
        let path = path.as_ref();
        let io_err = |source| LexiconLoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(io_err)?);
        let lexicon = Lexicon::new();
        for (line, term) in reader.lines().enumerate() {
            let term = term.map_err(io_err)?;
            if lexicon.contains(&term) {
                return Err(LexiconLoadError::DuplicateTerm { term, line });
            }
            lexicon.get_or_insert(&term)?;
        }
        tracing::debug!(path = %path.display(), terms = lexicon.len(), "loaded lexicon");
        Ok(lexicon)
    }
}
