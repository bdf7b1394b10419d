use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::matrix::{
    error::{CorpusLoadError, PersistenceError},
    lexicon::{Lexicon, TermId},
    TermDocMatrix,
};

/// Newline-delimited terms, line number = term id
pub const LEXICON_EXT: &str = "lex";
/// CBOR `Vec<u64>`, num_documents + 1 entries
pub const COLPTR_EXT: &str = "colptr";
/// CBOR `Vec<u32>`, nnz entries
pub const ROWIDX_EXT: &str = "rowidx";
/// CBOR `Vec<f64>`, nnz entries
pub const VAL_EXT: &str = "val";
/// CBOR `Vec<String>`, one per column. Optional.
pub const DOC_EXT: &str = "doc";

/// `<dir>/<name>.<ext>`
pub fn artifact_path(dir: &Path, name: &str, ext: &str) -> PathBuf {
    let mut file = OsString::from(name);
    file.push(".");
    file.push(ext);
    dir.join(file)
}

/// persistence
impl TermDocMatrix {
    /// Write the matrix as the artifact group `<dir>/<name>.{lex,colptr,rowidx,val,doc}`.
    ///
    /// `dir` is created when missing and existing artifacts of the same name
    /// are overwritten. The lexicon is written as it stood when the matrix was
    /// built, even if it grew since. Without document ids no `.doc` file is
    /// written and a stale one is removed.
    pub fn save<P: AsRef<Path>>(&self, dir: P, name: &str) -> Result<(), PersistenceError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| PersistenceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        self.lexicon
            .save_prefix(artifact_path(dir, name, LEXICON_EXT), self.num_terms)?;
        write_array(&artifact_path(dir, name, COLPTR_EXT), &self.colptr)?;
        write_array(&artifact_path(dir, name, ROWIDX_EXT), &self.rowidx)?;
        write_array(&artifact_path(dir, name, VAL_EXT), &self.val)?;

        let doc_path = artifact_path(dir, name, DOC_EXT);
        match &self.doc_ids {
            Some(ids) => write_array(&doc_path, ids)?,
            None => match fs::remove_file(&doc_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(PersistenceError::Io { path: doc_path, source }),
            },
        }
        tracing::debug!(dir = %dir.display(), artifact = name, matrix = %self, "saved term-document matrix");
        Ok(())
    }

    /// Restore a matrix written by `save`.
    ///
    /// The four required artifacts are checked for presence before anything
    /// is read. The restored layout goes through the same validation as
    /// `from_raw_parts`. A missing `.doc` file leaves the document ids unset.
    pub fn load<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self, CorpusLoadError> {
        let dir = dir.as_ref();
        let lex_path = artifact_path(dir, name, LEXICON_EXT);
        let colptr_path = artifact_path(dir, name, COLPTR_EXT);
        let rowidx_path = artifact_path(dir, name, ROWIDX_EXT);
        let val_path = artifact_path(dir, name, VAL_EXT);
        for path in [&lex_path, &colptr_path, &rowidx_path, &val_path] {
            if !path.is_file() {
                return Err(CorpusLoadError::MissingArtifact { path: path.clone() });
            }
        }

        let lexicon = Lexicon::load(&lex_path)?;
        let colptr: Vec<u64> = read_array(&colptr_path)?;
        let rowidx: Vec<TermId> = read_array(&rowidx_path)?;
        let val: Vec<f64> = read_array(&val_path)?;
        let doc_path = artifact_path(dir, name, DOC_EXT);
        let doc_ids: Option<Vec<Box<str>>> = if doc_path.is_file() {
            Some(read_array(&doc_path)?)
        } else {
            None
        };

        let matrix = TermDocMatrix::from_raw_parts(Arc::new(lexicon), colptr, rowidx, val, doc_ids)?;
        tracing::debug!(dir = %dir.display(), artifact = name, matrix = %matrix, "loaded term-document matrix");
        Ok(matrix)
    }
}

fn write_array<T: Serialize>(path: &Path, items: &[T]) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_cbor::to_writer(&mut writer, &items).map_err(|source| PersistenceError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)
}

fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CorpusLoadError> {
    let file = File::open(path).map_err(|source| CorpusLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_cbor::from_reader(BufReader::new(file)).map_err(|source| CorpusLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{builder::TermDocBuilder, error::DimensionMismatchError, extract::WhitespaceExtractor};

    fn sample() -> TermDocMatrix {
        let docs = vec![
            ("p1", "Barack_Obama Hawaii Honolulu Hawaii"),
            ("p2", ""),
            ("p3", "Chicago Barack_Obama"),
        ];
        TermDocBuilder::new(docs, WhitespaceExtractor)
            .num_workers(2)
            .build()
            .unwrap()
    }

    #[test]
    fn save_then_load_restores_everything() {
        let dir = tempfile::tempdir().unwrap();
        let m = sample();
        m.save(dir.path(), "links").unwrap();
        for ext in [LEXICON_EXT, COLPTR_EXT, ROWIDX_EXT, VAL_EXT, DOC_EXT] {
            assert!(artifact_path(dir.path(), "links", ext).is_file(), "{ext}");
        }

        let restored = TermDocMatrix::load(dir.path(), "links").unwrap();
        assert_eq!(restored.num_terms(), m.num_terms());
        assert_eq!(restored.num_documents(), m.num_documents());
        assert_eq!(restored.colptr(), m.colptr());
        assert_eq!(restored.rowidx(), m.rowidx());
        assert_eq!(restored.values(), m.values());
        assert_eq!(restored.document_ids(), m.document_ids());
        assert_eq!(restored.lexicon().terms(), m.lexicon().terms());

        let hawaii = restored.term_id("Hawaii").unwrap();
        assert_eq!(restored.term_total_count(hawaii), 2.0);
        assert_eq!(restored.column(1).nnz(), 0);
    }

    #[test]
    fn lexicon_growth_after_build_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let m = sample();
        m.lexicon().get_or_insert("added-later").unwrap();
        m.save(dir.path(), "links").unwrap();

        let restored = TermDocMatrix::load(dir.path(), "links").unwrap();
        assert_eq!(restored.num_terms(), m.num_terms());
        assert_eq!(restored.term_id("added-later"), None);
    }

    #[test]
    fn missing_artifact_is_reported_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        sample().save(dir.path(), "links").unwrap();
        let rowidx = artifact_path(dir.path(), "links", ROWIDX_EXT);
        fs::remove_file(&rowidx).unwrap();

        match TermDocMatrix::load(dir.path(), "links") {
            Err(CorpusLoadError::MissingArtifact { path }) => assert_eq!(path, rowidx),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            TermDocMatrix::load(dir.path(), "other"),
            Err(CorpusLoadError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn truncated_artifact_fails_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        sample().save(dir.path(), "links").unwrap();
        let val = artifact_path(dir.path(), "links", VAL_EXT);
        let bytes = fs::read(&val).unwrap();
        fs::write(&val, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            TermDocMatrix::load(dir.path(), "links"),
            Err(CorpusLoadError::Decode { .. })
        ));
    }

    #[test]
    fn inconsistent_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let m = sample();
        m.save(dir.path(), "links").unwrap();
        let short = &m.values()[..m.nnz() - 1];
        write_array(&artifact_path(dir.path(), "links", VAL_EXT), short).unwrap();

        assert!(matches!(
            TermDocMatrix::load(dir.path(), "links"),
            Err(CorpusLoadError::Dimension(DimensionMismatchError::Length { what: "val", .. }))
        ));
    }

    #[test]
    fn document_ids_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let m = sample();
        m.save(dir.path(), "links").unwrap();

        let bare = TermDocMatrix::from_raw_parts(
            Arc::clone(m.lexicon()),
            m.colptr().to_vec(),
            m.rowidx().to_vec(),
            m.values().to_vec(),
            None,
        )
        .unwrap();
        // overwriting without ids drops the stale .doc file
        bare.save(dir.path(), "links").unwrap();
        assert!(!artifact_path(dir.path(), "links", DOC_EXT).exists());

        let restored = TermDocMatrix::load(dir.path(), "links").unwrap();
        assert_eq!(restored.document_ids(), None);
        assert_eq!(restored.document_id(0), None);
        assert_eq!(restored.nnz(), m.nnz());
    }
}
