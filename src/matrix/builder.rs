use std::{
    any::Any,
    collections::BTreeMap,
    iter::Fuse,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;

use crate::matrix::{
    error::{BuildError, ExtractionError, LexiconFullError},
    extract::TermExtractor,
    lexicon::{Lexicon, TermId},
    term::TermFrequency,
    TermDocMatrix,
};

/// Builder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Worker threads extracting documents; at least 1
    pub num_workers: usize,
    /// Log a progress line every this many input documents, 0 disables it
    pub progress_interval: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            num_workers: rayon::current_num_threads(),
            progress_interval: 10_000,
        }
    }
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn progress_interval(mut self, every: u64) -> Self {
        self.progress_interval = every;
        self
    }
}

/// A document whose extraction failed. It got no column.
#[derive(Debug)]
pub struct ExtractionFailure {
    /// 0-based position in the input sequence
    pub position: u64,
    /// Empty when no id could be taken from the document
    pub document_id: String,
    pub error: ExtractionError,
}

/// What happened to the input of one build
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Documents pulled from the source, whatever became of them
    pub documents_seen: u64,
    /// Columns written, equal to the matrix's document count
    pub columns: usize,
    /// Documents the extractor gave no id
    pub skipped: u64,
    pub failures: Vec<ExtractionFailure>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Term-Document Matrix Builder
///
/// Drains a single-pass document sequence on a pool of `num_workers`
/// threads. Each worker pulls the next document (so a slow source blocks
/// only the worker reading it), asks the extractor for its id and terms,
/// and tallies them. Finished tallies are committed as whole columns in
/// input order, whatever order the workers finish in; the lexicon is
/// extended at commit time, so term ids follow first appearance in input
/// order for any worker count.
///
/// A document without an id gets no column. A document whose extraction
/// fails or panics gets no column either and is listed in the `BuildReport`,
/// as is one that would need a new term after the lexicon ran full.
pub struct TermDocBuilder<I, E> {
    documents: I,
    extractor: E,
    lexicon: Arc<Lexicon>,
    config: BuildConfig,
}

impl<I, E> TermDocBuilder<I, E> {
    /// Builder over `documents` with a fresh lexicon
    pub fn new<T>(documents: T, extractor: E) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        TermDocBuilder {
            documents: documents.into_iter(),
            extractor,
            lexicon: Arc::new(Lexicon::new()),
            config: BuildConfig::default(),
        }
    }

    /// Keep extending an existing lexicon; its ids are left untouched
    pub fn with_lexicon(mut self, lexicon: Arc<Lexicon>) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.config = self.config.num_workers(num_workers);
        self
    }

    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = BuildConfig {
            num_workers: config.num_workers.max(1),
            ..config
        };
        self
    }

    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }
}

impl<I, D, E> TermDocBuilder<I, E>
where
    I: Iterator<Item = D> + Send,
    E: TermExtractor<D>,
{
    /// Consume the document sequence and assemble the matrix.
    /// Extraction failures are logged and otherwise dropped.
    pub fn build(self) -> Result<TermDocMatrix, BuildError> {
        self.build_with_report().map(|(matrix, _)| matrix)
    }

    /// Same as `build`, also returning what happened to every document
    pub fn build_with_report(self) -> Result<(TermDocMatrix, BuildReport), BuildError> {
        let TermDocBuilder {
            documents,
            extractor,
            lexicon,
            config,
        } = self;
        let workers = config.num_workers.max(1);
        let start = Instant::now();
        tracing::info!(workers, "building term-document matrix");

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cooc-worker-{i}"))
            .build()?;

        let feed = Mutex::new(Feed {
            next_position: 0,
            documents: documents.fuse(),
        });
        let sink = ColumnSink {
            lexicon: &lexicon,
            progress_interval: config.progress_interval,
            columns: Mutex::new(Columns::new()),
        };
        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| run_worker(&feed, &sink, &extractor));
            }
        });

        let columns = sink.columns.into_inner();
        debug_assert!(columns.pending.is_empty());
        let Columns {
            colptr,
            rowidx,
            val,
            doc_ids,
            report,
            ..
        } = columns;
        let matrix = TermDocMatrix::from_raw_parts(Arc::clone(&lexicon), colptr, rowidx, val, Some(doc_ids))?;
        tracing::info!(
            documents = report.documents_seen,
            columns = report.columns,
            skipped = report.skipped,
            failures = report.failures.len(),
            terms = matrix.num_terms(),
            nnz = matrix.nnz(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "term-document matrix built"
        );
        Ok((matrix, report))
    }
}

struct Feed<I> {
    next_position: u64,
    documents: Fuse<I>,
}

impl<I, D> Feed<I>
where
    I: Iterator<Item = D>,
{
    #[inline]
    fn pull(&mut self) -> Option<(u64, D)> {
        let doc = self.documents.next()?;
        let position = self.next_position;
        self.next_position += 1;
        Some((position, doc))
    }
}

enum Outcome {
    Column { document_id: String, terms: TermFrequency },
    Skipped,
    Failed(ExtractionFailure),
}

fn run_worker<I, D, E>(feed: &Mutex<Feed<I>>, sink: &ColumnSink<'_>, extractor: &E)
where
    I: Iterator<Item = D>,
    E: TermExtractor<D>,
{
    loop {
        // the source is read under the lock, extraction runs outside it
        let next = feed.lock().pull();
        let Some((position, doc)) = next else {
            break;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| tally(extractor, position, &doc)))
            .unwrap_or_else(|payload| {
                Outcome::Failed(ExtractionFailure {
                    position,
                    document_id: String::new(),
                    error: ExtractionError::Panicked(panic_message(&*payload)),
                })
            });
        drop(doc);
        sink.submit(position, outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn tally<D, E>(extractor: &E, position: u64, doc: &D) -> Outcome
where
    E: TermExtractor<D>,
{
    let Some(document_id) = extractor.document_id(doc) else {
        return Outcome::Skipped;
    };
    match extractor.extract_terms(doc) {
        Ok(terms) => Outcome::Column {
            document_id,
            terms: terms.iter().collect(),
        },
        Err(error) => Outcome::Failed(ExtractionFailure {
            position,
            document_id,
            error,
        }),
    }
}

/// Ordered commit point shared by the workers
struct ColumnSink<'a> {
    lexicon: &'a Lexicon,
    progress_interval: u64,
    columns: Mutex<Columns>,
}

impl ColumnSink<'_> {
    fn submit(&self, position: u64, outcome: Outcome) {
        let mut columns = self.columns.lock();
        if position != columns.next_position {
            columns.pending.insert(position, outcome);
            return;
        }
        columns.commit(self.lexicon, outcome, self.progress_interval);
        loop {
            let next = columns.next_position;
            match columns.pending.remove(&next) {
                Some(outcome) => columns.commit(self.lexicon, outcome, self.progress_interval),
                None => break,
            }
        }
    }
}

/// Matrix arrays under construction, plus outcomes that finished ahead of
/// their turn
struct Columns {
    next_position: u64,
    pending: BTreeMap<u64, Outcome>,
    colptr: Vec<u64>,
    rowidx: Vec<TermId>,
    val: Vec<f64>,
    doc_ids: Vec<Box<str>>,
    report: BuildReport,
    scratch: Vec<(TermId, f64)>,
}

impl Columns {
    fn new() -> Self {
        Columns {
            next_position: 0,
            pending: BTreeMap::new(),
            colptr: vec![0],
            rowidx: Vec::new(),
            val: Vec::new(),
            doc_ids: Vec::new(),
            report: BuildReport::default(),
            scratch: Vec::new(),
        }
    }

    /// Apply the outcome of input position `next_position`
    fn commit(&mut self, lexicon: &Lexicon, outcome: Outcome, progress_interval: u64) {
        let position = self.next_position;
        match outcome {
            Outcome::Column { document_id, terms } => match self.register(lexicon, &terms) {
                Ok(()) => {
                    for &(row, count) in &self.scratch {
                        self.rowidx.push(row);
                        self.val.push(count);
                    }
                    self.colptr.push(self.rowidx.len() as u64);
                    self.doc_ids.push(document_id.into_boxed_str());
                    self.report.columns += 1;
                }
                Err(full) => self.fail(ExtractionFailure {
                    position,
                    document_id,
                    error: full.into(),
                }),
            },
            Outcome::Skipped => {
                tracing::debug!(position, "document has no id, skipped");
                self.report.skipped += 1;
            }
            Outcome::Failed(failure) => self.fail(failure),
        }
        self.next_position += 1;
        self.report.documents_seen += 1;
        if progress_interval > 0 && self.report.documents_seen % progress_interval == 0 {
            tracing::info!(
                documents = self.report.documents_seen,
                columns = self.report.columns,
                terms = lexicon.len(),
                nnz = self.val.len(),
                "build progress"
            );
        }
    }
}

impl Columns {
    /// Term ids of one column into `scratch`, ascending.
    /// Terms registered before the lexicon ran full stay registered.
    fn register(&mut self, lexicon: &Lexicon, terms: &TermFrequency) -> Result<(), LexiconFullError> {
        self.scratch.clear();
        for (term, count) in terms.iter() {
            self.scratch.push((lexicon.get_or_insert(term)?, count as f64));
        }
        self.scratch.sort_unstable_by_key(|&(row, _)| row);
        Ok(())
    }

    fn fail(&mut self, failure: ExtractionFailure) {
        tracing::warn!(
            position = failure.position,
            document_id = %failure.document_id,
            error = %failure.error,
            "term extraction failed, document skipped"
        );
        self.report.failures.push(failure);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::matrix::extract::{FnExtractor, WhitespaceExtractor};

    fn build(docs: &[&str], workers: usize) -> (TermDocMatrix, BuildReport) {
        let docs: Vec<(usize, String)> = docs.iter().map(|d| d.to_string()).enumerate().collect();
        TermDocBuilder::new(docs, WhitespaceExtractor)
            .num_workers(workers)
            .build_with_report()
            .unwrap()
    }

    #[test]
    fn cat_dog_corpus() {
        let (m, report) = build(&["the cat sat", "the dog sat", "cat dog"], 3);
        assert!(report.is_clean());
        assert_eq!(report.columns, 3);

        let lex = m.lexicon();
        let ids: Vec<_> = ["the", "cat", "sat", "dog"].iter().map(|t| lex.lookup(t)).collect();
        assert_eq!(ids, vec![Some(0), Some(1), Some(2), Some(3)]);

        let id = |t: &str| m.term_id(t).unwrap();
        assert_eq!(m.num_terms(), 4);
        assert_eq!(m.num_documents(), 3);
        assert_eq!(m.term_total_count(id("the")), 2.0);
        assert_eq!(m.term_total_count(id("cat")), 2.0);
        assert_eq!(m.cooccurrence_count(id("cat"), id("dog")), 1.0);
        assert_eq!(m.cooccurrence_count(id("the"), id("sat")), 2.0);
        assert_eq!(m.document_id(2), Some("2"));
    }

    #[test]
    fn repeated_terms_are_counted() {
        let (m, _) = build(&["a b a a", "b"], 2);
        assert_eq!(m.colptr(), &[0, 2, 3]);
        assert_eq!(m.rowidx(), &[0, 1, 1]);
        assert_eq!(m.values(), &[3.0, 1.0, 1.0]);
    }

    #[test]
    fn empty_document_keeps_its_column() {
        let (m, _) = build(&["a b", "", "b c"], 4);
        assert_eq!(m.num_documents(), 3);
        assert_eq!(m.colptr(), &[0, 2, 2, 4]);
        assert_eq!(m.column(1).nnz(), 0);
        assert_eq!(m.document_id(1), Some("1"));
        assert_eq!(m.document_id(2), Some("2"));
        assert_eq!(m.get(m.term_id("c").unwrap(), 2), 1.0);
    }

    #[test]
    fn documents_without_id_take_no_column() {
        let docs = vec!["keep x", "drop y", "keep z"];
        let extractor = FnExtractor::new(
            |d: &&str| -> Result<Vec<String>, ExtractionError> {
                Ok(d.split(' ').skip(1).map(str::to_string).collect())
            },
            |d: &&str| d.starts_with("keep").then(|| d.to_string()),
        );
        let (m, report) = TermDocBuilder::new(docs, extractor)
            .num_workers(2)
            .build_with_report()
            .unwrap();

        assert_eq!(report.documents_seen, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(m.num_documents(), 2);
        assert_eq!(m.document_id(0), Some("keep x"));
        assert_eq!(m.document_id(1), Some("keep z"));
        // the skipped document's terms never reach the lexicon
        assert_eq!(m.term_id("y"), None);
        assert_eq!(m.term_id("z"), Some(1));
    }

    #[test]
    fn extraction_failures_are_isolated() {
        let docs: Vec<String> = (0..20)
            .map(|i| if i % 5 == 0 { format!("BAD {i}") } else { format!("w{} common", i % 3) })
            .collect();
        let extractor = FnExtractor::new(
            |d: &String| -> Result<Vec<String>, ExtractionError> {
                if d.starts_with("BAD") {
                    Err(ExtractionError::malformed("bad record"))
                } else {
                    Ok(d.split(' ').map(str::to_string).collect())
                }
            },
            |d: &String| Some(d.clone()),
        );
        let (m, report) = TermDocBuilder::new(docs, extractor)
            .num_workers(4)
            .build_with_report()
            .unwrap();

        assert_eq!(report.documents_seen, 20);
        assert_eq!(report.failures.len(), 4);
        let positions: Vec<u64> = report.failures.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![0, 5, 10, 15]);
        assert_eq!(m.num_documents(), 16);
        assert_eq!(m.term_total_count(m.term_id("common").unwrap()), 16.0);
        assert_eq!(m.term_id("BAD"), None);
    }

    #[test]
    fn panicking_extractor_fails_only_its_document() {
        let docs: Vec<u64> = (0..6).collect();
        let extractor = FnExtractor::new(
            |d: &u64| -> Result<Vec<String>, ExtractionError> {
                if *d == 2 {
                    panic!("cannot tokenize document {d}");
                }
                Ok(vec![format!("t{d}"), "shared".to_string()])
            },
            |d: &u64| Some(d.to_string()),
        );
        let (m, report) = TermDocBuilder::new(docs, extractor)
            .num_workers(2)
            .build_with_report()
            .unwrap();

        assert_eq!(report.documents_seen, 6);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.position, 2);
        match &failure.error {
            ExtractionError::Panicked(msg) => assert_eq!(msg, "cannot tokenize document 2"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(m.num_documents(), 5);
        assert_eq!(m.document_id(2), Some("3"));
        assert_eq!(m.term_total_count(m.term_id("shared").unwrap()), 5.0);
        assert_eq!(m.term_id("t2"), None);
    }

    #[test]
    fn full_lexicon_fails_documents_with_new_terms() {
        let lexicon = Arc::new(Lexicon::with_capacity_limit(3));
        let docs = vec![(0, "a b"), (1, "c d"), (2, "a"), (3, "e")];
        let (m, report) = TermDocBuilder::new(docs, WhitespaceExtractor)
            .with_lexicon(lexicon)
            .num_workers(2)
            .build_with_report()
            .unwrap();

        let positions: Vec<u64> = report.failures.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![1, 3]);
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f.error, ExtractionError::LexiconFull(_))));
        assert_eq!(m.num_documents(), 2);
        assert_eq!(m.num_terms(), 3);
        // c made it in before d was refused; it has no counts
        assert_eq!(m.term_id("c"), Some(2));
        assert_eq!(m.term_total_count(2), 0.0);
        assert_eq!(m.get(0, 1), 1.0);
    }

    #[test]
    fn column_order_follows_input_not_completion() {
        // early documents are the slowest ones
        let docs: Vec<u64> = (0..12).collect();
        let extractor = FnExtractor::new(
            |d: &u64| -> Result<Vec<String>, ExtractionError> {
                std::thread::sleep(Duration::from_millis((12 - d) * 3));
                Ok(vec![format!("term{d}"), "shared".to_string()])
            },
            |d: &u64| Some(d.to_string()),
        );
        let m = TermDocBuilder::new(docs, extractor).num_workers(6).build().unwrap();

        for d in 0..12usize {
            assert_eq!(m.document_id(d), Some(d.to_string().as_str()));
            let own = m.term_id(&format!("term{d}")).unwrap();
            assert_eq!(m.get(own, d), 1.0);
        }
        assert_eq!(m.term_id("term0"), Some(0));
        assert_eq!(m.term_id("shared"), Some(1));
        assert_eq!(m.term_id("term1"), Some(2));
    }

    /// deterministic pseudo-random corpus (xorshift32)
    fn synthetic_corpus(n: usize) -> Vec<(usize, String)> {
        let mut state = 0x9E37_79B9u32;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };
        (0..n)
            .map(|i| {
                let len = (next() % 12) as usize;
                let words: Vec<String> = (0..len).map(|_| format!("w{}", next() % 40)).collect();
                (i, words.join(" "))
            })
            .collect()
    }

    #[test]
    fn worker_count_does_not_change_the_result() {
        let corpus = synthetic_corpus(400);
        let build_with = |workers: usize| {
            TermDocBuilder::new(corpus.clone(), WhitespaceExtractor)
                .num_workers(workers)
                .build()
                .unwrap()
        };
        let base = build_with(1);
        for workers in [2, 8] {
            let m = build_with(workers);
            assert_eq!(m.lexicon().terms(), base.lexicon().terms(), "workers={workers}");
            assert_eq!(m.colptr(), base.colptr(), "workers={workers}");
            assert_eq!(m.rowidx(), base.rowidx(), "workers={workers}");
            assert_eq!(m.values(), base.values(), "workers={workers}");
            assert_eq!(m.document_ids(), base.document_ids(), "workers={workers}");
        }
    }

    #[test]
    fn existing_lexicon_keeps_its_ids() {
        let lexicon = Arc::new(Lexicon::new());
        lexicon.get_or_insert("zebra").unwrap();
        lexicon.get_or_insert("cat").unwrap();
        let docs = vec![(0, "cat dog"), (1, "dog")];
        let m = TermDocBuilder::new(docs, WhitespaceExtractor)
            .with_lexicon(Arc::clone(&lexicon))
            .num_workers(2)
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(m.lexicon(), &lexicon));
        assert_eq!(m.num_terms(), 3);
        assert_eq!(m.term_id("zebra"), Some(0));
        assert_eq!(m.term_id("cat"), Some(1));
        assert_eq!(m.term_id("dog"), Some(2));
        assert_eq!(m.term_total_count(0), 0.0);
        assert_eq!(m.term_total_count(2), 2.0);
    }

    #[test]
    fn empty_input_gives_empty_matrix() {
        let m = TermDocBuilder::new(Vec::<(u8, String)>::new(), WhitespaceExtractor)
            .build()
            .unwrap();
        assert_eq!(m.num_documents(), 0);
        assert_eq!(m.num_terms(), 0);
        assert_eq!(m.colptr(), &[0]);
    }

    #[test]
    fn zero_workers_means_one() {
        assert_eq!(BuildConfig::new().num_workers(0).num_workers, 1);
        let (m, _) = build(&["x y"], 0);
        assert_eq!(m.num_documents(), 1);
    }
}
