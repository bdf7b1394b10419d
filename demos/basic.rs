use cooc_matrix::{TermDocBuilder, TermDocMatrix, WhitespaceExtractor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let docs = vec![
        ("doc-a", "the cat sat on the mat"),
        ("doc-b", "the dog sat on the log"),
        ("doc-c", "cat and dog"),
        ("doc-d", ""),
    ];
    let matrix = TermDocBuilder::new(docs, WhitespaceExtractor)
        .num_workers(4)
        .build()?;
    println!("{matrix}");

    let the = matrix.term_id("the").ok_or("unknown term")?;
    let sat = matrix.term_id("sat").ok_or("unknown term")?;
    println!("total(the) = {}", matrix.term_total_count(the));
    println!("cooc(the, sat) = {}", matrix.cooccurrence_count(the, sat));
    for (col, count) in matrix.docwise_term_count(the).iter() {
        println!("  {:?}: the x {}", matrix.document_id(col as usize), count);
    }

    let cooc = matrix.cooccurrence_matrix();
    println!("term-term nnz = {}", cooc.nnz());
    println!("diag(the) = {}", cooc.diagonal(the));

    let dir = std::env::temp_dir().join("cooc-matrix-demo");
    matrix.save(&dir, "demo")?;
    let restored = TermDocMatrix::load(&dir, "demo")?;
    println!("restored {restored} from {}", dir.display());
    Ok(())
}
