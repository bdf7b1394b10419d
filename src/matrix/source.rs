use std::{
    fs::File,
    io::{self, BufRead, BufReader, Lines},
    path::Path,
};

/// Single-pass line reader over a file, one document per line.
///
/// Reading is lazy: each `next` pulls one line, so when the builder drives
/// it the file I/O happens on worker threads.
#[derive(Debug)]
pub struct LineDocuments {
    lines: Lines<BufReader<File>>,
}

impl LineDocuments {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(LineDocuments {
            lines: BufReader::new(file).lines(),
        })
    }
}

impl Iterator for LineDocuments {
    type Item = io::Result<String>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_each_line_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.tsv");
        std::fs::write(&path, "page_1\ta b\npage_2\tc\n").unwrap();

        let mut docs = LineDocuments::open(&path).unwrap();
        assert_eq!(docs.next().unwrap().unwrap(), "page_1\ta b");
        assert_eq!(docs.next().unwrap().unwrap(), "page_2\tc");
        assert!(docs.next().is_none());
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LineDocuments::open(dir.path().join("nope")).is_err());
    }
}
